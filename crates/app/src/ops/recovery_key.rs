use clap::{Args, Subcommand};

use common::crypto::{decode_recovery_key, encode_recovery_key, RecoveryKeyError, StorageKey};

#[derive(Args, Debug, Clone)]
pub struct RecoveryKey {
    #[command(subcommand)]
    pub command: RecoveryKeyCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum RecoveryKeyCommand {
    /// Generate a new random key and print its recovery key
    Generate,
    /// Check that a recovery key is well formed
    Verify {
        recovery_key: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RecoveryKeyOpError {
    #[error("invalid recovery key: {0}")]
    Invalid(#[from] RecoveryKeyError),
}

#[async_trait::async_trait]
impl crate::op::Op for RecoveryKey {
    type Error = RecoveryKeyOpError;
    type Output = String;

    async fn execute(&self, _ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        match &self.command {
            RecoveryKeyCommand::Generate => Ok(encode_recovery_key(&StorageKey::generate())),
            RecoveryKeyCommand::Verify { recovery_key } => {
                decode_recovery_key(recovery_key)?;
                Ok("Recovery key is valid".to_string())
            }
        }
    }
}
