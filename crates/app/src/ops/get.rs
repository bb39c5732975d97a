use clap::Args;

use common::crypto::RecoveryKeyError;
use common::storage::SecretStorageError;

use crate::op::parse_recovery_key;
use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Get {
    /// Name of the secret
    pub name: String,

    /// Recovery key to decrypt with (keyring copies if omitted)
    #[arg(long)]
    pub recovery_key: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GetError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("invalid recovery key: {0}")]
    RecoveryKey(#[from] RecoveryKeyError),
    #[error("secret storage error: {0}")]
    Storage(#[from] SecretStorageError),
    #[error("secret not found: {0}")]
    NotFound(String),
}

#[async_trait::async_trait]
impl crate::op::Op for Get {
    type Error = GetError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let key = parse_recovery_key(self.recovery_key.as_deref())?;

        state
            .storage(key)
            .get(&self.name)
            .await?
            .ok_or_else(|| GetError::NotFound(self.name.clone()))
    }
}
