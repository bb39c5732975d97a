use clap::Args;

use common::crypto::RecoveryKeyError;
use common::storage::SecretStorageError;

use crate::keyring::KeyringError;
use crate::op::parse_recovery_key;
use crate::state::StateError;

/// Verify a raw key against a key descriptor's check value
#[derive(Args, Debug, Clone)]
pub struct Check {
    /// Key id to check (the default key if omitted)
    pub key_id: Option<String>,

    /// Recovery key to check (the keyring copy if omitted)
    #[arg(long)]
    pub recovery_key: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum KeyCheckError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("invalid recovery key: {0}")]
    RecoveryKey(#[from] RecoveryKeyError),
    #[error("secret storage error: {0}")]
    Storage(#[from] SecretStorageError),
    #[error("keyring error: {0}")]
    Keyring(#[from] KeyringError),
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("no default key is set")]
    NoDefaultKey,
    #[error("no recovery key given and key {0} is not in the keyring")]
    NoKey(String),
}

#[async_trait::async_trait]
impl crate::op::Op for Check {
    type Error = KeyCheckError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let storage = state.storage(None);

        let Some((key_id, descriptor)) = storage.get_key(self.key_id.as_deref()).await? else {
            return Err(match &self.key_id {
                Some(key_id) => KeyCheckError::NotFound(key_id.clone()),
                None => KeyCheckError::NoDefaultKey,
            });
        };

        let key = match parse_recovery_key(self.recovery_key.as_deref())? {
            Some(key) => key,
            None => state
                .keyring()
                .load(&key_id)?
                .ok_or_else(|| KeyCheckError::NoKey(key_id.clone()))?,
        };

        if storage.check_key(&key, &descriptor)? {
            Ok(format!("Key matches {}", key_id))
        } else {
            Ok(format!("Key does NOT match {}", key_id))
        }
    }
}
