use clap::Args;

use common::crypto::{encode_recovery_key, RecoveryKeyError, StorageKey};
use common::storage::{AddKeyOptions, SecretStorageAlgorithm, SecretStorageError};

use crate::keyring::KeyringError;
use crate::op::parse_recovery_key;
use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Add {
    /// Human readable name for the key
    #[arg(long)]
    pub name: Option<String>,

    /// Id to store the key under (random if omitted)
    #[arg(long)]
    pub key_id: Option<String>,

    /// Import an existing recovery key instead of generating a new key
    #[arg(long)]
    pub recovery_key: Option<String>,

    /// Make the new key the default key
    #[arg(long)]
    pub default: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum KeyAddError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("invalid recovery key: {0}")]
    RecoveryKey(#[from] RecoveryKeyError),
    #[error("secret storage error: {0}")]
    Storage(#[from] SecretStorageError),
    #[error("keyring error: {0}")]
    Keyring(#[from] KeyringError),
    #[error("invalid key id {0:?}: use letters, digits, '-' or '_'")]
    InvalidKeyId(String),
    #[error("key {0} already exists")]
    AlreadyExists(String),
}

fn valid_key_id(key_id: &str) -> bool {
    !key_id.is_empty()
        && key_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[async_trait::async_trait]
impl crate::op::Op for Add {
    type Error = KeyAddError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let storage = state.storage(None);

        if let Some(key_id) = &self.key_id {
            if !valid_key_id(key_id) {
                return Err(KeyAddError::InvalidKeyId(key_id.clone()));
            }
            if storage.has_key(Some(key_id)).await? {
                return Err(KeyAddError::AlreadyExists(key_id.clone()));
            }
        }

        let imported = parse_recovery_key(self.recovery_key.as_deref())?;
        let generated = imported.is_none();
        let key = imported.unwrap_or_else(StorageKey::generate);

        let options = AddKeyOptions {
            name: self.name.clone(),
            passphrase: None,
            key: Some(key.clone()),
        };
        let (key_id, _) = storage
            .add_key(
                SecretStorageAlgorithm::AesHmacSha2V1,
                options,
                self.key_id.as_deref(),
            )
            .await?;

        let mut lines = vec![format!("Added key {}", key_id)];

        if state.config.save_keys {
            state.keyring().save(&key_id, &key)?;
            lines.push("- Saved to keyring".to_string());
        }
        if self.default {
            storage.set_default_key_id(&key_id).await?;
            lines.push("- Set as default key".to_string());
        }
        if generated {
            lines.push(format!("- Recovery key: {}", encode_recovery_key(&key)));
        }

        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_key_id() {
        assert!(valid_key_id("backup-2024_a"));
        assert!(!valid_key_id(""));
        assert!(!valid_key_id("../x"));
        assert!(!valid_key_id("a.b"));
    }
}
