use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;

use common::callbacks::CryptoCallbacks;
use common::crypto::{decode_recovery_key, encode_recovery_key, RecoveryKeyError, StorageKey};
use common::storage::SecretStorageKeyDescription;

const KEY_FILE_EXTENSION: &str = "key";

/// Local store of raw keys, saved as recovery keys, one file per key id
#[derive(Debug, Clone)]
pub struct Keyring {
    dir: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum KeyringError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored key {0} is invalid: {1}")]
    InvalidKey(String, RecoveryKeyError),
}

impl Keyring {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn key_path(&self, key_id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key_id, KEY_FILE_EXTENSION))
    }

    pub fn save(&self, key_id: &str, key: &StorageKey) -> Result<(), KeyringError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.key_path(key_id), encode_recovery_key(key))?;
        Ok(())
    }

    pub fn load(&self, key_id: &str) -> Result<Option<StorageKey>, KeyringError> {
        let path = self.key_path(key_id);
        if !path.exists() {
            return Ok(None);
        }
        let recovery_key = fs::read_to_string(path)?;
        decode_recovery_key(&recovery_key)
            .map(Some)
            .map_err(|e| KeyringError::InvalidKey(key_id.to_string(), e))
    }

    pub fn contains(&self, key_id: &str) -> bool {
        self.key_path(key_id).exists()
    }
}

/// Supplies raw keys to secret storage
///
/// An explicitly given key is offered for whichever candidate key it passes
/// the key check for. Otherwise the first candidate found in the keyring is
/// used.
pub struct KeyringCallbacks {
    keyring: Keyring,
    key: Option<StorageKey>,
}

impl KeyringCallbacks {
    pub fn new(keyring: Keyring, key: Option<StorageKey>) -> Self {
        Self { keyring, key }
    }
}

#[async_trait]
impl CryptoCallbacks for KeyringCallbacks {
    async fn get_secret_storage_key(
        &self,
        keys: &BTreeMap<String, SecretStorageKeyDescription>,
        name: &str,
    ) -> Option<(String, StorageKey)> {
        if let Some(key) = &self.key {
            let matching = keys
                .iter()
                .find(|(_, descriptor)| descriptor.check_key(key).unwrap_or(false));
            if matching.is_none() {
                tracing::warn!("given key does not match any key {} is stored under", name);
            }
            return matching.map(|(key_id, _)| (key_id.clone(), key.clone()));
        }

        for key_id in keys.keys() {
            match self.keyring.load(key_id) {
                Ok(Some(key)) => return Some((key_id.clone(), key)),
                Ok(None) => {}
                Err(e) => tracing::warn!("skipping key {}: {}", key_id, e),
            }
        }
        tracing::warn!("no key for {} in the keyring", name);
        None
    }
}
