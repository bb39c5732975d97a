use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::crypto::StorageKey;
use crate::sharing::DeviceTrust;
use crate::storage::SecretStorageKeyDescription;

/// Hooks the application provides to supply keys and approve sharing
#[async_trait]
pub trait CryptoCallbacks: Send + Sync {
    /// Supply the raw key for one of the offered storage keys
    ///
    /// `keys` holds every key the secret named `name` can be encrypted or
    /// decrypted with. Return the id of the chosen key together with its raw
    /// bytes, or `None` if no key is available. Returning an id that was not
    /// offered is an error.
    async fn get_secret_storage_key(
        &self,
        keys: &BTreeMap<String, SecretStorageKeyDescription>,
        name: &str,
    ) -> Option<(String, StorageKey)>;

    /// Decide whether to share a secret with another of our devices
    ///
    /// Returning `None` refuses the request; nothing is sent back to the
    /// requester.
    async fn on_secret_requested(
        &self,
        _user_id: &str,
        _device_id: &str,
        _request_id: &str,
        _name: &str,
        _trust: DeviceTrust,
    ) -> Option<String> {
        None
    }
}
