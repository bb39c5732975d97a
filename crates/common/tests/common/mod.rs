//! Shared test utilities for secret storage and sharing integration tests
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use common::account_data::MemoryAccountDataProvider;
use common::callbacks::CryptoCallbacks;
use common::crypto::StorageKey;
use common::sharing::DeviceTrust;
use common::storage::{
    AddKeyOptions, SecretStorage, SecretStorageAlgorithm, SecretStorageKeyDescription,
};

pub const USER_ID: &str = "@alice:example.org";

/// Install a log subscriber honouring RUST_LOG, once per test binary
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A share request as seen by [`TestCallbacks`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareRequest {
    pub user_id: String,
    pub device_id: String,
    pub request_id: String,
    pub name: String,
    pub trust: DeviceTrust,
}

/// Callbacks backed by an in-memory keyring and secret list
///
/// Supplies the first offered key it holds, and shares a secret it holds
/// only with verified devices. Every share request is recorded.
#[derive(Default)]
pub struct TestCallbacks {
    keys: Mutex<BTreeMap<String, StorageKey>>,
    secrets: Mutex<BTreeMap<String, String>>,
    requests: Mutex<Vec<ShareRequest>>,
}

impl TestCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(self, key_id: &str, key: StorageKey) -> Self {
        self.keys.lock().insert(key_id.to_string(), key);
        self
    }

    pub fn with_secret(self, name: &str, secret: &str) -> Self {
        self.secrets
            .lock()
            .insert(name.to_string(), secret.to_string());
        self
    }

    pub fn requests(&self) -> Vec<ShareRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CryptoCallbacks for TestCallbacks {
    async fn get_secret_storage_key(
        &self,
        keys: &BTreeMap<String, SecretStorageKeyDescription>,
        _name: &str,
    ) -> Option<(String, StorageKey)> {
        let held = self.keys.lock();
        keys.keys()
            .find_map(|key_id| held.get(key_id).map(|key| (key_id.clone(), key.clone())))
    }

    async fn on_secret_requested(
        &self,
        user_id: &str,
        device_id: &str,
        request_id: &str,
        name: &str,
        trust: DeviceTrust,
    ) -> Option<String> {
        self.requests.lock().push(ShareRequest {
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
            request_id: request_id.to_string(),
            name: name.to_string(),
            trust,
        });
        if !trust.is_verified() {
            return None;
        }
        self.secrets.lock().get(name).cloned()
    }
}

/// Secret storage over a fresh in-memory provider, with `callbacks` installed
pub fn setup_storage(callbacks: Arc<TestCallbacks>) -> SecretStorage<MemoryAccountDataProvider> {
    init_tracing();
    SecretStorage::new(MemoryAccountDataProvider::new()).with_callbacks(callbacks)
}

/// Add an AES key with a key-check value under `key_id`
pub async fn add_aes_key(
    storage: &SecretStorage<MemoryAccountDataProvider>,
    key_id: &str,
    key: &StorageKey,
) -> SecretStorageKeyDescription {
    let (_, descriptor) = storage
        .add_key(
            SecretStorageAlgorithm::AesHmacSha2V1,
            AddKeyOptions {
                key: Some(key.clone()),
                ..Default::default()
            },
            Some(key_id),
        )
        .await
        .unwrap();
    descriptor
}
