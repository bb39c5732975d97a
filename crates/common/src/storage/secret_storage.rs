use std::collections::BTreeMap;
use std::sync::Arc;

use rand::distr::Alphanumeric;
use rand::Rng;
use tokio::sync::broadcast::error::RecvError;

use crate::account_data::{AccountDataError, AccountDataProvider};
use crate::callbacks::CryptoCallbacks;
use crate::crypto::{calculate_key_check, decrypt_aes, encrypt_aes, EncryptedPayload, StorageKey};

use super::error::SecretStorageError;
use super::types::{
    AddKeyOptions, DefaultKeyPointer, SecretStorageAlgorithm, SecretStorageKeyDescription,
    StoredSecret, StoredSecretRecord,
};
use super::{key_event_type, DEFAULT_KEY_EVENT};

/// Length of generated key ids; 43 alphanumeric characters carry ~256 bits
pub const KEY_ID_LENGTH: usize = 43;

fn generate_key_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_ID_LENGTH)
        .map(char::from)
        .collect()
}

/// A key descriptor as found when choosing keys for a secret
enum DescriptorLookup {
    Missing,
    Unsupported(SecretStorageAlgorithm),
    Malformed(serde_json::Error),
    Usable(SecretStorageKeyDescription),
}

/// Encrypted secret storage on top of a user's account data
///
/// Manages key descriptors and the default key pointer, and stores and
/// retrieves named secrets encrypted under one or more of those keys. Raw
/// keys are never held here; they are requested from the installed
/// [`CryptoCallbacks`] each time one is needed and dropped straight after.
#[derive(Clone)]
pub struct SecretStorage<P: AccountDataProvider> {
    account_data: P,
    callbacks: Option<Arc<dyn CryptoCallbacks>>,
}

impl<P: AccountDataProvider> std::fmt::Debug for SecretStorage<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStorage")
            .field("account_data", &self.account_data)
            .field("callbacks", &self.callbacks.is_some())
            .finish()
    }
}

impl<P: AccountDataProvider> SecretStorage<P> {
    pub fn new(account_data: P) -> Self {
        Self {
            account_data,
            callbacks: None,
        }
    }

    pub fn with_callbacks(mut self, callbacks: Arc<dyn CryptoCallbacks>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    pub fn account_data(&self) -> &P {
        &self.account_data
    }

    /* Key registry */

    /// Get the id of the default storage key, if one is set
    pub async fn get_default_key_id(&self) -> Result<Option<String>, SecretStorageError> {
        let pointer: Option<DefaultKeyPointer> =
            self.account_data.get_typed(DEFAULT_KEY_EVENT).await?;
        Ok(pointer.map(|p| p.key))
    }

    /// Point the default key at `key_id`
    ///
    /// Resolves once the change has come back through the account data
    /// notification stream, so a subsequent read observes it.
    pub async fn set_default_key_id(&self, key_id: &str) -> Result<(), SecretStorageError> {
        let mut events = self.account_data.subscribe();
        self.account_data
            .set_typed(
                DEFAULT_KEY_EVENT,
                &DefaultKeyPointer {
                    key: key_id.to_string(),
                },
            )
            .await?;

        loop {
            match events.recv().await {
                Ok(event) => {
                    if event.event_type == DEFAULT_KEY_EVENT
                        && event.content.get("key").and_then(|k| k.as_str()) == Some(key_id)
                    {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(
                        "missed {} account data notifications, checking default key directly",
                        skipped
                    );
                    if self.get_default_key_id().await?.as_deref() == Some(key_id) {
                        break;
                    }
                }
                Err(RecvError::Closed) => {
                    return Err(AccountDataError::<P::Error>::NotificationsClosed.into());
                }
            }
        }

        tracing::info!("default secret storage key set to {}", key_id);
        Ok(())
    }

    /// Add a storage key descriptor
    ///
    /// If `key_id` is not given a fresh random id is generated. If the raw
    /// key is passed in `options`, a key-check value is stored with the
    /// descriptor so the key can later be verified with [`Self::check_key`].
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAlgorithm` for anything other than
    /// `m.secret_storage.v1.aes-hmac-sha2`.
    pub async fn add_key(
        &self,
        algorithm: SecretStorageAlgorithm,
        options: AddKeyOptions,
        key_id: Option<&str>,
    ) -> Result<(String, SecretStorageKeyDescription), SecretStorageError> {
        if !algorithm.is_supported() {
            return Err(SecretStorageError::UnsupportedAlgorithm(algorithm.to_string()));
        }

        let mut descriptor = SecretStorageKeyDescription {
            algorithm,
            name: options.name,
            passphrase: options.passphrase,
            iv: None,
            mac: None,
        };
        if let Some(key) = options.key.as_ref() {
            let check = calculate_key_check(key, None)?;
            descriptor.iv = Some(check.iv);
            descriptor.mac = Some(check.mac);
        }

        let key_id = match key_id {
            Some(key_id) => key_id.to_string(),
            None => loop {
                let candidate = generate_key_id();
                if self
                    .account_data
                    .get(&key_event_type(&candidate))
                    .await?
                    .is_none()
                {
                    break candidate;
                }
            },
        };

        self.account_data
            .set_typed(&key_event_type(&key_id), &descriptor)
            .await?;
        tracing::info!("added secret storage key {}", key_id);

        Ok((key_id, descriptor))
    }

    /// Get a key descriptor by id, or the default key if `key_id` is `None`
    pub async fn get_key(
        &self,
        key_id: Option<&str>,
    ) -> Result<Option<(String, SecretStorageKeyDescription)>, SecretStorageError> {
        let key_id = match key_id {
            Some(key_id) => key_id.to_string(),
            None => match self.get_default_key_id().await? {
                Some(key_id) => key_id,
                None => return Ok(None),
            },
        };

        let descriptor: Option<SecretStorageKeyDescription> = self
            .account_data
            .get_typed(&key_event_type(&key_id))
            .await?;
        Ok(descriptor.map(|d| (key_id, d)))
    }

    /// Whether a key descriptor exists, the default key if `key_id` is `None`
    pub async fn has_key(&self, key_id: Option<&str>) -> Result<bool, SecretStorageError> {
        Ok(self.get_key(key_id).await?.is_some())
    }

    /// Check a raw key against a descriptor's key-check value
    pub fn check_key(
        &self,
        key: &StorageKey,
        descriptor: &SecretStorageKeyDescription,
    ) -> Result<bool, SecretStorageError> {
        descriptor.check_key(key)
    }

    /* Secrets */

    /// Encrypt `secret` under each of `key_ids` and store it as `name`
    ///
    /// `None` uses the default key. Keys whose algorithm we do not support
    /// are skipped.
    pub async fn store(
        &self,
        name: &str,
        secret: &str,
        key_ids: Option<&[String]>,
    ) -> Result<(), SecretStorageError> {
        let key_ids: Vec<String> = match key_ids {
            Some(key_ids) => key_ids.to_vec(),
            None => match self.get_default_key_id().await? {
                Some(key_id) => vec![key_id],
                None => return Err(SecretStorageError::NoDefaultKey),
            },
        };
        if key_ids.is_empty() {
            return Err(SecretStorageError::EmptyKeySet);
        }

        let mut encrypted = BTreeMap::new();
        for key_id in key_ids {
            let descriptor = match self.lookup_descriptor(&key_id).await? {
                DescriptorLookup::Usable(descriptor) => descriptor,
                DescriptorLookup::Missing => return Err(SecretStorageError::UnknownKey(key_id)),
                DescriptorLookup::Unsupported(algorithm) => {
                    tracing::warn!(
                        "unknown algorithm {} for key {}, not storing {} under it",
                        algorithm,
                        key_id,
                        name
                    );
                    continue;
                }
                DescriptorLookup::Malformed(e) => {
                    return Err(SecretStorageError::InvalidRecord(
                        key_event_type(&key_id),
                        e.to_string(),
                    ));
                }
            };

            let offered = BTreeMap::from([(key_id.clone(), descriptor)]);
            let (key_id, key) = self.request_key(&offered, name).await?;
            let payload = encrypt_aes(secret, &key, name, None)?;
            encrypted.insert(key_id, payload);
        }

        self.account_data
            .set_typed(name, &StoredSecret { encrypted })
            .await?;
        tracing::info!("stored secret {}", name);
        Ok(())
    }

    /// Get and decrypt the secret stored as `name`
    ///
    /// Returns `Ok(None)` if there is no such record.
    pub async fn get(&self, name: &str) -> Result<Option<String>, SecretStorageError> {
        let Some(record) = self.account_data.get_typed::<StoredSecretRecord>(name).await? else {
            return Ok(None);
        };
        let Some(encrypted) = record.encrypted else {
            return Err(SecretStorageError::NotEncrypted(name.to_string()));
        };

        let usable = self.usable_keys(encrypted).await?;
        if usable.is_empty() {
            return Err(SecretStorageError::NoUsableKey(name.to_string()));
        }

        let offered: BTreeMap<String, SecretStorageKeyDescription> = usable
            .iter()
            .map(|(key_id, (descriptor, _))| (key_id.clone(), descriptor.clone()))
            .collect();
        let (key_id, key) = self.request_key(&offered, name).await?;

        let (_, payload) = &usable[&key_id];
        let secret = decrypt_aes(payload, &key, name)?;
        tracing::debug!("decrypted secret {} with key {}", name, key_id);
        Ok(Some(secret))
    }

    /// Which usable keys the secret `name` is stored under
    ///
    /// Never asks for raw keys. Returns `Ok(None)` if the secret is absent,
    /// unencrypted, or not stored under any key we can use.
    pub async fn is_stored(
        &self,
        name: &str,
    ) -> Result<Option<BTreeMap<String, SecretStorageKeyDescription>>, SecretStorageError> {
        let Some(record) = self.account_data.get_typed::<StoredSecretRecord>(name).await? else {
            return Ok(None);
        };
        let Some(encrypted) = record.encrypted else {
            return Ok(None);
        };

        let usable = self.usable_keys(encrypted).await?;
        if usable.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            usable
                .into_iter()
                .map(|(key_id, (descriptor, _))| (key_id, descriptor))
                .collect(),
        ))
    }

    /// Filter a secret's envelopes down to the ones we could decrypt
    ///
    /// An envelope is usable when its key descriptor exists, uses a
    /// supported algorithm and the envelope has all of its fields.
    async fn usable_keys(
        &self,
        encrypted: BTreeMap<String, serde_json::Value>,
    ) -> Result<BTreeMap<String, (SecretStorageKeyDescription, EncryptedPayload)>, SecretStorageError>
    {
        let mut usable = BTreeMap::new();
        for (key_id, envelope) in encrypted {
            let Ok(payload) = serde_json::from_value::<EncryptedPayload>(envelope) else {
                tracing::debug!("malformed envelope for key {}", key_id);
                continue;
            };
            match self.lookup_descriptor(&key_id).await? {
                DescriptorLookup::Usable(descriptor) => {
                    usable.insert(key_id, (descriptor, payload));
                }
                DescriptorLookup::Missing => {}
                DescriptorLookup::Unsupported(algorithm) => {
                    tracing::debug!("skipping key {} with algorithm {}", key_id, algorithm);
                }
                DescriptorLookup::Malformed(e) => {
                    tracing::debug!("skipping key {} with malformed descriptor: {}", key_id, e);
                }
            }
        }
        Ok(usable)
    }

    /// Read the descriptor of `key_id`, parsing it fully only if we support
    /// its algorithm
    ///
    /// Descriptors for other algorithms may carry fields in shapes of their
    /// own, so only `algorithm` is looked at for those.
    async fn lookup_descriptor(&self, key_id: &str) -> Result<DescriptorLookup, SecretStorageError> {
        let Some(content) = self.account_data.get(&key_event_type(key_id)).await? else {
            return Ok(DescriptorLookup::Missing);
        };

        let algorithm = match content.get("algorithm").and_then(|a| a.as_str()) {
            Some(algorithm) => SecretStorageAlgorithm::from(algorithm),
            None => SecretStorageAlgorithm::Unknown(String::new()),
        };
        if !algorithm.is_supported() {
            return Ok(DescriptorLookup::Unsupported(algorithm));
        }

        Ok(match serde_json::from_value(content) {
            Ok(descriptor) => DescriptorLookup::Usable(descriptor),
            Err(e) => DescriptorLookup::Malformed(e),
        })
    }

    /// Ask the application for a raw key out of the offered set
    async fn request_key(
        &self,
        offered: &BTreeMap<String, SecretStorageKeyDescription>,
        name: &str,
    ) -> Result<(String, StorageKey), SecretStorageError> {
        let callbacks = self
            .callbacks
            .as_ref()
            .ok_or(SecretStorageError::MissingCallback)?;

        let (key_id, key) = callbacks
            .get_secret_storage_key(offered, name)
            .await
            .ok_or_else(|| {
                SecretStorageError::InvalidCallbackResult("no key returned".to_string())
            })?;
        if !offered.contains_key(&key_id) {
            return Err(SecretStorageError::InvalidCallbackResult(format!(
                "key {} was not offered",
                key_id
            )));
        }
        Ok((key_id, key))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::account_data::MemoryAccountDataProvider;
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedKey(String, StorageKey);

    #[async_trait]
    impl CryptoCallbacks for FixedKey {
        async fn get_secret_storage_key(
            &self,
            keys: &BTreeMap<String, SecretStorageKeyDescription>,
            _name: &str,
        ) -> Option<(String, StorageKey)> {
            keys.contains_key(&self.0)
                .then(|| (self.0.clone(), self.1.clone()))
        }
    }

    #[test]
    fn test_generated_key_ids() {
        let a = generate_key_id();
        let b = generate_key_id();
        assert_eq!(a.len(), KEY_ID_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_add_key_generates_id_and_check() {
        let storage = SecretStorage::new(MemoryAccountDataProvider::new());
        let key = StorageKey::generate();
        let (key_id, descriptor) = storage
            .add_key(
                SecretStorageAlgorithm::AesHmacSha2V1,
                AddKeyOptions {
                    name: Some("recovery".to_string()),
                    key: Some(key.clone()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(key_id.len(), KEY_ID_LENGTH);
        assert!(descriptor.iv.is_some() && descriptor.mac.is_some());
        assert!(storage.check_key(&key, &descriptor).unwrap());

        let (loaded_id, loaded) = storage.get_key(Some(&key_id)).await.unwrap().unwrap();
        assert_eq!(loaded_id, key_id);
        assert_eq!(loaded, descriptor);
    }

    #[tokio::test]
    async fn test_add_key_rejects_unknown_algorithm() {
        let storage = SecretStorage::new(MemoryAccountDataProvider::new());
        let result = storage
            .add_key(
                SecretStorageAlgorithm::from("org.example.none"),
                AddKeyOptions::default(),
                Some("A"),
            )
            .await;
        assert!(matches!(
            result,
            Err(SecretStorageError::UnsupportedAlgorithm(_))
        ));
        assert!(!storage.has_key(Some("A")).await.unwrap());
    }

    #[tokio::test]
    async fn test_default_key_resolution() {
        let storage = SecretStorage::new(MemoryAccountDataProvider::new());
        assert_eq!(storage.get_default_key_id().await.unwrap(), None);
        assert_eq!(storage.get_key(None).await.unwrap(), None);
        assert!(!storage.has_key(None).await.unwrap());

        storage
            .add_key(
                SecretStorageAlgorithm::AesHmacSha2V1,
                AddKeyOptions::default(),
                Some("A"),
            )
            .await
            .unwrap();
        storage.set_default_key_id("A").await.unwrap();

        assert_eq!(
            storage.get_default_key_id().await.unwrap(),
            Some("A".to_string())
        );
        let (key_id, _) = storage.get_key(None).await.unwrap().unwrap();
        assert_eq!(key_id, "A");
        assert!(storage.has_key(None).await.unwrap());
    }

    #[tokio::test]
    async fn test_store_without_callbacks() {
        let storage = SecretStorage::new(MemoryAccountDataProvider::new());
        storage
            .add_key(
                SecretStorageAlgorithm::AesHmacSha2V1,
                AddKeyOptions::default(),
                Some("A"),
            )
            .await
            .unwrap();

        let result = storage
            .store("m.test", "secret", Some(&["A".to_string()]))
            .await;
        assert!(matches!(result, Err(SecretStorageError::MissingCallback)));
    }

    #[tokio::test]
    async fn test_get_skips_malformed_envelopes() {
        let key = StorageKey::generate();
        let storage = SecretStorage::new(MemoryAccountDataProvider::new())
            .with_callbacks(Arc::new(FixedKey("A".to_string(), key)));
        storage
            .add_key(
                SecretStorageAlgorithm::AesHmacSha2V1,
                AddKeyOptions::default(),
                Some("A"),
            )
            .await
            .unwrap();
        storage
            .account_data()
            .set("m.test", json!({"encrypted": {"A": {"iv": "abc"}}}))
            .await
            .unwrap();

        assert!(matches!(
            storage.get("m.test").await,
            Err(SecretStorageError::NoUsableKey(_))
        ));
        assert_eq!(storage.is_stored("m.test").await.unwrap(), None);
    }
}
