use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use subtle::ConstantTimeEq;

use crate::crypto::{calculate_key_check, EncryptedPayload, StorageKey};

use super::error::SecretStorageError;
use super::ALGORITHM_AES_HMAC_SHA2;

/// Algorithm a storage key is used with
///
/// Anything other than the one algorithm we implement is carried through as
/// `Unknown` so that descriptors written by other clients survive a
/// read/write cycle untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SecretStorageAlgorithm {
    AesHmacSha2V1,
    Unknown(String),
}

impl SecretStorageAlgorithm {
    pub fn as_str(&self) -> &str {
        match self {
            SecretStorageAlgorithm::AesHmacSha2V1 => ALGORITHM_AES_HMAC_SHA2,
            SecretStorageAlgorithm::Unknown(algorithm) => algorithm,
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, SecretStorageAlgorithm::AesHmacSha2V1)
    }
}

impl From<String> for SecretStorageAlgorithm {
    fn from(algorithm: String) -> Self {
        if algorithm == ALGORITHM_AES_HMAC_SHA2 {
            SecretStorageAlgorithm::AesHmacSha2V1
        } else {
            SecretStorageAlgorithm::Unknown(algorithm)
        }
    }
}

impl From<&str> for SecretStorageAlgorithm {
    fn from(algorithm: &str) -> Self {
        Self::from(algorithm.to_string())
    }
}

impl From<SecretStorageAlgorithm> for String {
    fn from(algorithm: SecretStorageAlgorithm) -> Self {
        match algorithm {
            SecretStorageAlgorithm::AesHmacSha2V1 => ALGORITHM_AES_HMAC_SHA2.to_string(),
            SecretStorageAlgorithm::Unknown(algorithm) => algorithm,
        }
    }
}

impl fmt::Display for SecretStorageAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a key was derived from a passphrase
///
/// Stored and returned as-is. Turning a passphrase into key bytes is left to
/// the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassphraseInfo {
    pub algorithm: String,
    pub salt: String,
    pub iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bits: Option<u32>,
}

/// Metadata describing a secret storage key, never the key itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretStorageKeyDescription {
    pub algorithm: SecretStorageAlgorithm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<PassphraseInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

impl SecretStorageKeyDescription {
    /// Check whether a raw key matches this descriptor's key-check value
    ///
    /// A descriptor without a `mac` cannot be checked and is assumed to
    /// match. MACs are compared in constant time with any trailing base64
    /// padding removed, since other clients store them unpadded.
    pub fn check_key(&self, key: &StorageKey) -> Result<bool, SecretStorageError> {
        if !self.algorithm.is_supported() {
            return Err(SecretStorageError::UnsupportedAlgorithm(
                self.algorithm.to_string(),
            ));
        }
        let Some(stored_mac) = self.mac.as_deref() else {
            return Ok(true);
        };

        let check = calculate_key_check(key, self.iv.as_deref())?;
        let expected = check.mac.trim_end_matches('=');
        let stored = stored_mac.trim_end_matches('=');
        Ok(expected.as_bytes().ct_eq(stored.as_bytes()).into())
    }
}

/// Content of the `m.secret_storage.default_key` record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultKeyPointer {
    pub key: String,
}

/// A secret as written to account data
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredSecret {
    pub encrypted: BTreeMap<String, EncryptedPayload>,
}

/// A secret as read back from account data
///
/// Entries are kept as raw JSON so that a single malformed envelope does not
/// make the whole record unreadable.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StoredSecretRecord {
    #[serde(default)]
    pub encrypted: Option<BTreeMap<String, Value>>,
}

/// Options for creating a new storage key
#[derive(Debug, Clone, Default)]
pub struct AddKeyOptions {
    /// Human readable name for the key
    pub name: Option<String>,
    /// Passphrase derivation parameters, if the key came from a passphrase
    pub passphrase: Option<PassphraseInfo>,
    /// The raw key; when given a key-check value is stored with the descriptor
    pub key: Option<StorageKey>,
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_json_shape() {
        let descriptor = SecretStorageKeyDescription {
            algorithm: SecretStorageAlgorithm::AesHmacSha2V1,
            name: Some("backup".to_string()),
            passphrase: None,
            iv: None,
            mac: None,
        };
        assert_eq!(
            serde_json::to_value(&descriptor).unwrap(),
            json!({"algorithm": "m.secret_storage.v1.aes-hmac-sha2", "name": "backup"})
        );
    }

    #[test]
    fn test_unknown_algorithm_roundtrips() {
        let raw = json!({"algorithm": "m.secret_storage.v2.something", "iv": "abc"});
        let descriptor: SecretStorageKeyDescription = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(
            descriptor.algorithm,
            SecretStorageAlgorithm::Unknown("m.secret_storage.v2.something".to_string())
        );
        assert!(!descriptor.algorithm.is_supported());
        assert_eq!(serde_json::to_value(&descriptor).unwrap(), raw);
    }

    #[test]
    fn test_passphrase_bits_optional() {
        let raw = json!({
            "algorithm": "m.secret_storage.v1.aes-hmac-sha2",
            "passphrase": {"algorithm": "m.pbkdf2", "salt": "salty", "iterations": 500000}
        });
        let descriptor: SecretStorageKeyDescription = serde_json::from_value(raw.clone()).unwrap();
        let passphrase = descriptor.passphrase.clone().unwrap();
        assert_eq!(passphrase.iterations, 500000);
        assert_eq!(passphrase.bits, None);
        assert_eq!(serde_json::to_value(&descriptor).unwrap(), raw);
    }

    #[test]
    fn test_check_key_padded_and_unpadded() {
        let key = StorageKey::generate();
        let check = calculate_key_check(&key, None).unwrap();
        let mut descriptor = SecretStorageKeyDescription {
            algorithm: SecretStorageAlgorithm::AesHmacSha2V1,
            name: None,
            passphrase: None,
            iv: Some(check.iv.clone()),
            mac: Some(check.mac.clone()),
        };
        assert!(descriptor.check_key(&key).unwrap());

        descriptor.mac = Some(check.mac.trim_end_matches('=').to_string());
        assert!(descriptor.check_key(&key).unwrap());
        assert!(!descriptor.check_key(&StorageKey::generate()).unwrap());
    }

    #[test]
    fn test_check_key_without_mac() {
        let descriptor = SecretStorageKeyDescription {
            algorithm: SecretStorageAlgorithm::AesHmacSha2V1,
            name: None,
            passphrase: None,
            iv: None,
            mac: None,
        };
        assert!(descriptor.check_key(&StorageKey::generate()).unwrap());
    }

    #[test]
    fn test_check_key_unsupported_algorithm() {
        let descriptor = SecretStorageKeyDescription {
            algorithm: SecretStorageAlgorithm::from("org.example.rot13"),
            name: None,
            passphrase: None,
            iv: None,
            mac: None,
        };
        assert!(matches!(
            descriptor.check_key(&StorageKey::generate()),
            Err(SecretStorageError::UnsupportedAlgorithm(_))
        ));
    }
}
