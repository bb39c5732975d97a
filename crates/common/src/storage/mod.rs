//! Secret storage: encrypted secrets kept in account data
//!
//! Three kinds of record live in account data:
//!
//! - `m.secret_storage.default_key` holds `{key}`, the id of the default key
//! - `m.secret_storage.key.<id>` holds a key descriptor
//! - `<secret name>` holds `{encrypted: {<id>: {iv, ciphertext, mac}}}`
//!
//! A secret may be encrypted under several keys at once; any one of them is
//! enough to read it back.

mod error;
mod secret_storage;
mod types;

pub use error::SecretStorageError;
pub use secret_storage::{SecretStorage, KEY_ID_LENGTH};
pub use types::{
    AddKeyOptions, DefaultKeyPointer, PassphraseInfo, SecretStorageAlgorithm,
    SecretStorageKeyDescription, StoredSecret,
};

/// The only algorithm we can encrypt and decrypt with
pub const ALGORITHM_AES_HMAC_SHA2: &str = "m.secret_storage.v1.aes-hmac-sha2";
/// Record holding the default key pointer
pub const DEFAULT_KEY_EVENT: &str = "m.secret_storage.default_key";
/// Prefix of the record holding a key descriptor
pub const KEY_EVENT_PREFIX: &str = "m.secret_storage.key.";

/// Name of the record holding the descriptor for `key_id`
pub fn key_event_type(key_id: &str) -> String {
    format!("{}{}", KEY_EVENT_PREFIX, key_id)
}
