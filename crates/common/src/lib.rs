/**
 * Per-user record store that secrets and key
 *  descriptors are persisted in, plus an
 *  in-memory implementation.
 */
pub mod account_data;
/**
 * Application hooks for supplying raw keys
 *  and approving share requests.
 */
pub mod callbacks;
/**
 * Cryptographic types and operations.
 *  - Storage keys and their recovery encoding
 *  - AES-CTR + HMAC secret envelopes
 */
pub mod crypto;
/**
 * Requesting secrets from, and sharing them
 *  with, a user's other devices.
 */
pub mod sharing;
/**
 * Encrypted secret storage: key registry
 *  and named secrets on top of account data.
 */
pub mod storage;
/**
 * In-process multi-device harness for
 *  exercising secret sharing in tests.
 */
pub mod testkit;

pub mod prelude {
    pub use crate::account_data::{AccountDataProvider, MemoryAccountDataProvider};
    pub use crate::callbacks::CryptoCallbacks;
    pub use crate::crypto::{decode_recovery_key, encode_recovery_key, StorageKey};
    pub use crate::sharing::{DeviceClient, DeviceTrust, SecretSharing, SharingError};
    pub use crate::storage::{
        AddKeyOptions, SecretStorage, SecretStorageAlgorithm, SecretStorageError,
        SecretStorageKeyDescription,
    };
}
