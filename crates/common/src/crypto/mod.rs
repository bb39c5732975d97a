//! Cryptographic primitives for secret storage
//!
//! - **Storage keys**: 256-bit keys held by the user, never persisted by us
//! - **Payload encryption**: AES-256-CTR + HMAC-SHA-256 with per-secret keys
//!   derived via HKDF from the storage key and the secret's name
//! - **Key checks**: a MAC over a fixed value that lets a client confirm a
//!   storage key matches a key descriptor without decrypting any secret
//! - **Recovery keys**: the Base58 form of a storage key shown to users

mod aes;
pub mod recovery_key;
mod storage_key;

pub use aes::{
    calculate_key_check, decrypt_aes, encrypt_aes, CodecError, EncryptedPayload, KeyCheck,
    IV_SIZE,
};
pub use recovery_key::{decode_recovery_key, encode_recovery_key, RecoveryKeyError};
pub use storage_key::{StorageKey, StorageKeyError, STORAGE_KEY_SIZE};
