//! Raw secret storage keys
//!
//! A `StorageKey` is the 256-bit key material a user holds for a secret
//! storage key descriptor. The core never persists it: the application hands
//! one over for a single encrypt/decrypt call and it is zeroized on drop.

use std::fmt;

use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a secret storage key in bytes (256 bits)
pub const STORAGE_KEY_SIZE: usize = 32;

/// Errors that can occur when parsing key material
#[derive(Debug, thiserror::Error)]
pub enum StorageKeyError {
    #[error("key error: {0}")]
    Default(#[from] anyhow::Error),
}

/// A 256-bit secret storage key
///
/// Each key descriptor stored in account data corresponds to one of these,
/// held only by the user (typically shown to them as a recovery key, see
/// [`super::recovery_key`]).
///
/// # Examples
///
/// ```ignore
/// let key = StorageKey::generate();
/// let payload = encrypt_aes("secret", &key, "m.cross_signing.master", None)?;
/// let plaintext = decrypt_aes(&payload, &key, "m.cross_signing.master")?;
/// ```
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StorageKey([u8; STORAGE_KEY_SIZE]);

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StorageKey(..)")
    }
}

impl PartialEq for StorageKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for StorageKey {}

impl From<[u8; STORAGE_KEY_SIZE]> for StorageKey {
    fn from(bytes: [u8; STORAGE_KEY_SIZE]) -> Self {
        StorageKey(bytes)
    }
}

impl StorageKey {
    /// Generate a new random key using a cryptographically secure RNG
    pub fn generate() -> Self {
        let mut buff = [0; STORAGE_KEY_SIZE];
        getrandom::getrandom(&mut buff).expect("failed to generate random bytes");
        Self(buff)
    }

    /// Create a key from a byte slice
    ///
    /// # Errors
    ///
    /// Returns an error if the slice length is not exactly `STORAGE_KEY_SIZE` bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, StorageKeyError> {
        if data.len() != STORAGE_KEY_SIZE {
            return Err(anyhow::anyhow!(
                "invalid storage key size, expected {}, got {}",
                STORAGE_KEY_SIZE,
                data.len()
            )
            .into());
        }
        let mut buff = [0; STORAGE_KEY_SIZE];
        buff.copy_from_slice(data);
        Ok(buff.into())
    }

    /// Parse a key from a hexadecimal string
    ///
    /// Accepts both plain hex and "0x"-prefixed hex strings.
    pub fn from_hex(hex: &str) -> Result<Self, StorageKeyError> {
        let hex = hex.trim();
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; STORAGE_KEY_SIZE];
        hex::decode_to_slice(hex, &mut buff)
            .map_err(|_| anyhow::anyhow!("storage key hex decode error"))?;
        Ok(buff.into())
    }

    /// Convert key to hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get a reference to the key bytes
    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }
}
