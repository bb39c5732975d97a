//! Secret encryption using AES-256-CTR with HMAC-SHA-256
//!
//! This is the `m.secret_storage.v1.aes-hmac-sha2` payload format. Every
//! encryption derives a fresh pair of keys from the raw storage key, bound to
//! the name of the secret being encrypted:
//!
//! ```text
//! HKDF-SHA-256(salt = 0^32, ikm = storage_key, info = name) -> aes_key (32) || mac_key (32)
//! ciphertext = AES-256-CTR(aes_key, iv, plaintext)
//! mac        = HMAC-SHA-256(mac_key, ciphertext)
//! ```
//!
//! The same storage key encrypting under two different names therefore yields
//! payloads that cannot be swapped for one another.

use aes::Aes256;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::storage_key::StorageKey;

/// Size of the AES-CTR initialization vector in bytes
pub const IV_SIZE: usize = 16;
/// Size of each derived key (AES and HMAC) in bytes
pub const DERIVED_KEY_SIZE: usize = 32;

/// The plaintext encrypted to produce a key-check value
const KEY_CHECK_PLAINTEXT: &str = "\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0";

type Aes256Ctr = ctr::Ctr128BE<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Decodes base64 with or without trailing padding; other clients emit both.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Errors that can occur during encryption/decryption
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("bad MAC: the key does not match the encrypted payload")]
    AuthenticationFailure,
    #[error("failed to decode encrypted payload: {0}")]
    DecodeFailure(String),
    #[error("codec error: {0}")]
    Default(#[from] anyhow::Error),
}

/// An encrypted secret as it appears in account data
///
/// All three fields are standard base64 strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub iv: String,
    pub ciphertext: String,
    pub mac: String,
}

/// A key-check value stored alongside a key descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCheck {
    pub iv: String,
    pub mac: String,
}

/// Derive the per-secret AES and HMAC keys from a storage key
fn derive_keys(
    key: &StorageKey,
    name: &str,
) -> Result<Zeroizing<[u8; DERIVED_KEY_SIZE * 2]>, CodecError> {
    let hkdf = Hkdf::<Sha256>::new(Some(&[0u8; 32]), key.bytes());
    let mut okm = Zeroizing::new([0u8; DERIVED_KEY_SIZE * 2]);
    hkdf.expand(name.as_bytes(), &mut okm[..])
        .map_err(|e| anyhow::anyhow!("hkdf expand failed: {}", e))?;
    Ok(okm)
}

fn mac_for(mac_key: &[u8], ciphertext: &[u8]) -> Result<HmacSha256, CodecError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key)
        .map_err(|e| anyhow::anyhow!("invalid hmac key: {}", e))?;
    mac.update(ciphertext);
    Ok(mac)
}

fn decode_field(field: &str, value: &str) -> Result<Vec<u8>, CodecError> {
    LENIENT_BASE64
        .decode(value.trim())
        .map_err(|e| CodecError::DecodeFailure(format!("{} is not valid base64: {}", field, e)))
}

/// Generate a random IV with bit 63 cleared
///
/// With the top bit of the low half cleared, the counter never carries into
/// the high half, so a 64-bit counter implementation produces the same
/// keystream as our 128-bit one.
fn generate_iv() -> Result<[u8; IV_SIZE], CodecError> {
    let mut iv = [0u8; IV_SIZE];
    getrandom::getrandom(&mut iv).map_err(|e| anyhow::anyhow!("failed to generate iv: {}", e))?;
    iv[8] &= 0x7f;
    Ok(iv)
}

/// Encrypt a secret under a storage key, bound to the secret's name
///
/// If `iv` is given (base64) it is used instead of a fresh random one; this
/// is only meant for recomputing key-check values.
///
/// # Errors
///
/// Returns an error if the supplied IV is malformed or the system RNG fails.
pub fn encrypt_aes(
    plaintext: &str,
    key: &StorageKey,
    name: &str,
    iv: Option<&str>,
) -> Result<EncryptedPayload, CodecError> {
    let iv: [u8; IV_SIZE] = match iv {
        Some(iv) => decode_field("iv", iv)?
            .try_into()
            .map_err(|_| CodecError::DecodeFailure("iv has the wrong length".to_string()))?,
        None => generate_iv()?,
    };

    let keys = derive_keys(key, name)?;
    let (aes_key, mac_key) = keys.split_at(DERIVED_KEY_SIZE);

    let mut data = plaintext.as_bytes().to_vec();
    let mut cipher = Aes256Ctr::new_from_slices(aes_key, &iv)
        .map_err(|e| anyhow::anyhow!("invalid aes key: {}", e))?;
    cipher.apply_keystream(&mut data);

    let mac = mac_for(mac_key, &data)?.finalize().into_bytes();

    Ok(EncryptedPayload {
        iv: STANDARD.encode(iv),
        ciphertext: STANDARD.encode(&data),
        mac: STANDARD.encode(mac),
    })
}

/// Decrypt a secret previously encrypted with [`encrypt_aes`]
///
/// The MAC is verified before anything is decrypted.
///
/// # Errors
///
/// - `AuthenticationFailure` if the MAC does not match (wrong key, wrong
///   name, or tampered payload)
/// - `DecodeFailure` if a field is not valid base64, the IV has the wrong
///   length, or the plaintext is not UTF-8
pub fn decrypt_aes(
    payload: &EncryptedPayload,
    key: &StorageKey,
    name: &str,
) -> Result<String, CodecError> {
    let expected_mac = decode_field("mac", &payload.mac)?;
    let mut data = decode_field("ciphertext", &payload.ciphertext)?;
    let iv = decode_field("iv", &payload.iv)?;

    let keys = derive_keys(key, name)?;
    let (aes_key, mac_key) = keys.split_at(DERIVED_KEY_SIZE);

    mac_for(mac_key, &data)?
        .verify_slice(&expected_mac)
        .map_err(|_| CodecError::AuthenticationFailure)?;

    if iv.len() != IV_SIZE {
        return Err(CodecError::DecodeFailure(format!(
            "iv has the wrong length, expected {}, got {}",
            IV_SIZE,
            iv.len()
        )));
    }
    let mut cipher = Aes256Ctr::new_from_slices(aes_key, &iv)
        .map_err(|e| anyhow::anyhow!("invalid aes key: {}", e))?;
    cipher.apply_keystream(&mut data);

    String::from_utf8(data)
        .map_err(|_| CodecError::DecodeFailure("plaintext is not valid UTF-8".to_string()))
}

/// Compute a key-check value for a storage key
///
/// The check is the encryption of 32 zero bytes under the empty name. Pass
/// the `iv` stored in a key descriptor to reproduce its `mac`.
pub fn calculate_key_check(key: &StorageKey, iv: Option<&str>) -> Result<KeyCheck, CodecError> {
    let payload = encrypt_aes(KEY_CHECK_PLAINTEXT, key, "", iv)?;
    Ok(KeyCheck {
        iv: payload.iv,
        mac: payload.mac,
    })
}
