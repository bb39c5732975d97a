//! Human-transcribable encoding of storage keys
//!
//! A recovery key is what a user writes down instead of raw key bytes:
//!
//! ```text
//! base58( 0x8B 0x01 || key (32 bytes) || parity (1 byte) )
//! ```
//!
//! where the parity byte is the XOR of every preceding byte. The Base58
//! string is shown in groups of four characters separated by spaces; any
//! whitespace is ignored when parsing.

use zeroize::{Zeroize, Zeroizing};

use super::storage_key::{StorageKey, STORAGE_KEY_SIZE};

/// Prefix identifying a secret storage recovery key
pub const RECOVERY_KEY_PREFIX: [u8; 2] = [0x8B, 0x01];
/// Total decoded length: prefix || key || parity
pub const RECOVERY_KEY_DECODED_SIZE: usize = RECOVERY_KEY_PREFIX.len() + STORAGE_KEY_SIZE + 1;

const GROUP_SIZE: usize = 4;

/// Errors that can occur when parsing a recovery key
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecoveryKeyError {
    #[error("recovery key is not valid base58")]
    InvalidBase58,
    #[error("recovery key has the wrong length, expected {expected} bytes, got {0}", expected = RECOVERY_KEY_DECODED_SIZE)]
    InvalidLength(usize),
    #[error("recovery key has an unknown prefix")]
    InvalidPrefix,
    #[error("recovery key parity check failed")]
    InvalidParity,
}

fn parity(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Encode a storage key as a grouped recovery key string
pub fn encode_recovery_key(key: &StorageKey) -> String {
    let mut buff = Vec::with_capacity(RECOVERY_KEY_DECODED_SIZE);
    buff.extend_from_slice(&RECOVERY_KEY_PREFIX);
    buff.extend_from_slice(key.bytes());
    buff.push(parity(&buff));

    let encoded = bs58::encode(&buff).into_string();
    buff.zeroize();

    encoded
        .as_bytes()
        .chunks(GROUP_SIZE)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a recovery key string back into a storage key
///
/// # Errors
///
/// Returns an error if the string is not Base58, or the decoded bytes have
/// the wrong length, prefix or parity.
pub fn decode_recovery_key(recovery_key: &str) -> Result<StorageKey, RecoveryKeyError> {
    let compact: Zeroizing<String> = Zeroizing::new(recovery_key.split_whitespace().collect());
    let decoded = Zeroizing::new(
        bs58::decode(compact.as_str())
            .into_vec()
            .map_err(|_| RecoveryKeyError::InvalidBase58)?,
    );

    if parity(&decoded) != 0 {
        return Err(RecoveryKeyError::InvalidParity);
    }
    if decoded.len() != RECOVERY_KEY_DECODED_SIZE {
        return Err(RecoveryKeyError::InvalidLength(decoded.len()));
    }
    if decoded[..RECOVERY_KEY_PREFIX.len()] != RECOVERY_KEY_PREFIX {
        return Err(RecoveryKeyError::InvalidPrefix);
    }

    let start = RECOVERY_KEY_PREFIX.len();
    StorageKey::from_slice(&decoded[start..start + STORAGE_KEY_SIZE])
        .map_err(|_| RecoveryKeyError::InvalidLength(decoded.len()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_recovery_key_roundtrip() {
        let key = StorageKey::generate();
        let encoded = encode_recovery_key(&key);
        assert_eq!(decode_recovery_key(&encoded).unwrap(), key);
    }

    #[test]
    fn test_recovery_key_is_grouped() {
        let encoded = encode_recovery_key(&StorageKey::generate());
        let groups: Vec<&str> = encoded.split(' ').collect();
        assert!(groups.len() > 1);
        assert!(groups[..groups.len() - 1].iter().all(|g| g.len() == GROUP_SIZE));
        assert!(encoded.starts_with("Es"));
    }

    #[test]
    fn test_whitespace_is_ignored() {
        let key = StorageKey::generate();
        let encoded = encode_recovery_key(&key);
        let compact: String = encoded.split_whitespace().collect();
        let messy = format!("  {}\n", encoded.replace(' ', "\t"));
        assert_eq!(decode_recovery_key(&compact).unwrap(), key);
        assert_eq!(decode_recovery_key(&messy).unwrap(), key);
    }

    #[test]
    fn test_rejects_bad_parity() {
        let key = StorageKey::from([3u8; STORAGE_KEY_SIZE]);
        let mut buff = RECOVERY_KEY_PREFIX.to_vec();
        buff.extend_from_slice(key.bytes());
        buff.push(parity(&buff) ^ 1);
        let encoded = bs58::encode(buff).into_string();
        assert_eq!(
            decode_recovery_key(&encoded),
            Err(RecoveryKeyError::InvalidParity)
        );
    }

    #[test]
    fn test_rejects_bad_prefix() {
        let mut buff = vec![0x8B, 0x02];
        buff.extend_from_slice(&[5u8; STORAGE_KEY_SIZE]);
        buff.push(parity(&buff));
        let encoded = bs58::encode(buff).into_string();
        assert_eq!(
            decode_recovery_key(&encoded),
            Err(RecoveryKeyError::InvalidPrefix)
        );
    }

    #[test]
    fn test_rejects_bad_length() {
        let mut buff = RECOVERY_KEY_PREFIX.to_vec();
        buff.extend_from_slice(&[5u8; 16]);
        buff.push(parity(&buff));
        let encoded = bs58::encode(buff).into_string();
        assert_eq!(
            decode_recovery_key(&encoded),
            Err(RecoveryKeyError::InvalidLength(RECOVERY_KEY_PREFIX.len() + 17))
        );
    }

    #[test]
    fn test_rejects_non_base58() {
        assert_eq!(
            decode_recovery_key("0OIl not base58"),
            Err(RecoveryKeyError::InvalidBase58)
        );
    }
}
