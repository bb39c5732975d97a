use std::fmt::Display;

use crate::account_data::AccountDataError;
use crate::crypto::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum SecretStorageError {
    #[error("unknown algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("no key with id {0}")]
    UnknownKey(String),
    #[error("no default key set and no key ids given")]
    NoDefaultKey,
    #[error("no keys specified")]
    EmptyKeySet,
    #[error("secret {0} is not encrypted")]
    NotEncrypted(String),
    #[error("no usable key for secret {0}")]
    NoUsableKey(String),
    #[error("no secret storage key callback installed")]
    MissingCallback,
    #[error("invalid key returned by callback: {0}")]
    InvalidCallbackResult(String),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("account data error: {0}")]
    AccountData(anyhow::Error),
    #[error("invalid record {0}: {1}")]
    InvalidRecord(String, String),
}

impl<T> From<AccountDataError<T>> for SecretStorageError
where
    T: Display,
{
    fn from(e: AccountDataError<T>) -> Self {
        match e {
            AccountDataError::InvalidRecord(event_type, err) => {
                SecretStorageError::InvalidRecord(event_type, err.to_string())
            }
            other => SecretStorageError::AccountData(anyhow::anyhow!("{}", other)),
        }
    }
}
