use std::fmt::{Debug, Display};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

#[derive(thiserror::Error, Debug)]
pub enum AccountDataError<T> {
    /// The backing store failed
    #[error("unhandled account data provider error: {0}")]
    Provider(#[from] T),
    /// A record exists but does not have the expected shape
    #[error("invalid account data record {0}: {1}")]
    InvalidRecord(String, serde_json::Error),
    /// The change notification stream closed before we saw what we waited for
    #[error("account data change notifications closed")]
    NotificationsClosed,
}

/// A change to a single account data record, as delivered to subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct AccountDataEvent {
    pub event_type: String,
    pub content: Value,
}

/// Per-user server-side record store that secret storage lives in
///
/// This is the only capability the storage half of the engine needs. Records
/// are JSON objects keyed by an event type such as
/// `m.secret_storage.default_key`.
#[async_trait]
pub trait AccountDataProvider: Send + Sync + std::fmt::Debug + Clone + 'static {
    type Error: Display + Debug + Send + Sync + 'static;

    /// Get the current value of a record from the server
    ///
    /// # Returns
    /// * `Ok(None)` - No record of this type exists
    /// * `Ok(Some(content))` - The record's content
    async fn get(&self, event_type: &str) -> Result<Option<Value>, AccountDataError<Self::Error>>;

    /// Set the value of a record, replacing any previous value
    ///
    /// Subscribers should be notified once the change is visible, which may
    /// be after this returns.
    async fn set(&self, event_type: &str, content: Value)
        -> Result<(), AccountDataError<Self::Error>>;

    /// Subscribe to record changes
    fn subscribe(&self) -> broadcast::Receiver<AccountDataEvent>;

    /// Get a record and deserialize it
    async fn get_typed<T>(&self, event_type: &str) -> Result<Option<T>, AccountDataError<Self::Error>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        match self.get(event_type).await? {
            Some(content) => serde_json::from_value(content)
                .map(Some)
                .map_err(|e| AccountDataError::InvalidRecord(event_type.to_string(), e)),
            None => Ok(None),
        }
    }

    /// Serialize a value and store it as a record
    async fn set_typed<T>(
        &self,
        event_type: &str,
        content: &T,
    ) -> Result<(), AccountDataError<Self::Error>>
    where
        T: Serialize + Sync,
    {
        let content = serde_json::to_value(content)
            .map_err(|e| AccountDataError::InvalidRecord(event_type.to_string(), e))?;
        self.set(event_type, content).await
    }
}
