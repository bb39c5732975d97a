use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

use super::provider::{AccountDataError, AccountDataEvent, AccountDataProvider};

/// Capacity of the change notification channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// In-memory account data provider using a HashMap
///
/// Clones share the same records and the same notification channel, so a
/// clone handed to a second component observes every write.
#[derive(Debug, Clone)]
pub struct MemoryAccountDataProvider {
    inner: Arc<RwLock<HashMap<String, Value>>>,
    events: broadcast::Sender<AccountDataEvent>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryAccountDataProviderError {
    #[error("memory provider error: {0}")]
    Internal(String),
}

impl MemoryAccountDataProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Names of every record currently stored
    pub fn event_types(&self) -> Vec<String> {
        match self.inner.read() {
            Ok(inner) => inner.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl Default for MemoryAccountDataProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountDataProvider for MemoryAccountDataProvider {
    type Error = MemoryAccountDataProviderError;

    async fn get(&self, event_type: &str) -> Result<Option<Value>, AccountDataError<Self::Error>> {
        let inner = self.inner.read().map_err(|e| {
            AccountDataError::Provider(MemoryAccountDataProviderError::Internal(format!(
                "failed to acquire read lock: {}",
                e
            )))
        })?;

        Ok(inner.get(event_type).cloned())
    }

    async fn set(
        &self,
        event_type: &str,
        content: Value,
    ) -> Result<(), AccountDataError<Self::Error>> {
        {
            let mut inner = self.inner.write().map_err(|e| {
                AccountDataError::Provider(MemoryAccountDataProviderError::Internal(format!(
                    "failed to acquire write lock: {}",
                    e
                )))
            })?;
            inner.insert(event_type.to_string(), content.clone());
        }

        // no subscribers is fine
        let _ = self.events.send(AccountDataEvent {
            event_type: event_type.to_string(),
            content,
        });

        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AccountDataEvent> {
        self.events.subscribe()
    }
}
