use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use common::account_data::{AccountDataError, AccountDataEvent, AccountDataProvider};
use common::storage::KEY_EVENT_PREFIX;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const RECORD_EXTENSION: &str = "json";

/// Account data kept as one JSON file per record in a local directory
///
/// Change notifications only cover writes made through this handle (and its
/// clones), which is all a single CLI invocation ever sees.
#[derive(Debug, Clone)]
pub struct FileAccountDataProvider {
    dir: PathBuf,
    events: broadcast::Sender<AccountDataEvent>,
}

#[derive(Debug, thiserror::Error)]
pub enum FileAccountDataProviderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("record {0} is not valid json: {1}")]
    Json(String, serde_json::Error),
    #[error("invalid record name: {0:?}")]
    InvalidName(String),
}

type Result<T> = std::result::Result<T, AccountDataError<FileAccountDataProviderError>>;

fn io_error(e: std::io::Error) -> AccountDataError<FileAccountDataProviderError> {
    AccountDataError::Provider(FileAccountDataProviderError::Io(e))
}

impl FileAccountDataProvider {
    pub fn new(dir: PathBuf) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { dir, events }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, event_type: &str) -> Result<PathBuf> {
        // record names become file names
        if event_type.is_empty()
            || event_type.starts_with('.')
            || event_type.contains(['/', '\\'])
        {
            return Err(AccountDataError::Provider(
                FileAccountDataProviderError::InvalidName(event_type.to_string()),
            ));
        }
        Ok(self
            .dir
            .join(format!("{}.{}", event_type, RECORD_EXTENSION)))
    }

    /// Names of every stored record, sorted
    pub async fn event_types(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(e)),
        };

        let mut event_types = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }
            if let Some(event_type) = file_name.strip_suffix(&format!(".{}", RECORD_EXTENSION)) {
                event_types.push(event_type.to_string());
            }
        }
        event_types.sort();
        Ok(event_types)
    }

    /// Ids of every stored key descriptor, sorted
    pub async fn key_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .event_types()
            .await?
            .into_iter()
            .filter_map(|event_type| {
                event_type
                    .strip_prefix(KEY_EVENT_PREFIX)
                    .map(str::to_string)
            })
            .collect())
    }
}

#[async_trait]
impl AccountDataProvider for FileAccountDataProvider {
    type Error = FileAccountDataProviderError;

    async fn get(&self, event_type: &str) -> Result<Option<Value>> {
        let path = self.record_path(event_type)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(e)),
        };

        let content = serde_json::from_str(&raw).map_err(|e| {
            AccountDataError::Provider(FileAccountDataProviderError::Json(
                event_type.to_string(),
                e,
            ))
        })?;
        Ok(Some(content))
    }

    async fn set(&self, event_type: &str, content: Value) -> Result<()> {
        let path = self.record_path(event_type)?;
        let raw = serde_json::to_string_pretty(&content).map_err(|e| {
            AccountDataError::Provider(FileAccountDataProviderError::Json(
                event_type.to_string(),
                e,
            ))
        })?;

        // write then rename so readers never see a partial record
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_error)?;
        let tmp_path = self
            .dir
            .join(format!(".{}.{}.tmp", event_type, RECORD_EXTENSION));
        tokio::fs::write(&tmp_path, raw).await.map_err(io_error)?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(io_error)?;

        tracing::debug!("wrote account data record {}", event_type);
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_get_missing_record() {
        let temp = TempDir::new().unwrap();
        let provider = FileAccountDataProvider::new(temp.path().to_path_buf());
        assert_eq!(provider.get("m.secret").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_records_persist_across_handles() {
        let temp = TempDir::new().unwrap();
        let provider = FileAccountDataProvider::new(temp.path().to_path_buf());
        provider
            .set("m.secret_storage.default_key", json!({"key": "A"}))
            .await
            .unwrap();

        let reopened = FileAccountDataProvider::new(temp.path().to_path_buf());
        assert_eq!(
            reopened.get("m.secret_storage.default_key").await.unwrap(),
            Some(json!({"key": "A"}))
        );
    }

    #[tokio::test]
    async fn test_set_notifies_subscribers() {
        let temp = TempDir::new().unwrap();
        let provider = FileAccountDataProvider::new(temp.path().to_path_buf());
        let mut events = provider.subscribe();

        provider.set("m.test", json!({"a": 1})).await.unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.event_type, "m.test");
        assert_eq!(event.content, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_rejects_path_like_names() {
        let temp = TempDir::new().unwrap();
        let provider = FileAccountDataProvider::new(temp.path().to_path_buf());
        for name in ["", "../escape", ".hidden", "a/b"] {
            assert!(matches!(
                provider.set(name, json!({})).await,
                Err(AccountDataError::Provider(
                    FileAccountDataProviderError::InvalidName(_)
                ))
            ));
        }
    }

    #[tokio::test]
    async fn test_lists_key_ids() {
        let temp = TempDir::new().unwrap();
        let provider = FileAccountDataProvider::new(temp.path().to_path_buf());
        provider
            .set("m.secret_storage.key.B", json!({}))
            .await
            .unwrap();
        provider
            .set("m.secret_storage.key.A", json!({}))
            .await
            .unwrap();
        provider.set("m.secret", json!({})).await.unwrap();

        assert_eq!(provider.key_ids().await.unwrap(), vec!["A", "B"]);
        assert_eq!(provider.event_types().await.unwrap().len(), 3);
    }
}
