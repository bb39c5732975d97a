use std::{fs, path::PathBuf};

use common::crypto::StorageKey;
use common::storage::SecretStorage;
use serde::{Deserialize, Serialize};

use crate::keyring::{Keyring, KeyringCallbacks};
use crate::provider::FileAccountDataProvider;

pub const APP_NAME: &str = "ssss";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const ACCOUNT_DATA_DIR_NAME: &str = "account_data";
pub const KEYRING_DIR_NAME: &str = "keys";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Keep recovery keys for newly added keys in the local keyring
    #[serde(default = "default_save_keys")]
    pub save_keys: bool,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_save_keys() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            save_keys: default_save_keys(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the ssss directory (~/.ssss)
    pub ssss_dir: PathBuf,
    /// Path to the account data records
    pub account_data_path: PathBuf,
    /// Path to the local keyring
    pub keyring_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the ssss directory path (custom or default ~/.ssss)
    pub fn ssss_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new ssss state directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let ssss_dir = Self::ssss_dir(custom_path)?;
        if ssss_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }
        fs::create_dir_all(&ssss_dir)?;

        let account_data_path = ssss_dir.join(ACCOUNT_DATA_DIR_NAME);
        fs::create_dir_all(&account_data_path)?;
        let keyring_path = ssss_dir.join(KEYRING_DIR_NAME);
        fs::create_dir_all(&keyring_path)?;

        let config = config.unwrap_or_default();
        let config_path = ssss_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            ssss_dir,
            account_data_path,
            keyring_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the ssss directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let ssss_dir = Self::ssss_dir(custom_path)?;
        if !ssss_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let account_data_path = ssss_dir.join(ACCOUNT_DATA_DIR_NAME);
        let keyring_path = ssss_dir.join(KEYRING_DIR_NAME);
        let config_path = ssss_dir.join(CONFIG_FILE_NAME);

        if !account_data_path.exists() {
            return Err(StateError::MissingFile(format!("{}/", ACCOUNT_DATA_DIR_NAME)));
        }
        if !keyring_path.exists() {
            return Err(StateError::MissingFile(format!("{}/", KEYRING_DIR_NAME)));
        }
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            ssss_dir,
            account_data_path,
            keyring_path,
            config_path,
            config,
        })
    }

    pub fn account_data(&self) -> FileAccountDataProvider {
        FileAccountDataProvider::new(self.account_data_path.clone())
    }

    pub fn keyring(&self) -> Keyring {
        Keyring::new(self.keyring_path.clone())
    }

    /// Secret storage over the local account data
    ///
    /// Raw keys come from `key` if given, otherwise from the keyring.
    pub fn storage(&self, key: Option<StorageKey>) -> SecretStorage<FileAccountDataProvider> {
        let callbacks = KeyringCallbacks::new(self.keyring(), key);
        SecretStorage::new(self.account_data()).with_callbacks(std::sync::Arc::new(callbacks))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("ssss directory not initialized. Run 'ssss init' first")]
    NotInitialized,

    #[error("ssss directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_then_load() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("state");

        let created = AppState::init(Some(dir.clone()), None).unwrap();
        assert!(created.account_data_path.is_dir());
        assert!(created.keyring_path.is_dir());

        let loaded = AppState::load(Some(dir)).unwrap();
        assert_eq!(loaded.config, AppConfig::default());
        assert_eq!(loaded.config_path, created.config_path);
    }

    #[test]
    fn test_init_twice_fails() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("state");
        AppState::init(Some(dir.clone()), None).unwrap();
        assert!(matches!(
            AppState::init(Some(dir), None),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_load_uninitialized() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            AppState::load(Some(temp.path().join("missing"))),
            Err(StateError::NotInitialized)
        ));
    }

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config: AppConfig = toml::from_str("log_level = \"debug\"").unwrap();
        assert_eq!(config.log_level, "debug");
        assert!(config.save_keys);
    }
}
