use clap::Args;

use crate::state::{AppConfig, AppState};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Log level to write to the config (default: warn)
    #[arg(long, default_value = "warn")]
    pub default_log_level: String,

    /// Do not keep recovery keys for new keys in the local keyring
    #[arg(long)]
    pub no_save_keys: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] crate::state::StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            log_level: self.default_log_level.clone(),
            save_keys: !self.no_save_keys,
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        let output = format!(
            "Initialized ssss directory at: {}\n\
             - Account data: {}\n\
             - Keyring: {}\n\
             - Config: {}\n\
             - Log level: {}\n\
             - Save keys: {}",
            state.ssss_dir.display(),
            state.account_data_path.display(),
            state.keyring_path.display(),
            state.config_path.display(),
            state.config.log_level,
            state.config.save_keys,
        );

        Ok(output)
    }
}
