use clap::Args;

use common::storage::SecretStorageError;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Show {
    /// Key id to show (the default key if omitted)
    pub key_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum KeyShowError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("secret storage error: {0}")]
    Storage(#[from] SecretStorageError),
    #[error("failed to render key: {0}")]
    Json(#[from] serde_json::Error),
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("no default key is set")]
    NoDefaultKey,
}

#[async_trait::async_trait]
impl crate::op::Op for Show {
    type Error = KeyShowError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let storage = state.storage(None);

        let Some((key_id, descriptor)) = storage.get_key(self.key_id.as_deref()).await? else {
            return Err(match &self.key_id {
                Some(key_id) => KeyShowError::NotFound(key_id.clone()),
                None => KeyShowError::NoDefaultKey,
            });
        };

        Ok(format!(
            "{}\n{}",
            key_id,
            serde_json::to_string_pretty(&descriptor)?
        ))
    }
}
