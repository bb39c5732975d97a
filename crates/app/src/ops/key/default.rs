use clap::Args;

use common::storage::SecretStorageError;

use crate::state::StateError;

/// Show the default key, or set it when a key id is given
#[derive(Args, Debug, Clone)]
pub struct SetDefault {
    pub key_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum KeyDefaultError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("secret storage error: {0}")]
    Storage(#[from] SecretStorageError),
}

#[async_trait::async_trait]
impl crate::op::Op for SetDefault {
    type Error = KeyDefaultError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let storage = state.storage(None);

        let Some(key_id) = &self.key_id else {
            return Ok(match storage.get_default_key_id().await? {
                Some(key_id) => key_id,
                None => "No default key set".to_string(),
            });
        };

        if !storage.has_key(Some(key_id)).await? {
            return Err(SecretStorageError::UnknownKey(key_id.clone()).into());
        }
        storage.set_default_key_id(key_id).await?;
        Ok(format!("Default key set to {}", key_id))
    }
}
