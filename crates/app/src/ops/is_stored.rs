use clap::Args;

use common::storage::SecretStorageError;

use crate::state::StateError;

/// List the usable keys a secret is encrypted under, without decrypting it
#[derive(Args, Debug, Clone)]
pub struct IsStored {
    /// Name of the secret
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IsStoredError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("secret storage error: {0}")]
    Storage(#[from] SecretStorageError),
}

#[async_trait::async_trait]
impl crate::op::Op for IsStored {
    type Error = IsStoredError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;

        match state.storage(None).is_stored(&self.name).await? {
            Some(keys) => Ok(keys
                .iter()
                .map(|(key_id, descriptor)| match &descriptor.name {
                    Some(name) => format!("{} {:?}", key_id, name),
                    None => key_id.clone(),
                })
                .collect::<Vec<_>>()
                .join("\n")),
            None => Ok(format!("{} is not stored under any usable key", self.name)),
        }
    }
}
