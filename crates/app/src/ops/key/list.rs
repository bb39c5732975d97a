use clap::Args;

use common::account_data::AccountDataError;
use common::storage::SecretStorageError;

use crate::provider::FileAccountDataProviderError;
use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct List;

#[derive(Debug, thiserror::Error)]
pub enum KeyListError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("account data error: {0}")]
    AccountData(#[from] AccountDataError<FileAccountDataProviderError>),
    #[error("secret storage error: {0}")]
    Storage(#[from] SecretStorageError),
}

#[async_trait::async_trait]
impl crate::op::Op for List {
    type Error = KeyListError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let storage = state.storage(None);
        let keyring = state.keyring();

        let key_ids = storage.account_data().key_ids().await?;
        if key_ids.is_empty() {
            return Ok("No keys found".to_string());
        }
        let default_key_id = storage.get_default_key_id().await?;

        let mut lines = Vec::with_capacity(key_ids.len());
        for key_id in key_ids {
            let Some((key_id, descriptor)) = storage.get_key(Some(&key_id)).await? else {
                continue;
            };

            let mut flags = vec![descriptor.algorithm.to_string()];
            if default_key_id.as_deref() == Some(key_id.as_str()) {
                flags.push("default".to_string());
            }
            if keyring.contains(&key_id) {
                flags.push("in keyring".to_string());
            }

            match descriptor.name {
                Some(name) => lines.push(format!("{} {:?} ({})", key_id, name, flags.join(" | "))),
                None => lines.push(format!("{} ({})", key_id, flags.join(" | "))),
            }
        }
        Ok(lines.join("\n"))
    }
}
