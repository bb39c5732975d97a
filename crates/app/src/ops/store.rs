use clap::Args;

use common::crypto::RecoveryKeyError;
use common::storage::SecretStorageError;

use crate::op::parse_recovery_key;
use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Store {
    /// Name of the secret, e.g. m.cross_signing.master
    pub name: String,

    /// Secret value
    pub secret: String,

    /// Key id to encrypt under, may be repeated (the default key if omitted)
    #[arg(long = "key")]
    pub key_ids: Vec<String>,

    /// Recovery key to encrypt with (keyring copies if omitted)
    #[arg(long)]
    pub recovery_key: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("invalid recovery key: {0}")]
    RecoveryKey(#[from] RecoveryKeyError),
    #[error("secret storage error: {0}")]
    Storage(#[from] SecretStorageError),
}

#[async_trait::async_trait]
impl crate::op::Op for Store {
    type Error = StoreError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let key = parse_recovery_key(self.recovery_key.as_deref())?;
        let storage = state.storage(key);

        let key_ids = (!self.key_ids.is_empty()).then_some(self.key_ids.as_slice());
        storage.store(&self.name, &self.secret, key_ids).await?;

        let stored_under = storage
            .is_stored(&self.name)
            .await?
            .map(|keys| keys.into_keys().collect::<Vec<_>>().join(", "))
            .unwrap_or_default();
        Ok(format!("Stored {} under: {}", self.name, stored_under))
    }
}
