use async_trait::async_trait;

use crate::domain::ClientId;
use crate::storage::LedgerStore;

use super::AppError;

/// Confirms that a client exists before an account is opened for it.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    async fn client_exists(&self, id: ClientId) -> Result<bool, AppError>;
}

#[async_trait]
impl ClientDirectory for LedgerStore {
    async fn client_exists(&self, id: ClientId) -> Result<bool, AppError> {
        Ok(self.get_client(id).await?.is_some())
    }
}
