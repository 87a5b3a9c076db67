use std::sync::Arc;

use crate::domain::{
    Account, AccountId, AccountUpdate, Client, ClientId, ClientUpdate, IntegrityReport,
    NewAccount, NewClient, Transaction, TransactionId, TransferRequest, build_integrity_report,
};
use crate::storage::{DeleteOutcome, LedgerStore, StoreError, StoreOptions};

use super::{AppError, ClientDirectory, TransferCoordinator, TransferSettings};

/// Application service providing high-level operations for the ledger.
/// This is the primary interface for any client (CLI, REST).
#[derive(Clone)]
pub struct LedgerService {
    store: LedgerStore,
    directory: Arc<dyn ClientDirectory>,
    coordinator: TransferCoordinator,
}

impl LedgerService {
    /// Create a service over an open store. Client existence is checked
    /// against the store's own client table.
    pub fn new(store: LedgerStore, settings: TransferSettings) -> Self {
        Self {
            directory: Arc::new(store.clone()),
            coordinator: TransferCoordinator::new(store.clone(), settings),
            store,
        }
    }

    /// Initialize the database (creating it if needed) and open a service.
    pub async fn init(options: &StoreOptions, settings: TransferSettings) -> Result<Self, AppError> {
        let store = LedgerStore::init(options).await?;
        Ok(Self::new(store, settings))
    }

    /// Connect to an existing database.
    pub async fn connect(
        options: &StoreOptions,
        settings: TransferSettings,
    ) -> Result<Self, AppError> {
        let store = LedgerStore::connect(options).await?;
        Ok(Self::new(store, settings))
    }

    /// Replace the client directory used when opening accounts.
    pub fn with_directory(mut self, directory: Arc<dyn ClientDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub async fn close(&self) {
        self.store.close().await;
    }

    // ========================
    // Client operations
    // ========================

    pub async fn create_client(&self, client: NewClient) -> Result<Client, AppError> {
        client.validate()?;
        match self.store.insert_client(&client).await {
            Ok(saved) => Ok(saved),
            Err(e) if e.is_duplicate() => Err(AppError::ClientEmailTaken(client.email)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_client(&self, id: ClientId) -> Result<Client, AppError> {
        self.store
            .get_client(id)
            .await?
            .ok_or(AppError::ClientNotFound(id))
    }

    pub async fn list_clients(&self) -> Result<Vec<Client>, AppError> {
        Ok(self.store.list_clients().await?)
    }

    pub async fn update_client(
        &self,
        id: ClientId,
        update: ClientUpdate,
    ) -> Result<Client, AppError> {
        update.validate()?;
        match self.store.update_client(id, &update).await {
            Ok(Some(client)) => Ok(client),
            Ok(None) => Err(AppError::ClientNotFound(id)),
            Err(e) if e.is_duplicate() => Err(AppError::ClientEmailTaken(
                update.email.unwrap_or_default(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete_client(&self, id: ClientId) -> Result<(), AppError> {
        match self.store.delete_client(id).await? {
            DeleteOutcome::Deleted => Ok(()),
            DeleteOutcome::NotFound => Err(AppError::ClientNotFound(id)),
            DeleteOutcome::Refused => Err(AppError::ClientHasAccounts(id)),
        }
    }

    // ========================
    // Account operations
    // ========================

    pub async fn create_account(&self, account: NewAccount) -> Result<Account, AppError> {
        account.validate()?;
        self.require_client(account.client_id).await?;
        match self.store.insert_account(&account).await {
            Ok(saved) => Ok(saved),
            Err(e) => Err(key_error(e, &account.key)),
        }
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Account, AppError> {
        self.store
            .get_account_by_id(id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(id.to_string()))
    }

    pub async fn get_account_by_key(&self, key: &str) -> Result<Account, AppError> {
        self.store
            .get_account_by_key(key)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(key.to_string()))
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        Ok(self.store.list_accounts().await?)
    }

    pub async fn list_client_accounts(&self, client_id: ClientId) -> Result<Vec<Account>, AppError> {
        self.require_client(client_id).await?;
        Ok(self.store.list_accounts_for_client(client_id).await?)
    }

    pub async fn update_account(
        &self,
        id: AccountId,
        update: AccountUpdate,
    ) -> Result<Account, AppError> {
        update.validate()?;
        if let Some(client_id) = update.client_id {
            self.require_client(client_id).await?;
        }
        match self.store.update_account(id, &update).await {
            Ok(Some(account)) => Ok(account),
            Ok(None) => Err(AppError::AccountNotFound(id.to_string())),
            Err(e) => Err(key_error(e, update.key.as_deref().unwrap_or_default())),
        }
    }

    /// Delete an account. Refused while its balance is non-zero.
    pub async fn delete_account(&self, id: AccountId) -> Result<(), AppError> {
        match self.store.delete_empty_account(id).await? {
            DeleteOutcome::Deleted => Ok(()),
            DeleteOutcome::NotFound => Err(AppError::AccountNotFound(id.to_string())),
            DeleteOutcome::Refused => Err(AppError::AccountNotEmpty(id)),
        }
    }

    async fn require_client(&self, id: ClientId) -> Result<(), AppError> {
        if self.directory.client_exists(id).await? {
            Ok(())
        } else {
            Err(AppError::ClientNotFound(id))
        }
    }

    // ========================
    // Transfers
    // ========================

    pub async fn transfer(&self, request: TransferRequest) -> Result<Transaction, AppError> {
        self.coordinator.transfer(request).await
    }

    pub async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, AppError> {
        self.store
            .get_transaction(id)
            .await?
            .ok_or(AppError::TransactionNotFound(id))
    }

    pub async fn list_transactions(&self) -> Result<Vec<Transaction>, AppError> {
        Ok(self.store.list_transactions().await?)
    }

    /// Transactions touching the account in either direction, oldest first.
    pub async fn account_transactions(&self, id: AccountId) -> Result<Vec<Transaction>, AppError> {
        self.get_account(id).await?;
        Ok(self.store.list_transactions_for_account(id).await?)
    }

    // ========================
    // Integrity
    // ========================

    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let stats = self.store.integrity_stats().await?;
        Ok(build_integrity_report(&stats))
    }
}

fn key_error(err: StoreError, key: &str) -> AppError {
    if err.is_duplicate() {
        AppError::AccountKeyTaken(key.to_string())
    } else {
        err.into()
    }
}
