use std::time::Duration;

use thiserror::Error;
use tracing::error;

use crate::domain::{AccountId, Cents, ClientId, TransactionId, ValidationError};
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Source account not found: {0}")]
    SourceNotFound(AccountId),

    #[error("Destination account not found: {0}")]
    DestinationNotFound(String),

    #[error("Invalid transfer: {0}")]
    InvalidTransfer(String),

    #[error("Insufficient funds in account {account_id}: balance {balance}, required {required}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Cents,
        required: Cents,
    },

    #[error("Ledger store is unavailable, try again later")]
    StoreUnavailable,

    #[error("Operation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account key already in use: {0}")]
    AccountKeyTaken(String),

    #[error("Account {0} still holds funds and cannot be deleted")]
    AccountNotEmpty(AccountId),

    #[error("Client not found: {0}")]
    ClientNotFound(ClientId),

    #[error("Client email already in use: {0}")]
    ClientEmailTaken(String),

    #[error("Client {0} still owns accounts and cannot be deleted")]
    ClientHasAccounts(ClientId),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationError),
}

impl AppError {
    /// Stable machine-readable code for this kind of failure.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::SourceNotFound(_) => "source_not_found",
            AppError::DestinationNotFound(_) => "destination_not_found",
            AppError::InvalidTransfer(_) => "invalid_transfer",
            AppError::InsufficientFunds { .. } => "insufficient_funds",
            AppError::StoreUnavailable => "store_unavailable",
            AppError::TimedOut(_) => "timed_out",
            AppError::AccountNotFound(_) => "account_not_found",
            AppError::AccountKeyTaken(_) => "account_key_taken",
            AppError::AccountNotEmpty(_) => "account_not_empty",
            AppError::ClientNotFound(_) => "client_not_found",
            AppError::ClientEmailTaken(_) => "client_email_taken",
            AppError::ClientHasAccounts(_) => "client_has_accounts",
            AppError::TransactionNotFound(_) => "transaction_not_found",
            AppError::InvalidInput(_) => "invalid_input",
        }
    }
}

// Storage failures that reach this point have no caller-facing meaning
// beyond "try again later"; the detail goes to the log only.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientFunds {
                account_id,
                balance,
                delta,
            } => AppError::InsufficientFunds {
                account_id,
                balance,
                required: delta.saturating_neg(),
            },
            other => {
                error!(error = %other, source = ?std::error::Error::source(&other), "ledger store failure");
                AppError::StoreUnavailable
            }
        }
    }
}
