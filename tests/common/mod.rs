// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tally::application::{LedgerService, RetryPolicy, TransferSettings};
use tally::domain::{Account, Cents, Client, NewAccount, NewClient};
use tally::storage::StoreOptions;
use tempfile::TempDir;

/// Fast retries so conflict tests finish quickly.
pub fn test_settings() -> TransferSettings {
    TransferSettings {
        retry: RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(20),
        },
        default_timeout: Duration::from_secs(30),
    }
}

/// A temporary database that is removed when the value is dropped.
pub struct TestDb {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl TestDb {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let path = dir.path().join("test.db");
        Ok(Self { dir, path })
    }

    pub fn options(&self) -> StoreOptions {
        StoreOptions::for_path(&self.path).with_max_connections(8)
    }
}

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let db = TestDb::new()?;
    let service = LedgerService::init(&db.options(), test_settings()).await?;
    Ok((service, db.dir))
}

/// Test fixture: one client owning a set of funded accounts
pub struct Ledger {
    pub client: Client,
    pub accounts: Vec<Account>,
}

impl Ledger {
    /// Create a client and one account per `(key, balance)` pair.
    pub async fn seed(service: &LedgerService, accounts: &[(&str, Cents)]) -> Result<Self> {
        let client = service
            .create_client(NewClient::new("Test Client", "client@example.com"))
            .await?;
        let mut created = Vec::with_capacity(accounts.len());
        for (key, balance) in accounts {
            let account = service
                .create_account(NewAccount::new(client.id, *key).with_balance(*balance))
                .await?;
            created.push(account);
        }
        Ok(Self {
            client,
            accounts: created,
        })
    }

    pub fn account(&self, key: &str) -> &Account {
        self.accounts
            .iter()
            .find(|a| a.key == key)
            .unwrap_or_else(|| panic!("no seeded account {key}"))
    }
}

pub async fn balance(service: &LedgerService, account: &Account) -> Result<Cents> {
    Ok(service.get_account(account.id).await?.balance)
}
