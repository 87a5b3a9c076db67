use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::domain::{
    Account, AccountId, AccountUpdate, Cents, Client, ClientId, ClientUpdate, IntegrityStats,
    NewAccount, NewClient, Transaction, TransactionId, timestamp,
};

use super::rows::{
    ACCOUNT_COLUMNS, CLIENT_COLUMNS, TRANSACTION_COLUMNS, row_to_account, row_to_client,
    row_to_transaction,
};
use super::{MIGRATION_001_INITIAL, StoreContext, StoreError, UnitOfWork};

/// Connection settings for the ledger store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// SQLite URL, e.g. `sqlite:tally.db`.
    pub url: String,
    pub max_connections: u32,
    /// How long a writer waits for the database lock before the statement
    /// fails with a conflict.
    pub busy_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            url: "sqlite:tally.db".to_string(),
            max_connections: 5,
            busy_timeout: Duration::from_millis(250),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl StoreOptions {
    pub fn for_path(path: impl AsRef<Path>) -> Self {
        Self {
            url: format!("sqlite:{}", path.as_ref().display()),
            ..Default::default()
        }
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }
}

/// Outcome of a conditional delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    /// The row exists but a policy guard kept it.
    Refused,
}

/// Handle to the ledger database. Cheap to clone; clones share one pool.
#[derive(Clone)]
pub struct LedgerStore {
    pool: SqlitePool,
}

impl LedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to an existing database.
    pub async fn connect(options: &StoreOptions) -> Result<Self, StoreError> {
        Self::open(options, false).await
    }

    /// Create the database if needed and bring the schema up to date.
    pub async fn init(options: &StoreOptions) -> Result<Self, StoreError> {
        let store = Self::open(options, true).await?;
        store.migrate().await?;
        Ok(store)
    }

    async fn open(options: &StoreOptions, create: bool) -> Result<Self, StoreError> {
        let connect_options = SqliteConnectOptions::from_str(&options.url)
            .store_context("Invalid database url")?
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(options.busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect_with(connect_options)
            .await
            .store_context("Failed to connect to database")?;

        info!(url = %options.url, max_connections = options.max_connections, "ledger store opened");
        Ok(Self::new(pool))
    }

    /// Run the bootstrap DDL. Safe to repeat.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .store_context("Failed to run migration 001")?;
        debug!("schema up to date");
        Ok(())
    }

    /// Close every pooled connection. Waits for checked-out connections.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("ledger store closed");
    }

    /// Start an atomic unit of work.
    pub async fn begin(&self) -> Result<UnitOfWork, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .store_context("Failed to begin unit of work")?;
        Ok(UnitOfWork::new(tx))
    }

    // ========================
    // Client operations
    // ========================

    pub async fn insert_client(&self, client: &NewClient) -> Result<Client, StoreError> {
        let sql = format!(
            "INSERT INTO clients (name, email, created_at) VALUES (?, ?, ?) RETURNING {CLIENT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&client.name)
            .bind(&client.email)
            .bind(timestamp::format(&Utc::now()))
            .fetch_one(&self.pool)
            .await
            .store_context("Failed to save client")?;
        row_to_client(&row)
    }

    pub async fn get_client(&self, id: ClientId) -> Result<Option<Client>, StoreError> {
        let sql = format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .store_context("Failed to fetch client")?;
        row.as_ref().map(row_to_client).transpose()
    }

    pub async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
        let sql = format!("SELECT {CLIENT_COLUMNS} FROM clients ORDER BY id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .store_context("Failed to list clients")?;
        rows.iter().map(row_to_client).collect()
    }

    /// Apply a partial update. Returns `None` if the client does not exist.
    pub async fn update_client(
        &self,
        id: ClientId,
        update: &ClientUpdate,
    ) -> Result<Option<Client>, StoreError> {
        let sql = format!(
            r#"
            UPDATE clients
            SET name = COALESCE(?, name), email = COALESCE(?, email)
            WHERE id = ?
            RETURNING {CLIENT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(&update.name)
            .bind(&update.email)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .store_context("Failed to update client")?;
        row.as_ref().map(row_to_client).transpose()
    }

    /// Delete a client unless it still owns accounts.
    pub async fn delete_client(&self, id: ClientId) -> Result<DeleteOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM clients
            WHERE id = ? AND NOT EXISTS (SELECT 1 FROM accounts WHERE client_id = ?)
            "#,
        )
        .bind(id)
        .bind(id)
        .execute(&self.pool)
        .await
        .store_context("Failed to delete client")?;

        if result.rows_affected() > 0 {
            return Ok(DeleteOutcome::Deleted);
        }
        match self.get_client(id).await? {
            Some(_) => Ok(DeleteOutcome::Refused),
            None => Ok(DeleteOutcome::NotFound),
        }
    }

    // ========================
    // Account operations
    // ========================

    pub async fn insert_account(&self, account: &NewAccount) -> Result<Account, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO accounts (client_id, key, balance, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(account.client_id)
            .bind(&account.key)
            .bind(account.balance)
            .bind(timestamp::format(&Utc::now()))
            .fetch_one(&self.pool)
            .await
            .store_context("Failed to save account")?;
        row_to_account(&row)
    }

    pub async fn get_account_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .store_context("Failed to fetch account")?;
        row.as_ref().map(row_to_account).transpose()
    }

    pub async fn get_account_by_key(&self, key: &str) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE key = ?");
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .store_context("Failed to fetch account by key")?;
        row.as_ref().map(row_to_account).transpose()
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .store_context("Failed to list accounts")?;
        rows.iter().map(row_to_account).collect()
    }

    pub async fn list_accounts_for_client(
        &self,
        client_id: ClientId,
    ) -> Result<Vec<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE client_id = ? ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(client_id)
            .fetch_all(&self.pool)
            .await
            .store_context("Failed to list accounts for client")?;
        rows.iter().map(row_to_account).collect()
    }

    /// Apply a partial update. Returns `None` if the account does not exist.
    pub async fn update_account(
        &self,
        id: AccountId,
        update: &AccountUpdate,
    ) -> Result<Option<Account>, StoreError> {
        let sql = format!(
            r#"
            UPDATE accounts
            SET client_id = COALESCE(?, client_id),
                key = COALESCE(?, key),
                balance = COALESCE(?, balance)
            WHERE id = ?
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(update.client_id)
            .bind(&update.key)
            .bind(update.balance)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .store_context("Failed to update account")?;
        row.as_ref().map(row_to_account).transpose()
    }

    /// Delete an account only if its balance is zero. The guard and the
    /// delete are one statement, so a concurrent credit cannot slip between.
    pub async fn delete_empty_account(&self, id: AccountId) -> Result<DeleteOutcome, StoreError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = ? AND balance = 0")
            .bind(id)
            .execute(&self.pool)
            .await
            .store_context("Failed to delete account")?;

        if result.rows_affected() > 0 {
            return Ok(DeleteOutcome::Deleted);
        }
        match self.get_account_by_id(id).await? {
            Some(_) => Ok(DeleteOutcome::Refused),
            None => Ok(DeleteOutcome::NotFound),
        }
    }

    // ========================
    // Transaction queries
    // ========================

    pub async fn get_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, StoreError> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .store_context("Failed to fetch transaction")?;
        row.as_ref().map(row_to_transaction).transpose()
    }

    /// All transactions, in commit order.
    pub async fn list_transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions ORDER BY id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .store_context("Failed to list transactions")?;
        rows.iter().map(row_to_transaction).collect()
    }

    /// Transactions that debited or credited the account, in commit order.
    pub async fn list_transactions_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, StoreError> {
        let sql = format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE from_account = ? OR to_account_id = ?
            ORDER BY id
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(account_id)
            .bind(account_id)
            .fetch_all(&self.pool)
            .await
            .store_context("Failed to list transactions for account")?;
        rows.iter().map(row_to_transaction).collect()
    }

    // ========================
    // Integrity
    // ========================

    pub async fn integrity_stats(&self) -> Result<IntegrityStats, StoreError> {
        // One read transaction so counts and balances share a snapshot.
        let mut tx = self
            .pool
            .begin()
            .await
            .store_context("Failed to begin integrity read")?;
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM clients) AS client_count,
                (SELECT COUNT(*) FROM accounts) AS account_count,
                (SELECT COUNT(*) FROM transactions) AS transaction_count,
                (SELECT COUNT(*) FROM accounts WHERE balance < 0) AS negative_balances,
                (SELECT COUNT(*) FROM transactions WHERE amount <= 0) AS invalid_amounts,
                (SELECT COUNT(*) FROM transactions WHERE from_account = to_account_id) AS self_transfers,
                (SELECT COUNT(*) FROM accounts a
                    WHERE NOT EXISTS (SELECT 1 FROM clients c WHERE c.id = a.client_id)) AS orphaned_accounts
            "#,
        )
        .fetch_one(&mut *tx)
        .await
        .store_context("Failed to gather integrity stats")?;

        // SQLite's integer SUM fails past i64::MAX, which valid balances can reach.
        let balances: Vec<Cents> = sqlx::query_scalar("SELECT balance FROM accounts")
            .fetch_all(&mut *tx)
            .await
            .store_context("Failed to read balances")?;
        tx.commit()
            .await
            .store_context("Failed to end integrity read")?;
        let total_balance = balances.iter().map(|&b| i128::from(b)).sum();

        Ok(IntegrityStats {
            client_count: row.get("client_count"),
            account_count: row.get("account_count"),
            transaction_count: row.get("transaction_count"),
            total_balance,
            negative_balances: row.get("negative_balances"),
            invalid_amounts: row.get("invalid_amounts"),
            self_transfers: row.get("self_transfers"),
            orphaned_accounts: row.get("orphaned_accounts"),
        })
    }
}
