use sqlx::{Row, Sqlite, Transaction as SqlTransaction};

use crate::domain::{Account, AccountId, Cents, NewTransaction, Transaction, timestamp};

use super::rows::{ACCOUNT_COLUMNS, TRANSACTION_COLUMNS, row_to_account, row_to_transaction};
use super::{StoreContext, StoreError};

/// A single atomic group of reads and writes against the ledger.
///
/// Either every write inside commits or none does. Dropping a unit of work
/// without calling [`UnitOfWork::commit`] rolls it back, which is what
/// makes cancellation (timeouts, aborted requests) leave no trace.
pub struct UnitOfWork {
    tx: SqlTransaction<'static, Sqlite>,
}

impl UnitOfWork {
    pub(crate) fn new(tx: SqlTransaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    /// Take the database write lock up front.
    ///
    /// Touches the source account (by id) and the destination (by key)
    /// without changing them. Any later read in this unit of work then sees
    /// the latest committed state, and competing writers wait on the busy
    /// timeout instead of failing mid-transfer on a stale snapshot.
    pub async fn lock_accounts(&mut self, id: AccountId, key: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE accounts SET balance = balance WHERE id = ? OR key = ?")
            .bind(id)
            .bind(key)
            .execute(&mut *self.tx)
            .await
            .store_context("Failed to lock accounts")?;
        Ok(())
    }

    pub async fn get_account_by_id(&mut self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .store_context("Failed to fetch account")?;
        row.as_ref().map(row_to_account).transpose()
    }

    pub async fn get_account_by_key(&mut self, key: &str) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE key = ?");
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await
            .store_context("Failed to fetch account by key")?;
        row.as_ref().map(row_to_account).transpose()
    }

    /// Add `delta` to the account balance, refusing to go below zero.
    ///
    /// The balance guard is part of the UPDATE itself; on refusal the
    /// current balance is read back to report `InsufficientFunds`, or
    /// `NotFound` if the account is gone.
    pub async fn apply_balance_delta(
        &mut self,
        id: AccountId,
        delta: Cents,
    ) -> Result<Account, StoreError> {
        let sql = format!(
            r#"
            UPDATE accounts
            SET balance = balance + ?
            WHERE id = ? AND balance + ? >= 0
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(delta)
            .bind(id)
            .bind(delta)
            .fetch_optional(&mut *self.tx)
            .await
            .store_context("Failed to apply balance delta")?;

        if let Some(row) = row {
            return row_to_account(&row);
        }

        let current = sqlx::query("SELECT balance FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .store_context("Failed to read balance")?;
        match current {
            Some(row) => Err(StoreError::InsufficientFunds {
                account_id: id,
                balance: row.get("balance"),
                delta,
            }),
            None => Err(StoreError::NotFound("account")),
        }
    }

    pub async fn append_transaction(
        &mut self,
        transaction: &NewTransaction,
    ) -> Result<Transaction, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO transactions
                (from_account, to_account, to_account_id, amount, timestamp, idempotency_key)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(transaction.from_account)
            .bind(&transaction.to_account_key)
            .bind(transaction.to_account_id)
            .bind(transaction.amount)
            .bind(timestamp::format(&transaction.timestamp))
            .bind(&transaction.idempotency_key)
            .fetch_one(&mut *self.tx)
            .await
            .store_context("Failed to append transaction")?;
        row_to_transaction(&row)
    }

    pub async fn find_transaction_by_idempotency_key(
        &mut self,
        key: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE idempotency_key = ?");
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await
            .store_context("Failed to look up idempotency key")?;
        row.as_ref().map(row_to_transaction).transpose()
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .store_context("Failed to commit unit of work")
    }

    pub async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .store_context("Failed to roll back unit of work")
    }
}
