use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::domain::{Account, Client, Transaction, timestamp};

use super::StoreError;

pub(crate) const CLIENT_COLUMNS: &str = "id, name, email, created_at";
pub(crate) const ACCOUNT_COLUMNS: &str = "id, client_id, key, balance, created_at";
pub(crate) const TRANSACTION_COLUMNS: &str =
    "id, from_account, to_account, amount, timestamp, idempotency_key";

fn parse_timestamp(raw: &str, column: &str) -> Result<chrono::DateTime<chrono::Utc>, StoreError> {
    timestamp::parse(raw).map_err(|e| StoreError::Corrupt(format!("{column} {raw:?}: {e}")))
}

fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

pub(crate) fn row_to_client(row: &SqliteRow) -> Result<Client, StoreError> {
    let created_at: String = get(row, "created_at")?;
    Ok(Client {
        id: get(row, "id")?,
        name: get(row, "name")?,
        email: get(row, "email")?,
        created_at: parse_timestamp(&created_at, "created_at")?,
    })
}

pub(crate) fn row_to_account(row: &SqliteRow) -> Result<Account, StoreError> {
    let created_at: String = get(row, "created_at")?;
    Ok(Account {
        id: get(row, "id")?,
        client_id: get(row, "client_id")?,
        key: get(row, "key")?,
        balance: get(row, "balance")?,
        created_at: parse_timestamp(&created_at, "created_at")?,
    })
}

pub(crate) fn row_to_transaction(row: &SqliteRow) -> Result<Transaction, StoreError> {
    let ts: String = get(row, "timestamp")?;
    Ok(Transaction {
        id: get(row, "id")?,
        from_account: get(row, "from_account")?,
        to_account: get(row, "to_account")?,
        amount: get(row, "amount")?,
        timestamp: parse_timestamp(&ts, "timestamp")?,
        idempotency_key: get(row, "idempotency_key")?,
    })
}
