use thiserror::Error;

use crate::domain::{AccountId, Cents};

// Primary SQLite result codes; extended codes keep these in their low byte.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Failures of the ledger store, classified so callers can react without
/// inspecting driver errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("account {account_id} has balance {balance}, cannot apply {delta}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Cents,
        delta: Cents,
    },

    #[error("{context}: unique constraint violated")]
    Duplicate {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("{context}: foreign key constraint violated")]
    ForeignKey {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("{context}: constraint violated")]
    Constraint {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// Another writer holds the database; the unit of work can be retried.
    #[error("{context}: conflicting concurrent update")]
    Conflict {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("{context}: store unavailable")]
    Unavailable {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn from_sqlx(context: &'static str, source: sqlx::Error) -> Self {
        if matches!(source, sqlx::Error::RowNotFound) {
            return StoreError::NotFound(context);
        }

        let Some(db) = source.as_database_error() else {
            return StoreError::Unavailable { context, source };
        };
        let unique = db.is_unique_violation();
        let foreign_key = db.is_foreign_key_violation();
        let check = db.is_check_violation();
        let busy = is_busy_code(db.code().as_deref());

        if unique {
            StoreError::Duplicate { context, source }
        } else if foreign_key {
            StoreError::ForeignKey { context, source }
        } else if check {
            StoreError::Constraint { context, source }
        } else if busy {
            StoreError::Conflict { context, source }
        } else {
            StoreError::Unavailable { context, source }
        }
    }

    /// True for failures where re-running the whole unit of work may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate { .. })
    }
}

fn is_busy_code(code: Option<&str>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .map(|c| matches!(c & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
        .unwrap_or(false)
}

/// `.store_context("...")` for sqlx results, mirroring `anyhow::Context`.
pub trait StoreContext<T> {
    fn store_context(self, context: &'static str) -> Result<T, StoreError>;
}

impl<T> StoreContext<T> for Result<T, sqlx::Error> {
    fn store_context(self, context: &'static str) -> Result<T, StoreError> {
        self.map_err(|e| StoreError::from_sqlx(context, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_codes() {
        assert!(is_busy_code(Some("5")));
        assert!(is_busy_code(Some("6")));
        // SQLITE_BUSY_SNAPSHOT and SQLITE_BUSY_TIMEOUT
        assert!(is_busy_code(Some("517")));
        assert!(is_busy_code(Some("773")));
        // SQLITE_CONSTRAINT_UNIQUE
        assert!(!is_busy_code(Some("2067")));
        assert!(!is_busy_code(Some("not-a-code")));
        assert!(!is_busy_code(None));
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err = StoreError::from_sqlx("account", sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::NotFound("account")));
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_pool_timeout_is_unavailable() {
        let err: Result<(), _> = Err(sqlx::Error::PoolTimedOut);
        let err = err.store_context("Failed to begin").unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
        assert_eq!(err.to_string(), "Failed to begin: store unavailable");
    }
}
