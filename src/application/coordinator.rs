use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::domain::{AccountId, Cents, NewTransaction, Transaction, TransferRequest};
use crate::metrics;
use crate::storage::{LedgerStore, StoreError, UnitOfWork};

use super::AppError;

/// Bounds for re-running a transfer that lost a write conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, doubling from `initial_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSettings {
    pub retry: RetryPolicy,
    /// Applied when a request carries no timeout of its own.
    pub default_timeout: Duration,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            default_timeout: Duration::from_secs(10),
        }
    }
}

/// Balance changes for a transfer, ordered by ascending account id.
pub fn balance_deltas(
    source: AccountId,
    destination: AccountId,
    amount: Cents,
) -> [(AccountId, Cents); 2] {
    let debit = (source, -amount);
    let credit = (destination, amount);
    if source < destination {
        [debit, credit]
    } else {
        [credit, debit]
    }
}

enum AttemptError {
    Retry(StoreError),
    Fail(AppError),
}

impl From<AppError> for AttemptError {
    fn from(err: AppError) -> Self {
        AttemptError::Fail(err)
    }
}

impl From<StoreError> for AttemptError {
    fn from(err: StoreError) -> Self {
        // The only unique column written by a transfer is the idempotency
        // key, so a duplicate means a concurrent twin committed first.
        if err.is_conflict() || err.is_duplicate() {
            AttemptError::Retry(err)
        } else {
            AttemptError::Fail(err.into())
        }
    }
}

/// Work staged inside an open unit of work, ready to commit.
enum Prepared {
    Replayed(Transaction),
    Staged(UnitOfWork, Transaction),
}

/// Moves funds between two accounts as one atomic unit of work.
#[derive(Clone)]
pub struct TransferCoordinator {
    store: LedgerStore,
    settings: TransferSettings,
}

impl TransferCoordinator {
    pub fn new(store: LedgerStore, settings: TransferSettings) -> Self {
        Self { store, settings }
    }

    /// Execute a transfer, retrying write conflicts and honouring the
    /// request timeout. On any error nothing is written.
    ///
    /// The deadline bounds every step up to the commit. A commit that has
    /// started always runs to completion, so `TimedOut` never hides a
    /// transfer that was applied.
    #[instrument(
        name = "transfer",
        skip(self, request),
        fields(
            from = request.from_account,
            to = %request.to_account_key,
            amount = request.amount,
        )
    )]
    pub async fn transfer(&self, request: TransferRequest) -> Result<Transaction, AppError> {
        let result = self.run(&request).await;
        metrics::record_transfer(&result);
        result
    }

    async fn run(&self, request: &TransferRequest) -> Result<Transaction, AppError> {
        request
            .validate()
            .map_err(|e| AppError::InvalidTransfer(e.to_string()))?;

        let limit = request.timeout.unwrap_or(self.settings.default_timeout);
        let deadline = Instant::now() + limit;
        let policy = self.settings.retry;
        let mut attempt = 1;
        loop {
            let err = match self.attempt(request, deadline, limit).await {
                Ok(transaction) => return Ok(transaction),
                Err(AttemptError::Fail(err)) => return Err(err),
                Err(AttemptError::Retry(err)) => err,
            };
            if attempt >= policy.max_attempts {
                warn!(attempts = attempt, error = %err, "transfer retries exhausted");
                return Err(AppError::StoreUnavailable);
            }
            let delay = policy.backoff(attempt);
            warn!(attempt, delay = ?delay, error = %err, "transfer conflicted, retrying");
            if tokio::time::timeout_at(deadline, tokio::time::sleep(delay))
                .await
                .is_err()
            {
                return Err(timed_out(limit));
            }
            attempt += 1;
        }
    }

    async fn attempt(
        &self,
        request: &TransferRequest,
        deadline: Instant,
        limit: Duration,
    ) -> Result<Transaction, AttemptError> {
        let prepared = match tokio::time::timeout_at(deadline, self.prepare(request)).await {
            Ok(prepared) => prepared?,
            Err(_) => return Err(timed_out(limit).into()),
        };
        let (uow, transaction) = match prepared {
            Prepared::Replayed(existing) => return Ok(existing),
            Prepared::Staged(uow, transaction) => (uow, transaction),
        };

        if Instant::now() >= deadline {
            if let Err(err) = uow.rollback().await {
                warn!(error = %err, "rollback after deadline failed");
            }
            return Err(timed_out(limit).into());
        }
        uow.commit().await?;

        info!(transaction_id = transaction.id, "transfer committed");
        Ok(transaction)
    }

    /// Run every step of the transfer short of the commit.
    async fn prepare(&self, request: &TransferRequest) -> Result<Prepared, AttemptError> {
        let mut uow = self.store.begin().await?;
        uow.lock_accounts(request.from_account, &request.to_account_key)
            .await?;

        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = uow.find_transaction_by_idempotency_key(key).await? {
                uow.rollback().await?;
                return replay(existing, request).map(Prepared::Replayed);
            }
        }

        let source = uow
            .get_account_by_id(request.from_account)
            .await?
            .ok_or(AppError::SourceNotFound(request.from_account))?;
        let destination = uow
            .get_account_by_key(&request.to_account_key)
            .await?
            .ok_or_else(|| AppError::DestinationNotFound(request.to_account_key.clone()))?;

        if source.id == destination.id {
            return Err(AppError::InvalidTransfer(format!(
                "account {} cannot transfer to itself",
                source.id
            ))
            .into());
        }
        if !source.can_cover(request.amount) {
            return Err(AppError::InsufficientFunds {
                account_id: source.id,
                balance: source.balance,
                required: request.amount,
            }
            .into());
        }
        if destination.balance.checked_add(request.amount).is_none() {
            return Err(AppError::InvalidTransfer(format!(
                "credit would overflow the balance of account {}",
                destination.id
            ))
            .into());
        }

        for (account_id, delta) in balance_deltas(source.id, destination.id, request.amount) {
            let updated = uow.apply_balance_delta(account_id, delta).await?;
            debug!(account_id, delta, balance = updated.balance, "balance updated");
        }

        let transaction = uow
            .append_transaction(&NewTransaction {
                from_account: source.id,
                to_account_id: destination.id,
                to_account_key: destination.key,
                amount: request.amount,
                timestamp: Utc::now(),
                idempotency_key: request.idempotency_key.clone(),
            })
            .await?;
        Ok(Prepared::Staged(uow, transaction))
    }
}

fn timed_out(limit: Duration) -> AppError {
    warn!(timeout = ?limit, "transfer timed out, rolled back");
    AppError::TimedOut(limit)
}

fn replay(existing: Transaction, request: &TransferRequest) -> Result<Transaction, AttemptError> {
    if existing.matches(request) {
        info!(transaction_id = existing.id, "idempotent replay");
        Ok(existing)
    } else {
        Err(AppError::InvalidTransfer(
            "idempotency key was already used for a different transfer".to_string(),
        )
        .into())
    }
}
