use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    AccountId, Cents, ValidationError, validate_amount, validate_idempotency_key, validate_key,
};

pub type TransactionId = i64;

/// Immutable audit record of a completed transfer.
///
/// `to_account` is the destination key as it was when the transfer
/// committed; renaming the destination later does not rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub from_account: AccountId,
    pub to_account: String,
    /// Always positive.
    pub amount: Cents,
    #[serde(with = "super::timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl Transaction {
    /// Returns true if `request` describes the same movement as this record.
    /// Used to tell a genuine retry from a reused idempotency key.
    pub fn matches(&self, request: &TransferRequest) -> bool {
        self.from_account == request.from_account
            && self.to_account == request.to_account_key
            && self.amount == request.amount
    }
}

/// A transaction about to be appended to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub from_account: AccountId,
    pub to_account_id: AccountId,
    pub to_account_key: String,
    pub amount: Cents,
    pub timestamp: DateTime<Utc>,
    pub idempotency_key: Option<String>,
}

/// A caller's request to move `amount` from account `from_account` to the
/// account currently holding `to_account_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub from_account: AccountId,
    pub to_account_key: String,
    pub amount: Cents,
    pub idempotency_key: Option<String>,
    pub timeout: Option<Duration>,
}

impl TransferRequest {
    pub fn new(from_account: AccountId, to_account_key: impl Into<String>, amount: Cents) -> Self {
        Self {
            from_account,
            to_account_key: to_account_key.into(),
            amount,
            idempotency_key: None,
            timeout: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_amount(self.amount)?;
        validate_key(&self.to_account_key)?;
        if let Some(key) = &self.idempotency_key {
            validate_idempotency_key(key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorded(from: AccountId, to: &str, amount: Cents) -> Transaction {
        Transaction {
            id: 1,
            from_account: from,
            to_account: to.to_string(),
            amount,
            timestamp: Utc::now(),
            idempotency_key: Some("retry-1".into()),
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(TransferRequest::new(1, "Y-key", 100).validate().is_ok());
        assert_eq!(
            TransferRequest::new(1, "Y-key", 0).validate(),
            Err(ValidationError::NonPositiveAmount(0))
        );
        assert_eq!(
            TransferRequest::new(1, "Y-key", -100).validate(),
            Err(ValidationError::NonPositiveAmount(-100))
        );
        assert!(matches!(
            TransferRequest::new(1, "", 100).validate(),
            Err(ValidationError::InvalidKey(_))
        ));
        assert_eq!(
            TransferRequest::new(1, "Y-key", 100)
                .with_idempotency_key("")
                .validate(),
            Err(ValidationError::InvalidIdempotencyKey)
        );
    }

    #[test]
    fn test_matches_compares_movement_only() {
        let tx = recorded(1, "Y-key", 100);
        let same = TransferRequest::new(1, "Y-key", 100).with_idempotency_key("retry-1");
        assert!(tx.matches(&same));
        assert!(tx.matches(&same.clone().with_timeout(Duration::from_secs(1))));
        assert!(!tx.matches(&TransferRequest::new(1, "Y-key", 101)));
        assert!(!tx.matches(&TransferRequest::new(2, "Y-key", 100)));
        assert!(!tx.matches(&TransferRequest::new(1, "Z-key", 100)));
    }

    #[test]
    fn test_serialized_shape() {
        let mut tx = recorded(7, "Y-key", 100);
        tx.idempotency_key = None;
        let json = serde_json::to_value(&tx).unwrap();
        let mut fields: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        fields.sort();
        assert_eq!(
            fields,
            vec!["amount", "from_account", "id", "timestamp", "to_account"]
        );
    }
}
