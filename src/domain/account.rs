use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Cents, ClientId, ValidationError, validate_balance, validate_key};

pub type AccountId = i64;

/// A balance-holding account, addressable by `id` or by its unique `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub client_id: ClientId,
    pub key: String,
    /// Never negative.
    pub balance: Cents,
    #[serde(with = "super::timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Returns true if the balance can absorb a debit of `amount`.
    pub fn can_cover(&self, amount: Cents) -> bool {
        self.balance >= amount
    }

    pub fn is_empty(&self) -> bool {
        self.balance == 0
    }
}

/// Input for opening an account. The id is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    pub client_id: ClientId,
    pub key: String,
    #[serde(default)]
    pub balance: Cents,
}

impl NewAccount {
    pub fn new(client_id: ClientId, key: impl Into<String>) -> Self {
        Self {
            client_id,
            key: key.into(),
            balance: 0,
        }
    }

    pub fn with_balance(mut self, balance: Cents) -> Self {
        self.balance = balance;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_key(&self.key)?;
        validate_balance(self.balance)
    }
}

/// Partial update for an account; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdate {
    #[serde(default)]
    pub client_id: Option<ClientId>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub balance: Option<Cents>,
}

impl AccountUpdate {
    pub fn with_client(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_balance(mut self, balance: Cents) -> Self {
        self.balance = Some(balance);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.client_id.is_none() && self.key.is_none() && self.balance.is_none()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::EmptyUpdate);
        }
        if let Some(key) = &self.key {
            validate_key(key)?;
        }
        if let Some(balance) = self.balance {
            validate_balance(balance)?;
        }
        Ok(())
    }
}
