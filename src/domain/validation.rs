use thiserror::Error;

use super::Cents;

/// Longest accepted account key (an e-mail shaped alias of 77 characters).
pub const MAX_KEY_LEN: usize = 77;

/// Longest accepted caller-supplied idempotency token.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Field-level validation failures for domain inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("invalid email address: {0:?}")]
    InvalidEmail(String),

    #[error("invalid account key {0:?}: must be 1-77 characters without whitespace")]
    InvalidKey(String),

    #[error("balance must not be negative, got {0}")]
    NegativeBalance(Cents),

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Cents),

    #[error("invalid idempotency key: must be 1-128 printable characters")]
    InvalidIdempotencyKey,

    #[error("update has no fields to change")]
    EmptyUpdate,
}

pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(())
}

/// Minimal shape check: exactly one `@` with something on both sides and a
/// dot in the domain part.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidEmail(email.to_string());
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || email.chars().any(char::is_whitespace)
    {
        return Err(invalid());
    }
    Ok(())
}

pub fn validate_key(key: &str) -> Result<(), ValidationError> {
    if key.is_empty()
        || key.chars().count() > MAX_KEY_LEN
        || key.chars().any(char::is_whitespace)
    {
        return Err(ValidationError::InvalidKey(key.to_string()));
    }
    Ok(())
}

pub fn validate_balance(balance: Cents) -> Result<(), ValidationError> {
    if balance < 0 {
        return Err(ValidationError::NegativeBalance(balance));
    }
    Ok(())
}

pub fn validate_amount(amount: Cents) -> Result<(), ValidationError> {
    if amount <= 0 {
        return Err(ValidationError::NonPositiveAmount(amount));
    }
    Ok(())
}

pub fn validate_idempotency_key(key: &str) -> Result<(), ValidationError> {
    if key.is_empty()
        || key.len() > MAX_IDEMPOTENCY_KEY_LEN
        || key.chars().any(|c| c.is_control() || c.is_whitespace())
    {
        return Err(ValidationError::InvalidIdempotencyKey);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_shapes() {
        assert!(validate_email("ana@example.com").is_ok());
        assert!(validate_email("ana.souza+pix@bank.com.br").is_ok());
        assert!(validate_email("ana@localhost").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("ana@@example.com").is_err());
        assert!(validate_email("ana @example.com").is_err());
        assert!(validate_email("ana").is_err());
    }

    #[test]
    fn test_key_rules() {
        assert!(validate_key("Y-key").is_ok());
        assert!(validate_key("+5511999990000").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("two words").is_err());
        assert!(validate_key(&"k".repeat(MAX_KEY_LEN)).is_ok());
        assert!(validate_key(&"k".repeat(MAX_KEY_LEN + 1)).is_err());
    }

    #[test]
    fn test_amount_and_balance() {
        assert!(validate_amount(1).is_ok());
        assert_eq!(validate_amount(0), Err(ValidationError::NonPositiveAmount(0)));
        assert_eq!(validate_amount(-5), Err(ValidationError::NonPositiveAmount(-5)));
        assert!(validate_balance(0).is_ok());
        assert_eq!(validate_balance(-1), Err(ValidationError::NegativeBalance(-1)));
    }

    #[test]
    fn test_idempotency_key_rules() {
        assert!(validate_idempotency_key("req-7f3a").is_ok());
        assert!(validate_idempotency_key("").is_err());
        assert!(validate_idempotency_key("has space").is_err());
        assert!(validate_idempotency_key(&"x".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1)).is_err());
    }
}
