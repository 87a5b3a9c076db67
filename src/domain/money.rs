use thiserror::Error;

/// Balances and amounts are integers in the smallest currency unit.
/// For BRL/EUR/USD, 1 unit = 100 cents, so 50.00 = 5000 cents.
pub type Cents = i64;

/// Format cents as a human-readable decimal string.
/// Example: 5000 -> "50.00", -1234 -> "-12.34"
///
/// Accepts anything that widens to `i128`, so sums of balances format too.
pub fn format_cents(cents: impl Into<i128>) -> String {
    let cents: i128 = cents.into();
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs_cents / 100, abs_cents % 100)
}

/// Parse a decimal string into cents.
/// Example: "50.00" -> 5000, "12.5" -> 1250, "100" -> 10000
///
/// More than two decimal places are rejected, never truncated.
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let trimmed = input.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let (units_str, fraction_str) = match digits.split_once('.') {
        Some((units, fraction)) => (units, fraction),
        None => (digits, ""),
    };

    if units_str.is_empty() && fraction_str.is_empty() {
        return Err(ParseCentsError::InvalidFormat(input.to_string()));
    }
    if !units_str.chars().all(|c| c.is_ascii_digit())
        || !fraction_str.chars().all(|c| c.is_ascii_digit())
    {
        return Err(ParseCentsError::InvalidFormat(input.to_string()));
    }
    if fraction_str.len() > 2 {
        return Err(ParseCentsError::TooPrecise(input.to_string()));
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str
            .parse()
            .map_err(|_| ParseCentsError::OutOfRange(input.to_string()))?
    };
    let fraction: i64 = match fraction_str.len() {
        0 => 0,
        // "12.5" means fifty cents
        1 => fraction_str.parse::<i64>().unwrap_or(0) * 10,
        _ => fraction_str.parse().unwrap_or(0),
    };

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(fraction))
        .ok_or_else(|| ParseCentsError::OutOfRange(input.to_string()))?;

    Ok(if negative { -cents } else { cents })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCentsError {
    #[error("invalid money format: {0:?}")]
    InvalidFormat(String),

    #[error("at most two decimal places are allowed: {0:?}")]
    TooPrecise(String),

    #[error("amount out of range: {0:?}")]
    OutOfRange(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(5000), "50.00");
        assert_eq!(format_cents(1234), "12.34");
        assert_eq!(format_cents(1), "0.01");
        assert_eq!(format_cents(0), "0.00");
        assert_eq!(format_cents(-5000), "-50.00");
        assert_eq!(format_cents(-1), "-0.01");
        assert_eq!(format_cents(i64::MIN), "-92233720368547758.08");
        assert_eq!(
            format_cents(i128::from(i64::MAX) * 2),
            "184467440737095516.14"
        );
    }

    #[test]
    fn test_parse_cents() {
        assert_eq!(parse_cents("50.00"), Ok(5000));
        assert_eq!(parse_cents("50"), Ok(5000));
        assert_eq!(parse_cents("12.34"), Ok(1234));
        assert_eq!(parse_cents("12.5"), Ok(1250));
        assert_eq!(parse_cents("0.01"), Ok(1));
        assert_eq!(parse_cents(".50"), Ok(50));
        assert_eq!(parse_cents("7."), Ok(700));
        assert_eq!(parse_cents(" -50.00 "), Ok(-5000));
    }

    #[test]
    fn test_parse_cents_rejects_extra_precision() {
        assert_eq!(
            parse_cents("100.999"),
            Err(ParseCentsError::TooPrecise("100.999".into()))
        );
    }

    #[test]
    fn test_parse_cents_invalid() {
        assert!(matches!(parse_cents("abc"), Err(ParseCentsError::InvalidFormat(_))));
        assert!(matches!(parse_cents("12.34.56"), Err(ParseCentsError::InvalidFormat(_))));
        assert!(matches!(parse_cents("."), Err(ParseCentsError::InvalidFormat(_))));
        assert!(matches!(parse_cents("+5"), Err(ParseCentsError::InvalidFormat(_))));
        assert!(matches!(parse_cents(""), Err(ParseCentsError::InvalidFormat(_))));
    }

    #[test]
    fn test_parse_cents_overflow() {
        assert!(matches!(
            parse_cents("92233720368547758.08"),
            Err(ParseCentsError::OutOfRange(_))
        ));
        assert!(matches!(
            parse_cents("99999999999999999999"),
            Err(ParseCentsError::OutOfRange(_))
        ));
    }
}
