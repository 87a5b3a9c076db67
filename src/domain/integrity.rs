use serde::Serialize;

/// Raw counters gathered from the store for an integrity check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityStats {
    pub client_count: i64,
    pub account_count: i64,
    pub transaction_count: i64,
    /// Sum of all balances in cents. Wider than a single balance.
    pub total_balance: i128,
    pub negative_balances: i64,
    pub invalid_amounts: i64,
    pub self_transfers: i64,
    pub orphaned_accounts: i64,
}

/// Result of checking the ledger for invariant violations.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub client_count: i64,
    pub account_count: i64,
    pub transaction_count: i64,
    pub total_balance: i128,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

pub fn build_integrity_report(stats: &IntegrityStats) -> IntegrityReport {
    let mut issues = Vec::new();

    if stats.negative_balances > 0 {
        issues.push(format!(
            "{} account(s) have a negative balance",
            stats.negative_balances
        ));
    }
    if stats.invalid_amounts > 0 {
        issues.push(format!(
            "{} transaction(s) have a non-positive amount",
            stats.invalid_amounts
        ));
    }
    if stats.self_transfers > 0 {
        issues.push(format!(
            "{} transaction(s) move funds from an account to itself",
            stats.self_transfers
        ));
    }
    if stats.orphaned_accounts > 0 {
        issues.push(format!(
            "{} account(s) reference a client that no longer exists",
            stats.orphaned_accounts
        ));
    }

    IntegrityReport {
        client_count: stats.client_count,
        account_count: stats.account_count,
        transaction_count: stats.transaction_count,
        total_balance: stats.total_balance,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_stats_are_healthy() {
        let report = build_integrity_report(&IntegrityStats {
            client_count: 2,
            account_count: 3,
            transaction_count: 10,
            total_balance: 150_000,
            ..Default::default()
        });
        assert!(report.is_healthy());
        assert_eq!(report.total_balance, 150_000);
    }

    #[test]
    fn test_each_violation_is_reported() {
        let report = build_integrity_report(&IntegrityStats {
            negative_balances: 1,
            invalid_amounts: 2,
            self_transfers: 3,
            orphaned_accounts: 4,
            ..Default::default()
        });
        assert!(!report.is_healthy());
        assert_eq!(report.issues.len(), 4);
        assert!(report.issues[1].starts_with("2 transaction(s)"));
    }
}
