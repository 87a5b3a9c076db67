use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

use crate::application::LedgerService;
use crate::domain::{Account, AccountId, Client, Transaction, format_cents, timestamp};

/// Full ledger snapshot for JSON export
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSnapshot {
    pub version: String,
    #[serde(with = "crate::domain::timestamp")]
    pub exported_at: DateTime<Utc>,
    pub clients: Vec<Client>,
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
}

/// Exporter for converting ledger data to CSV or JSON
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    async fn transactions(&self, account: Option<AccountId>) -> Result<Vec<Transaction>> {
        Ok(match account {
            Some(id) => self.service.account_transactions(id).await?,
            None => self.service.list_transactions().await?,
        })
    }

    /// Export the transaction log, or one account's slice of it, as CSV.
    /// Returns the number of rows written.
    pub async fn export_transactions_csv<W: Write>(
        &self,
        writer: W,
        account: Option<AccountId>,
    ) -> Result<usize> {
        let transactions = self.transactions(account).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "timestamp",
            "from_account",
            "to_account",
            "amount_cents",
            "amount",
            "idempotency_key",
        ])?;

        for tx in &transactions {
            csv_writer.write_record(&[
                tx.id.to_string(),
                timestamp::format(&tx.timestamp),
                tx.from_account.to_string(),
                tx.to_account.clone(),
                tx.amount.to_string(),
                format_cents(tx.amount),
                tx.idempotency_key.clone().unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(transactions.len())
    }

    /// Export the transaction log, or one account's slice of it, as a JSON array.
    pub async fn export_transactions_json<W: Write>(
        &self,
        mut writer: W,
        account: Option<AccountId>,
    ) -> Result<usize> {
        let transactions = self.transactions(account).await?;
        serde_json::to_writer_pretty(&mut writer, &transactions)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(transactions.len())
    }

    /// Export clients, accounts and transactions as one JSON document
    pub async fn export_snapshot_json<W: Write>(&self, mut writer: W) -> Result<LedgerSnapshot> {
        let snapshot = LedgerSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            clients: self.service.list_clients().await?,
            accounts: self.service.list_accounts().await?,
            transactions: self.service.list_transactions().await?,
        };

        serde_json::to_writer_pretty(&mut writer, &snapshot)?;
        writer.write_all(b"\n")?;
        writer.flush()?;

        Ok(snapshot)
    }
}
