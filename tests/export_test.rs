mod common;

use anyhow::Result;
use common::{Ledger, test_service};
use tally::domain::TransferRequest;
use tally::io::Exporter;

#[tokio::test]
async fn test_export_transactions_csv() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let ledger = Ledger::seed(&service, &[("a", 10_000), ("b", 0), ("c", 0)]).await?;
    let a = ledger.account("a");
    service
        .transfer(TransferRequest::new(a.id, "b", 1_250).with_idempotency_key("inv-1"))
        .await?;
    service.transfer(TransferRequest::new(a.id, "c", 99)).await?;

    let mut out = Vec::new();
    let count = Exporter::new(&service)
        .export_transactions_csv(&mut out, None)
        .await?;
    assert_eq!(count, 2);

    let mut reader = csv::Reader::from_reader(out.as_slice());
    let headers = reader.headers()?.clone();
    assert_eq!(
        headers.iter().collect::<Vec<_>>(),
        vec!["id", "timestamp", "from_account", "to_account", "amount_cents", "amount", "idempotency_key"]
    );
    let rows: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>()?;
    assert_eq!(rows.len(), 2);
    assert_eq!(&rows[0][3], "b");
    assert_eq!(&rows[0][4], "1250");
    assert_eq!(&rows[0][5], "12.50");
    assert_eq!(&rows[0][6], "inv-1");
    assert_eq!(&rows[1][6], "");
    Ok(())
}

#[tokio::test]
async fn test_export_account_slice_json() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let ledger = Ledger::seed(&service, &[("a", 1_000), ("b", 1_000), ("c", 0)]).await?;
    service
        .transfer(TransferRequest::new(ledger.account("a").id, "c", 10))
        .await?;
    service
        .transfer(TransferRequest::new(ledger.account("b").id, "c", 20))
        .await?;

    let mut out = Vec::new();
    let count = Exporter::new(&service)
        .export_transactions_json(&mut out, Some(ledger.account("b").id))
        .await?;
    assert_eq!(count, 1);

    let parsed: serde_json::Value = serde_json::from_slice(&out)?;
    let items = parsed.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["amount"], 20);
    Ok(())
}

#[tokio::test]
async fn test_export_snapshot() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let ledger = Ledger::seed(&service, &[("a", 500), ("b", 0)]).await?;
    service
        .transfer(TransferRequest::new(ledger.account("a").id, "b", 5))
        .await?;

    let mut out = Vec::new();
    let snapshot = Exporter::new(&service).export_snapshot_json(&mut out).await?;
    assert_eq!(snapshot.clients.len(), 1);
    assert_eq!(snapshot.accounts.len(), 2);
    assert_eq!(snapshot.transactions.len(), 1);

    let parsed: serde_json::Value = serde_json::from_slice(&out)?;
    assert_eq!(parsed["accounts"][0]["balance"], 495);
    assert_eq!(parsed["version"], env!("CARGO_PKG_VERSION"));
    Ok(())
}
