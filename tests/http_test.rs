mod common;

use anyhow::Result;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{Ledger, test_service};
use serde_json::{Value, json};
use tally::http::{IDEMPOTENCY_KEY_HEADER, router};
use tempfile::TempDir;
use tower::ServiceExt;

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
    send_with(app, method, uri, body, &[]).await
}

async fn send_with(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json)?))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

async fn app_with_accounts(accounts: &[(&str, i64)]) -> Result<(Router, Ledger, TempDir)> {
    let (service, temp) = test_service().await?;
    let ledger = Ledger::seed(&service, accounts).await?;
    Ok((router(service), ledger, temp))
}

#[tokio::test]
async fn test_health() -> Result<()> {
    let (app, _ledger, _temp) = app_with_accounts(&[]).await?;
    let (status, body) = send(&app, Method::GET, "/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
    Ok(())
}

#[tokio::test]
async fn test_client_and_account_routes() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let app = router(service);

    let (status, client) = send(
        &app,
        Method::POST,
        "/clients",
        Some(json!({"name": "Grace", "email": "grace@example.com"})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let client_id = client["id"].as_i64().unwrap();

    let (status, account) = send(
        &app,
        Method::POST,
        "/accounts",
        Some(json!({"client_id": client_id, "key": "grace-main", "balance": 1500})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(account["balance"], 1500);
    let account_id = account["id"].as_i64().unwrap();

    let (status, accounts) = send(
        &app,
        Method::GET,
        &format!("/clients/{client_id}/accounts"),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accounts.as_array().unwrap().len(), 1);

    let (status, patched) = send(
        &app,
        Method::PATCH,
        &format!("/accounts/{account_id}"),
        Some(json!({"key": "grace-primary"})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["key"], "grace-primary");

    // Funded account and its owner are both protected from deletion.
    let (status, body) = send(&app, Method::DELETE, &format!("/accounts/{account_id}"), None).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "account_not_empty");

    let (status, body) = send(&app, Method::DELETE, &format!("/clients/{client_id}"), None).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "client_has_accounts");

    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/accounts/{account_id}"),
        Some(json!({"balance": 0})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, Method::DELETE, &format!("/accounts/{account_id}"), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
    Ok(())
}

#[tokio::test]
async fn test_transfer_route() -> Result<()> {
    let (app, ledger, _temp) = app_with_accounts(&[("X-key", 1000), ("Y-key", 0)]).await?;
    let x = ledger.account("X-key");

    let (status, tx) = send(
        &app,
        Method::POST,
        "/transactions",
        Some(json!({"from_account": x.id, "to_account": "Y-key", "amount": 100})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tx["from_account"], x.id);
    assert_eq!(tx["to_account"], "Y-key");
    assert_eq!(tx["amount"], 100);
    assert!(tx.get("idempotency_key").is_none());

    let (status, fetched) = send(&app, Method::GET, &format!("/transactions/{}", tx["id"]), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, tx);

    let (_, source) = send(&app, Method::GET, &format!("/accounts/{}", x.id), None).await?;
    assert_eq!(source["balance"], 900);

    let (status, history) = send(
        &app,
        Method::GET,
        &format!("/accounts/{}/transactions", x.id),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_idempotency_header_replays() -> Result<()> {
    let (app, ledger, _temp) = app_with_accounts(&[("a", 1000), ("b", 0)]).await?;
    let body = json!({"from_account": ledger.account("a").id, "to_account": "b", "amount": 40});

    let (s1, first) = send_with(
        &app,
        Method::POST,
        "/transactions",
        Some(body.clone()),
        &[(IDEMPOTENCY_KEY_HEADER, "req-1")],
    )
    .await?;
    let (s2, second) = send_with(
        &app,
        Method::POST,
        "/transactions",
        Some(body),
        &[(IDEMPOTENCY_KEY_HEADER, "req-1")],
    )
    .await?;
    assert_eq!(s1, StatusCode::CREATED);
    assert_eq!(s2, StatusCode::CREATED);
    assert_eq!(first, second);
    assert_eq!(first["idempotency_key"], "req-1");

    let (_, all) = send(&app, Method::GET, "/transactions", None).await?;
    assert_eq!(all.as_array().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_error_status_mapping() -> Result<()> {
    let (app, ledger, _temp) = app_with_accounts(&[("a", 50), ("b", 0)]).await?;
    let a = ledger.account("a").id;

    let cases = [
        (json!({"from_account": a, "to_account": "b", "amount": 0}), StatusCode::BAD_REQUEST, "invalid_transfer"),
        (json!({"from_account": a, "to_account": "a", "amount": 5}), StatusCode::BAD_REQUEST, "invalid_transfer"),
        (json!({"from_account": 999, "to_account": "b", "amount": 5}), StatusCode::NOT_FOUND, "source_not_found"),
        (json!({"from_account": a, "to_account": "zzz", "amount": 5}), StatusCode::NOT_FOUND, "destination_not_found"),
        (json!({"from_account": a, "to_account": "b", "amount": 51}), StatusCode::PRECONDITION_FAILED, "insufficient_funds"),
    ];
    for (body, expected_status, expected_code) in cases {
        let (status, error) = send(&app, Method::POST, "/transactions", Some(body)).await?;
        assert_eq!(status, expected_status);
        assert_eq!(error["error"], expected_code);
        assert!(error["message"].is_string());
    }

    let (status, error) = send(&app, Method::GET, "/transactions/12345", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["error"], "transaction_not_found");

    let (status, error) = send(
        &app,
        Method::POST,
        "/accounts",
        Some(json!({"client_id": ledger.client.id, "key": "a"})),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"], "account_key_taken");
    Ok(())
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() -> Result<()> {
    let (app, _ledger, _temp) = app_with_accounts(&[]).await?;
    let (status, error) = send(
        &app,
        Method::POST,
        "/transactions",
        Some(json!({"from_account": "one", "amount": 5})),
    )
    .await?;
    assert!(status.is_client_error());
    assert_eq!(error["error"], "bad_request");
    Ok(())
}

#[tokio::test]
async fn test_metrics_are_scraped() -> Result<()> {
    let (app, ledger, _temp) = app_with_accounts(&[("m-src", 100), ("m-dst", 0)]).await?;
    let body = json!({"from_account": ledger.account("m-src").id, "to_account": "m-dst", "amount": 10});
    let (status, _) = send(&app, Method::POST, "/transactions", Some(body)).await?;
    assert_eq!(status, StatusCode::CREATED);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/metrics")
        .body(Body::empty())?;
    let response = app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let text = String::from_utf8(bytes.to_vec())?;

    assert!(text.lines().any(|line| {
        line.starts_with("http_requests_total{")
            && line.contains("endpoint=\"/transactions\"")
            && line.contains("method=\"POST\"")
            && line.contains("status=\"201\"")
    }));
    assert!(text.contains("http_request_duration_seconds_bucket"));
    assert!(text.contains("tally_transfers_total{outcome=\"committed\"}"));
    Ok(())
}
