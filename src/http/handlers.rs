use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{MatchedPath, Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::application::LedgerService;
use crate::domain::{
    Account, AccountId, AccountUpdate, Cents, Client, ClientId, ClientUpdate, NewAccount,
    NewClient, Transaction, TransactionId, TransferRequest,
};
use crate::metrics;

use super::error::ApiError;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
}

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

pub async fn render_metrics() -> (StatusCode, String) {
    match metrics::encode() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("metrics encode error: {e}"),
            )
        }
    }
}

/// Count requests and their latency by method and route template.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), endpoint.as_str(), status.as_str()])
        .inc();
    metrics::HTTP_REQUEST_DURATION
        .with_label_values(&[method.as_str(), endpoint.as_str()])
        .observe(started.elapsed().as_secs_f64());
    response
}

// ========================
// Clients
// ========================

#[derive(Debug, Deserialize)]
pub struct CreateClientBody {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateClientBody {
    pub name: Option<String>,
    pub email: Option<String>,
}

pub async fn list_clients(State(service): State<LedgerService>) -> ApiResult<Json<Vec<Client>>> {
    Ok(Json(service.list_clients().await?))
}

pub async fn create_client(
    State(service): State<LedgerService>,
    payload: Result<Json<CreateClientBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Client>)> {
    let Json(body) = payload?;
    let client = service
        .create_client(NewClient::new(body.name, body.email))
        .await?;
    info!(client_id = client.id, "client created");
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn get_client(
    State(service): State<LedgerService>,
    Path(id): Path<ClientId>,
) -> ApiResult<Json<Client>> {
    Ok(Json(service.get_client(id).await?))
}

pub async fn update_client(
    State(service): State<LedgerService>,
    Path(id): Path<ClientId>,
    payload: Result<Json<UpdateClientBody>, JsonRejection>,
) -> ApiResult<Json<Client>> {
    let Json(body) = payload?;
    let mut update = ClientUpdate::default();
    if let Some(name) = body.name {
        update = update.with_name(name);
    }
    if let Some(email) = body.email {
        update = update.with_email(email);
    }
    Ok(Json(service.update_client(id, update).await?))
}

pub async fn delete_client(
    State(service): State<LedgerService>,
    Path(id): Path<ClientId>,
) -> ApiResult<StatusCode> {
    service.delete_client(id).await?;
    info!(client_id = id, "client deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_client_accounts(
    State(service): State<LedgerService>,
    Path(id): Path<ClientId>,
) -> ApiResult<Json<Vec<Account>>> {
    Ok(Json(service.list_client_accounts(id).await?))
}

// ========================
// Accounts
// ========================

#[derive(Debug, Deserialize)]
pub struct CreateAccountBody {
    pub client_id: ClientId,
    pub key: String,
    #[serde(default)]
    pub balance: Cents,
}

pub async fn list_accounts(
    State(service): State<LedgerService>,
) -> ApiResult<Json<Vec<Account>>> {
    Ok(Json(service.list_accounts().await?))
}

pub async fn create_account(
    State(service): State<LedgerService>,
    payload: Result<Json<CreateAccountBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Account>)> {
    let Json(body) = payload?;
    let account = service
        .create_account(NewAccount::new(body.client_id, body.key).with_balance(body.balance))
        .await?;
    info!(account_id = account.id, key = %account.key, "account created");
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn get_account(
    State(service): State<LedgerService>,
    Path(id): Path<AccountId>,
) -> ApiResult<Json<Account>> {
    Ok(Json(service.get_account(id).await?))
}

pub async fn update_account(
    State(service): State<LedgerService>,
    Path(id): Path<AccountId>,
    payload: Result<Json<AccountUpdate>, JsonRejection>,
) -> ApiResult<Json<Account>> {
    let Json(update) = payload?;
    Ok(Json(service.update_account(id, update).await?))
}

pub async fn delete_account(
    State(service): State<LedgerService>,
    Path(id): Path<AccountId>,
) -> ApiResult<StatusCode> {
    service.delete_account(id).await?;
    info!(account_id = id, "account deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn account_transactions(
    State(service): State<LedgerService>,
    Path(id): Path<AccountId>,
) -> ApiResult<Json<Vec<Transaction>>> {
    Ok(Json(service.account_transactions(id).await?))
}

// ========================
// Transactions
// ========================

#[derive(Debug, Deserialize)]
pub struct TransferBody {
    pub from_account: AccountId,
    /// Destination account key.
    pub to_account: String,
    pub amount: Cents,
    pub idempotency_key: Option<String>,
    pub timeout_ms: Option<u64>,
}

fn idempotency_key(headers: &HeaderMap, body: Option<String>) -> ApiResult<Option<String>> {
    let header = match headers.get(IDEMPOTENCY_KEY_HEADER) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| ApiError::BadRequest("Idempotency-Key must be ASCII".into()))?
                .to_string(),
        ),
        None => None,
    };
    match (header, body) {
        (Some(h), Some(b)) if h != b => Err(ApiError::BadRequest(
            "Idempotency-Key header and body field disagree".into(),
        )),
        (Some(h), _) => Ok(Some(h)),
        (None, b) => Ok(b),
    }
}

pub async fn list_transactions(
    State(service): State<LedgerService>,
) -> ApiResult<Json<Vec<Transaction>>> {
    Ok(Json(service.list_transactions().await?))
}

pub async fn create_transaction(
    State(service): State<LedgerService>,
    headers: HeaderMap,
    payload: Result<Json<TransferBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Transaction>)> {
    let Json(body) = payload?;
    let mut request = TransferRequest::new(body.from_account, body.to_account, body.amount);
    if let Some(key) = idempotency_key(&headers, body.idempotency_key)? {
        request = request.with_idempotency_key(key);
    }
    if let Some(ms) = body.timeout_ms {
        request = request.with_timeout(Duration::from_millis(ms));
    }
    let transaction = service.transfer(request).await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

pub async fn get_transaction(
    State(service): State<LedgerService>,
    Path(id): Path<TransactionId>,
) -> ApiResult<Json<Transaction>> {
    Ok(Json(service.get_transaction(id).await?))
}
