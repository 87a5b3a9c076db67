use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::warn;

use crate::application::AppError;

/// Error returned by every handler: either a ledger failure or a request
/// the router could not decode.
#[derive(Debug)]
pub enum ApiError {
    App(AppError),
    BadRequest(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError::App(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

pub fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::SourceNotFound(_)
        | AppError::DestinationNotFound(_)
        | AppError::AccountNotFound(_)
        | AppError::ClientNotFound(_)
        | AppError::TransactionNotFound(_) => StatusCode::NOT_FOUND,
        AppError::InvalidTransfer(_) | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AppError::InsufficientFunds { .. } => StatusCode::PRECONDITION_FAILED,
        AppError::AccountKeyTaken(_)
        | AppError::ClientEmailTaken(_)
        | AppError::AccountNotEmpty(_)
        | AppError::ClientHasAccounts(_) => StatusCode::CONFLICT,
        AppError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        AppError::TimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::App(err) => (status_for(&err), err.code(), err.to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, "bad_request", message),
        };
        if status.is_server_error() {
            warn!(status = status.as_u16(), code, "request failed");
        }
        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::ValidationError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&AppError::SourceNotFound(1)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&AppError::InvalidInput(ValidationError::EmptyName)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&AppError::InsufficientFunds {
                account_id: 1,
                balance: 0,
                required: 10
            }),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(
            status_for(&AppError::AccountNotEmpty(3)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&AppError::StoreUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&AppError::TimedOut(Duration::from_millis(5))),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
