//! REST surface over [`LedgerService`].

mod error;
mod handlers;

use std::future::Future;

use anyhow::{Context, Result};
use axum::Router;
use axum::middleware;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};

use crate::application::LedgerService;

pub use error::{ApiError, status_for};
pub use handlers::IDEMPOTENCY_KEY_HEADER;

/// Build the application router.
pub fn router(service: LedgerService) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::render_metrics))
        .route(
            "/clients",
            get(handlers::list_clients).post(handlers::create_client),
        )
        .route(
            "/clients/:id",
            get(handlers::get_client)
                .patch(handlers::update_client)
                .delete(handlers::delete_client),
        )
        .route("/clients/:id/accounts", get(handlers::list_client_accounts))
        .route(
            "/accounts",
            get(handlers::list_accounts).post(handlers::create_account),
        )
        .route(
            "/accounts/:id",
            get(handlers::get_account)
                .patch(handlers::update_account)
                .delete(handlers::delete_account),
        )
        .route(
            "/accounts/:id/transactions",
            get(handlers::account_transactions),
        )
        .route(
            "/transactions",
            get(handlers::list_transactions).post(handlers::create_transaction),
        )
        .route("/transactions/:id", get(handlers::get_transaction))
        .route_layer(middleware::from_fn(handlers::track_metrics))
        .with_state(service)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}

/// Serve the REST API until `shutdown` resolves.
pub async fn serve<F>(service: LedgerService, addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")?;
    info!("server stopped");
    Ok(())
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until killed.
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
