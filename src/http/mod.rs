//! HTTP surface for peer services.

mod handlers;
mod types;

pub use handlers::ApiError;
pub use types::*;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::application::{AppError, BalanceQuery, TransactionService};
use crate::auth::{
    AuthGate, SignedHeaders, HEADER_NONCE, HEADER_SERVICE_ID, HEADER_SIGNATURE, HEADER_TIMESTAMP,
};
use crate::storage::LedgerStore;

/// Largest request body accepted for signature verification.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Handles shared by every request, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub transactions: TransactionService,
    pub balances: BalanceQuery,
    pub gate: Arc<AuthGate>,
}

impl AppState {
    pub fn new(store: LedgerStore, gate: Arc<AuthGate>) -> Self {
        Self {
            transactions: TransactionService::new(store.clone()),
            balances: BalanceQuery::new(store),
            gate,
        }
    }
}

/// Service id established by the signature check, attached to the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedService(pub String);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/v1/wallets/withdraw", post(handlers::withdraw))
        .route("/v1/wallets/deposit", post(handlers::deposit))
        .route("/v1/wallets/:player_id/balance", get(handlers::balance))
        .route(
            "/v1/wallets/:player_id/transactions",
            get(handlers::transactions),
        )
        // Unmatched paths fall through to a plain 404.
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_signature,
        ))
        .with_state(state)
}

/// Serve until Ctrl-C, then drain in-flight requests.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr().context("Listener has no local address")?;
    info!(%addr, "cashier listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => {
            error!(%err, "cannot listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}

/// Buffer the body, verify the signature headers over it, and pass the
/// request on with the verified service id attached.
async fn require_signature(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if AuthGate::is_public_route(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| ApiError::payload_too_large(MAX_BODY_BYTES))?;

    let headers = signed_headers(&parts.headers);
    let service_id = state
        .gate
        .verify(&headers, &bytes)
        .map_err(AppError::from)?;

    let mut request = Request::from_parts(parts, Body::from(bytes));
    request.extensions_mut().insert(VerifiedService(service_id));
    Ok(next.run(request).await)
}

fn signed_headers(headers: &HeaderMap) -> SignedHeaders {
    let value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    SignedHeaders {
        service_id: value(HEADER_SERVICE_ID),
        timestamp: value(HEADER_TIMESTAMP),
        nonce: value(HEADER_NONCE),
        signature: value(HEADER_SIGNATURE),
    }
}
