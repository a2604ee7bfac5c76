use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{error, info};

use crate::application::{AppError, Page, TransactionResult};
use crate::auth::AuthError;
use crate::domain::format_cents;

use super::{
    AppState, BalanceResponse, ErrorBody, HealthResponse, HistoryQuery, TransactionResponse,
    TransactionsResponse, VerifiedService, WalletRequest,
};

/// JSON error reply with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BadRequest", message)
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "PayloadTooLarge",
            format!("Request body exceeds {} bytes", limit),
        )
    }

    fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "InternalServerError",
            "An unexpected error occurred",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized", err.to_string())
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Validation(message) => Self::bad_request(message),
            AppError::Unauthorized(auth) => auth.into(),
            AppError::Internal(err) => {
                error!(error = ?err, "request failed");
                Self::internal()
            }
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| ApiError::bad_request(err.to_string()))
}

fn respond(
    result: TransactionResult,
    failure: &'static str,
) -> Result<Json<TransactionResponse>, ApiError> {
    match result {
        TransactionResult {
            success: true,
            transaction_id: Some(tx_id),
            balance: Some(balance),
            ..
        } => Ok(Json(TransactionResponse {
            tx_id,
            balance: format_cents(balance),
        })),
        TransactionResult {
            success: false,
            error: Some(rejection),
            ..
        } => Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            failure,
            rejection.to_string(),
        )),
        other => {
            error!(result = ?other, "inconsistent transaction result");
            Err(ApiError::internal())
        }
    }
}

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "service": "Cashier API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "description": "Wallet ledger service",
        "endpoints": {
            "health": "/health",
            "withdraw": "POST /v1/wallets/withdraw",
            "deposit": "POST /v1/wallets/deposit",
            "balance": "GET /v1/wallets/{playerId}/balance",
            "transactions": "GET /v1/wallets/{playerId}/transactions"
        }
    }))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "cashier".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

pub async fn withdraw(
    State(state): State<AppState>,
    Extension(caller): Extension<VerifiedService>,
    body: Bytes,
) -> Result<Json<TransactionResponse>, ApiError> {
    let request: WalletRequest = parse_body(&body)?;
    info!(service_id = %caller.0, player_id = %request.player_id, "withdraw requested");

    let result = state
        .transactions
        .withdraw(
            &request.player_id,
            request.amount,
            &request.reference,
            &request.idempotency_key,
        )
        .await?;
    respond(result, "WithdrawFailed")
}

pub async fn deposit(
    State(state): State<AppState>,
    Extension(caller): Extension<VerifiedService>,
    body: Bytes,
) -> Result<Json<TransactionResponse>, ApiError> {
    let request: WalletRequest = parse_body(&body)?;
    info!(service_id = %caller.0, player_id = %request.player_id, "deposit requested");

    let result = state
        .transactions
        .deposit(
            &request.player_id,
            request.amount,
            &request.reference,
            &request.idempotency_key,
        )
        .await?;
    respond(result, "DepositFailed")
}

pub async fn balance(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.balances.get_balance(&player_id).await?;
    Ok(Json(balance.into()))
}

pub async fn transactions(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let page = Page::new(query.limit, query.offset);
    let entries = state.balances.get_transactions(&player_id, page).await?;
    Ok(Json(TransactionsResponse {
        player_id,
        transactions: entries.into_iter().map(Into::into).collect(),
    }))
}
