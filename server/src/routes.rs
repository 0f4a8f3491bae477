//! HTTP routes over the ledger service.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use finledger_common::AccountId;
use finledger_ledger::{LedgerService, LedgerStore, TransactionRecord};

use crate::error::ApiError;
use crate::metrics::{LedgerMetrics, MetricsSnapshot};

/// Shared handler state.
pub struct AppState<S> {
    pub service: Arc<LedgerService<S>>,
    pub metrics: Arc<LedgerMetrics>,
}

impl<S> AppState<S> {
    /// Create state around `service`.
    pub fn new(service: LedgerService<S>, metrics: Arc<LedgerMetrics>) -> Self {
        Self {
            service: Arc::new(service),
            metrics,
        }
    }
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub user_id: i64,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub db_connected: bool,
}

/// Build the application router.
pub fn router<S: LedgerStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/balance/:user_id", get(get_balance::<S>))
        .route("/deposit", post(deposit::<S>))
        .route("/transfer", post(transfer::<S>))
        .route("/transactions/:user_id", get(get_transactions::<S>))
        .route("/health", get(health_check::<S>))
        .route("/metrics", get(metrics_handler::<S>))
        .with_state(state)
}

fn account_param(raw: &str) -> Result<i64, ApiError> {
    Ok(raw.parse::<AccountId>()?.get())
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::InvalidInput(rejection.body_text()))
}

async fn get_balance<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let balance = state.service.get_balance(account_param(&user_id)?).await?;
    Ok(Json(json!({ "balance": balance })))
}

async fn deposit<S: LedgerStore>(
    State(state): State<AppState<S>>,
    body: Result<Json<DepositRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = json_body(body)?;
    let record = state.service.deposit(request.user_id, request.amount).await?;

    Ok(Json(json!({
        "message": "Deposit successful",
        "transaction": record,
    })))
}

async fn transfer<S: LedgerStore>(
    State(state): State<AppState<S>>,
    body: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = json_body(body)?;
    let receipt = state
        .service
        .transfer(request.from_user_id, request.to_user_id, request.amount)
        .await?;

    Ok(Json(json!({
        "message": "Transfer successful",
        "transactions": [receipt.debit, receipt.credit],
    })))
}

async fn get_transactions<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<TransactionRecord>>, ApiError> {
    let records = state
        .service
        .last_transactions(account_param(&user_id)?)
        .await?;
    Ok(Json(records))
}

async fn health_check<S: LedgerStore>(
    State(state): State<AppState<S>>,
) -> (StatusCode, Json<HealthResponse>) {
    let db_connected = state.service.health().await.is_ok();
    let status = if db_connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if db_connected { "ok" } else { "degraded" },
            service: "finledger",
            version: env!("CARGO_PKG_VERSION"),
            db_connected,
        }),
    )
}

async fn metrics_handler<S: LedgerStore>(State(state): State<AppState<S>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
