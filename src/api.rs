// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! HTTP façade over the [`Engine`].
//!
//! ## Endpoints
//!
//! - `POST /api/customers/{customerId}/transactions/deposits` - Record a deposit
//! - `POST /api/customers/{customerId}/transactions/purchase` - Record a purchase
//! - `GET /api/customers/{customerId}/transactions` - Customer history, newest first
//! - `GET /api/restaurants/{restaurantId}/transactions` - Restaurant history, newest first
//! - `GET /api/balances/{userId}` - Current balance (zero for unknown users)
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST http://localhost:8081/api/customers/c1/transactions/deposits \
//!   -H "Content-Type: application/json" -d '{"amount": "100.00"}'
//!
//! curl -X POST http://localhost:8081/api/customers/c1/transactions/purchase \
//!   -H "Content-Type: application/json" -d '{"amount": "40.00", "restaurantId": "r1"}'
//!
//! curl http://localhost:8081/api/balances/r1
//! ```

use crate::balance::Balance;
use crate::base::UserId;
use crate::engine::Engine;
use crate::error::{LedgerError, StoreError};
use crate::transaction::Transaction;
use axum::{
    Json, Router,
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::info;

/// Budget for requests that record a transaction.
const CREATE_TIMEOUT: Duration = Duration::from_secs(10);
/// Budget for read-only requests.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub amount: Decimal,
    pub restaurant_id: String,
}

/// Balance as exposed over HTTP. Commission is only reported once a
/// restaurant has paid some.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub user_id: UserId,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_commission: Option<Decimal>,
}

impl From<Balance> for BalanceResponse {
    fn from(balance: Balance) -> Self {
        let total_commission = balance.total_commission();
        Self {
            amount: balance.amount().round_dp(Balance::DECIMAL_PRECISION),
            total_commission: (total_commission > Decimal::ZERO)
                .then(|| total_commission.round_dp(Balance::DECIMAL_PRECISION)),
            user_id: balance.user_id().clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Error Handling ===

/// Failure of a single request.
#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    /// The request exceeded its own time budget.
    TimedOut,
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::TimedOut => (
                StatusCode::GATEWAY_TIMEOUT,
                "REQUEST_TIMEOUT",
                "request timed out".to_string(),
            ),
            ApiError::Ledger(err) => {
                let (status, code) = match err {
                    LedgerError::InvalidAmount => (StatusCode::BAD_REQUEST, "INVALID_AMOUNT"),
                    LedgerError::InvalidUser(_) => (StatusCode::BAD_REQUEST, "INVALID_USER"),
                    LedgerError::QueueClosed => (StatusCode::SERVICE_UNAVAILABLE, "QUEUE_CLOSED"),
                    LedgerError::Persistence(StoreError::Timeout(_)) => {
                        (StatusCode::GATEWAY_TIMEOUT, "STORE_TIMEOUT")
                    }
                    LedgerError::Persistence(StoreError::DuplicateId(_)) => {
                        (StatusCode::CONFLICT, "DUPLICATE_TRANSACTION")
                    }
                    LedgerError::Persistence(StoreError::Overflow(_)) => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "BALANCE_OVERFLOW")
                    }
                    LedgerError::Persistence(StoreError::Unavailable(_)) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_ERROR")
                    }
                    LedgerError::NotApplicable(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "NOT_APPLICABLE")
                    }
                };
                (status, code, err.to_string())
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

async fn bounded<T>(
    limit: Duration,
    request: impl Future<Output = Result<T, LedgerError>>,
) -> Result<T, ApiError> {
    match tokio::time::timeout(limit, request).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ApiError::TimedOut),
    }
}

// === Application State ===

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

// === Handlers ===

/// POST /api/customers/{customerId}/transactions/deposits
async fn create_deposit(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Json(request): Json<DepositRequest>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    let deposit = bounded(CREATE_TIMEOUT, state.engine.deposit(customer_id, request.amount)).await?;
    Ok((StatusCode::CREATED, Json(deposit)))
}

/// POST /api/customers/{customerId}/transactions/purchase
async fn create_purchase(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Json(request): Json<PurchaseRequest>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    let purchase = bounded(
        CREATE_TIMEOUT,
        state
            .engine
            .purchase(customer_id, request.restaurant_id, request.amount),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(purchase)))
}

/// GET /api/balances/{userId}
async fn get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let user_id = UserId::from(user_id);
    let balance = bounded(READ_TIMEOUT, state.engine.get_balance(&user_id)).await?;
    Ok(Json(balance.into()))
}

/// GET /api/customers/{customerId}/transactions
async fn customer_transactions(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let customer_id = UserId::from(customer_id);
    let transactions = bounded(
        READ_TIMEOUT,
        state.engine.list_customer_transactions(&customer_id),
    )
    .await?;
    Ok(Json(transactions))
}

/// GET /api/restaurants/{restaurantId}/transactions
async fn restaurant_transactions(
    State(state): State<AppState>,
    Path(restaurant_id): Path<String>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let restaurant_id = UserId::from(restaurant_id);
    let transactions = bounded(
        READ_TIMEOUT,
        state.engine.list_restaurant_transactions(&restaurant_id),
    )
    .await?;
    Ok(Json(transactions))
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        method = %method,
        path,
        status_code = response.status().as_u16(),
        duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "http request"
    );
    response
}

// === Router ===

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route(
            "/api/customers/{customer_id}/transactions/deposits",
            post(create_deposit),
        )
        .route(
            "/api/customers/{customer_id}/transactions/purchase",
            post(create_purchase),
        )
        .route(
            "/api/customers/{customer_id}/transactions",
            get(customer_transactions),
        )
        .route(
            "/api/restaurants/{restaurant_id}/transactions",
            get(restaurant_transactions),
        )
        .route("/api/balances/{user_id}", get(get_balance))
        .layer(middleware::from_fn(log_requests))
        .with_state(AppState { engine })
}

/// Serves the API on `listener` until `shutdown` resolves. In-flight requests
/// are allowed to finish.
pub async fn serve(
    listener: TcpListener,
    engine: Arc<Engine>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn balance_response_hides_zero_commission() {
        let customer = BalanceResponse::from(Balance::new(UserId::from("c1"), dec!(60), dec!(0)));
        let json = serde_json::to_value(&customer).unwrap();
        assert_eq!(json["userId"], "c1");
        assert_eq!(json["amount"], "60");
        assert!(json.get("totalCommission").is_none());

        let restaurant =
            BalanceResponse::from(Balance::new(UserId::from("r1"), dec!(38.00), dec!(2.00)));
        let json = serde_json::to_value(&restaurant).unwrap();
        assert_eq!(json["totalCommission"], "2.00");
    }

    #[test]
    fn errors_map_to_status_codes() {
        let cases = [
            (ApiError::from(LedgerError::InvalidAmount), StatusCode::BAD_REQUEST),
            (
                ApiError::from(LedgerError::InvalidUser("customer id is empty")),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(LedgerError::Persistence(StoreError::Unavailable("down".into()))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::from(LedgerError::Persistence(StoreError::Timeout(
                    Duration::from_secs(30),
                ))),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                ApiError::from(LedgerError::Persistence(StoreError::Overflow(UserId::from("c1")))),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (ApiError::from(LedgerError::QueueClosed), StatusCode::SERVICE_UNAVAILABLE),
            (ApiError::TimedOut, StatusCode::GATEWAY_TIMEOUT),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
