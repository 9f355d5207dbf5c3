//! HTTP API.
//!
//! - `/admin/...`  – moderation and money operations, admin role required
//! - `/wallet`, `/payouts`, `/refunds`, `/listings/...` – the caller's own resources
//! - `/live/{channel}` – WebSocket stream of delivered outbox events

use axum::{
    Json, Router,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use bazaar_core::entities::LedgerEntry;
use bazaar_core::error::{LedgerError, StoreError};
use bazaar_core::ledger::{LedgerPage, Posted};
use bazaar_core::rate_limit::{OperationType, RateLimiter};
use bazaar_sdk::objects::{ErrorResponse, LedgerPageResponse, PostingResponse};
use time::OffsetDateTime;

use crate::state::AppState;

pub mod extractors;

mod admin;
mod live;
mod user;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/admin", admin::router())
        .merge(user::router())
        .route("/live/{channel}", get(live::live_stream))
}

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

/// Errors returned by every API handler.
#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    RateLimited {
        operation: OperationType,
        reset_at: OffsetDateTime,
    },
    Unauthenticated,
    AdminRequired,
    BadRequest(String),
    NotFound(String),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Ledger(err) => match err {
                LedgerError::InsufficientFunds { .. } => {
                    (StatusCode::PAYMENT_REQUIRED, "insufficient_funds")
                }
                LedgerError::WalletFrozen(_) => (StatusCode::LOCKED, "wallet_frozen"),
                LedgerError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                LedgerError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "invalid_amount"),
                LedgerError::OutOfRange { .. } => (StatusCode::BAD_REQUEST, "out_of_range"),
                LedgerError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, "invalid_transition")
                }
                LedgerError::IdempotencyKeyRequired => {
                    (StatusCode::BAD_REQUEST, "idempotency_key_required")
                }
                LedgerError::Forbidden { .. } => (StatusCode::FORBIDDEN, "forbidden"),
                LedgerError::IdempotencyKeyReused { .. } => {
                    (StatusCode::CONFLICT, "idempotency_key_reused")
                }
                LedgerError::TransientStore(StoreError::Conflict(_)) => {
                    (StatusCode::CONFLICT, "conflict")
                }
                LedgerError::TransientStore(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
                }
            },
            ApiError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            ApiError::AdminRequired => (StatusCode::FORBIDDEN, "admin_required"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        }
    }

    fn message(&self) -> String {
        match self {
            // Store failures carry driver detail that stays in the logs.
            ApiError::Ledger(LedgerError::TransientStore(StoreError::Database(_))) => {
                "storage temporarily unavailable, retry later".to_string()
            }
            ApiError::Ledger(err) => err.to_string(),
            ApiError::RateLimited { operation, .. } => {
                format!("too many {operation} requests")
            }
            ApiError::Unauthenticated => "missing or invalid principal".to_string(),
            ApiError::AdminRequired => "admin role required".to_string(),
            ApiError::BadRequest(message) | ApiError::NotFound(message) => message.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = ?self, "API request failed");
        }

        let reset_at = match &self {
            ApiError::RateLimited { reset_at, .. } => Some(*reset_at),
            _ => None,
        };
        let body = ErrorResponse {
            error: code.to_string(),
            message: self.message(),
            reset_at: reset_at.map(OffsetDateTime::unix_timestamp),
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(reset_at) = reset_at {
            let wait = (reset_at - OffsetDateTime::now_utc()).whole_seconds().max(1);
            if let Ok(value) = HeaderValue::from_str(&wait.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Count one call of `op` by `identifier` and refuse it when over the limit.
pub(crate) async fn enforce_rate_limit(
    limiter: &RateLimiter,
    op: OperationType,
    identifier: &str,
) -> Result<(), ApiError> {
    let decision = limiter.check(op, identifier).await;
    if decision.allowed {
        Ok(())
    } else {
        tracing::info!(operation = %op, identifier, "Rate limit exceeded");
        Err(ApiError::RateLimited {
            operation: op,
            reset_at: decision.reset_at,
        })
    }
}

pub(crate) fn posting_response(posted: Posted<LedgerEntry>) -> PostingResponse {
    PostingResponse {
        entry: posted.value.to_response(posted.value.balance_after),
        replayed: posted.replayed,
    }
}

pub(crate) fn ledger_page_response(page: LedgerPage) -> LedgerPageResponse {
    LedgerPageResponse {
        wallet: page.wallet.to_response(),
        entries: page
            .entries
            .iter()
            .map(|(entry, running)| entry.to_response(*running))
            .collect(),
        total: page.total as u64,
        consistent: page.consistent,
    }
}
