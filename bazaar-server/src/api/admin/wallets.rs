use axum::{
    Json,
    extract::{Path, Query, State},
};
use bazaar_core::ledger::{LedgerFilter, Page};
use bazaar_core::rate_limit::OperationType;
use bazaar_sdk::objects::{
    AdjustBalanceRequest, FreezeWalletRequest, LedgerEntryResponse, LedgerPageResponse,
    LedgerQuery, ReviewRequest, WalletResponse,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::api::extractors::{AdminPrincipal, RequestCtx};
use crate::api::{ApiError, enforce_rate_limit, ledger_page_response};
use crate::state::AppState;

fn timestamp(field: &str, unix: i64) -> Result<OffsetDateTime, ApiError> {
    OffsetDateTime::from_unix_timestamp(unix)
        .map_err(|_| ApiError::BadRequest(format!("{field} is not a valid unix timestamp")))
}

/// `POST /wallets/{wallet_id}/adjust`: signed manual correction.
pub async fn adjust_balance(
    State(state): State<AppState>,
    AdminPrincipal(admin_id): AdminPrincipal,
    RequestCtx(ctx): RequestCtx,
    Path(wallet_id): Path<Uuid>,
    Json(body): Json<AdjustBalanceRequest>,
) -> Result<Json<LedgerEntryResponse>, ApiError> {
    enforce_rate_limit(
        &state.limiter,
        OperationType::WalletAdjust,
        &admin_id.to_string(),
    )
    .await?;

    let entry = state
        .ledger
        .adjust_by_admin(wallet_id, body.amount, &body.reason, admin_id, &ctx)
        .await?;
    Ok(Json(entry.to_response(entry.balance_after)))
}

/// `POST /wallets/{wallet_id}/freeze`
pub async fn freeze_wallet(
    State(state): State<AppState>,
    AdminPrincipal(admin_id): AdminPrincipal,
    RequestCtx(ctx): RequestCtx,
    Path(wallet_id): Path<Uuid>,
    Json(body): Json<FreezeWalletRequest>,
) -> Result<Json<WalletResponse>, ApiError> {
    let expiry = body
        .expires_at
        .map(|unix| timestamp("expires_at", unix))
        .transpose()?;
    if expiry.is_some_and(|e| e <= OffsetDateTime::now_utc()) {
        return Err(ApiError::BadRequest(
            "expires_at must be in the future".to_string(),
        ));
    }

    let wallet = state
        .ledger
        .freeze(wallet_id, &body.reason, expiry, admin_id, &ctx)
        .await?;
    Ok(Json(wallet.to_response()))
}

/// `POST /wallets/{wallet_id}/unfreeze`
pub async fn unfreeze_wallet(
    State(state): State<AppState>,
    AdminPrincipal(admin_id): AdminPrincipal,
    RequestCtx(ctx): RequestCtx,
    Path(wallet_id): Path<Uuid>,
    Json(body): Json<ReviewRequest>,
) -> Result<Json<WalletResponse>, ApiError> {
    let wallet = state
        .ledger
        .unfreeze(wallet_id, &body.reason, admin_id, &ctx)
        .await?;
    Ok(Json(wallet.to_response()))
}

/// `GET /wallets/{wallet_id}/ledger`: newest first, with running balances.
pub async fn get_ledger(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Path(wallet_id): Path<Uuid>,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<LedgerPageResponse>, ApiError> {
    let query = query.normalized();
    let filter = LedgerFilter {
        kind: query.kind.map(Into::into),
        status: query.status.map(Into::into),
        from: query.from.map(|t| timestamp("from", t)).transpose()?,
        to: query.to.map(|t| timestamp("to", t)).transpose()?,
    };
    // normalized() keeps both values non-negative.
    let page = Page {
        limit: usize::try_from(query.limit).unwrap_or(1),
        offset: usize::try_from(query.offset).unwrap_or(0),
    };

    let ledger = state.ledger.get_ledger(wallet_id, &filter, page).await?;
    Ok(Json(ledger_page_response(ledger)))
}
