use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use bazaar_core::entities::PayoutStatus;
use bazaar_core::rate_limit::OperationType;
use bazaar_sdk::objects::{PayoutResponse, ReviewRequest};
use uuid::Uuid;

use crate::api::extractors::{AdminPrincipal, RequestCtx};
use crate::api::{ApiError, enforce_rate_limit};
use crate::state::AppState;

/// `GET /payouts/{payout_id}`
pub async fn get_payout(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Path(payout_id): Path<Uuid>,
) -> Result<Json<PayoutResponse>, ApiError> {
    let payout = state.payouts.payout(payout_id).await?;
    Ok(Json(payout.to_response()))
}

/// `POST /payouts/{payout_id}/approve`: approve, debit and execute a payout.
///
/// Answers `202 Accepted` when the gateway timed out or was unavailable:
/// the payout is still `approved` and reconciliation settles it.
pub async fn approve_payout(
    State(state): State<AppState>,
    AdminPrincipal(admin_id): AdminPrincipal,
    RequestCtx(ctx): RequestCtx,
    Path(payout_id): Path<Uuid>,
    Json(body): Json<ReviewRequest>,
) -> Result<(StatusCode, Json<PayoutResponse>), ApiError> {
    enforce_rate_limit(
        &state.limiter,
        OperationType::PayoutReview,
        &admin_id.to_string(),
    )
    .await?;

    let payout = state
        .payouts
        .approve_payout(payout_id, admin_id, &body.reason, &ctx)
        .await?;
    let status = if payout.status == PayoutStatus::Approved {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(payout.to_response())))
}

/// `POST /payouts/{payout_id}/reject`: reject and release the hold.
pub async fn reject_payout(
    State(state): State<AppState>,
    AdminPrincipal(admin_id): AdminPrincipal,
    RequestCtx(ctx): RequestCtx,
    Path(payout_id): Path<Uuid>,
    Json(body): Json<ReviewRequest>,
) -> Result<Json<PayoutResponse>, ApiError> {
    enforce_rate_limit(
        &state.limiter,
        OperationType::PayoutReview,
        &admin_id.to_string(),
    )
    .await?;

    let payout = state
        .payouts
        .reject_payout(payout_id, admin_id, &body.reason, &ctx)
        .await?;
    Ok(Json(payout.to_response()))
}
