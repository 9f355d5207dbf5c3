use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use bazaar_core::rate_limit::OperationType;
use bazaar_core::workflow::IssueRefund;
use bazaar_sdk::objects::{IssueRefundRequest, PostingResponse, RefundResponse, ReviewRequest};
use uuid::Uuid;

use crate::api::extractors::{AdminPrincipal, IdempotencyKey, RequestCtx};
use crate::api::{ApiError, enforce_rate_limit, posting_response};
use crate::state::AppState;

/// `POST /refunds`: credit a refund to a user's wallet.
///
/// Returns `201 Created` for a new entry and `200 OK` with `replayed: true`
/// when the `Idempotency-Key` was already applied.
pub async fn issue_refund(
    State(state): State<AppState>,
    AdminPrincipal(admin_id): AdminPrincipal,
    RequestCtx(ctx): RequestCtx,
    IdempotencyKey(key): IdempotencyKey,
    Json(body): Json<IssueRefundRequest>,
) -> Result<(StatusCode, Json<PostingResponse>), ApiError> {
    enforce_rate_limit(&state.limiter, OperationType::Refund, &admin_id.to_string()).await?;

    let refund = IssueRefund {
        user_id: body.user_id,
        amount: body.amount,
        reason: body.reason,
        ref_id: body.ref_id,
    };
    let posted = state
        .refunds
        .issue_refund(refund, admin_id, key.as_deref(), &ctx)
        .await?;

    let status = if posted.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(posting_response(posted))))
}

/// `POST /refunds/{refund_id}/approve`
pub async fn approve_refund(
    State(state): State<AppState>,
    AdminPrincipal(admin_id): AdminPrincipal,
    RequestCtx(ctx): RequestCtx,
    Path(refund_id): Path<Uuid>,
    Json(body): Json<ReviewRequest>,
) -> Result<Json<RefundResponse>, ApiError> {
    enforce_rate_limit(&state.limiter, OperationType::Refund, &admin_id.to_string()).await?;

    let refund = state
        .refunds
        .approve_refund(refund_id, admin_id, &body.reason, &ctx)
        .await?;
    Ok(Json(refund.to_response()))
}

/// `POST /refunds/{refund_id}/reject`
pub async fn reject_refund(
    State(state): State<AppState>,
    AdminPrincipal(admin_id): AdminPrincipal,
    RequestCtx(ctx): RequestCtx,
    Path(refund_id): Path<Uuid>,
    Json(body): Json<ReviewRequest>,
) -> Result<Json<RefundResponse>, ApiError> {
    let refund = state
        .refunds
        .reject_refund(refund_id, admin_id, &body.reason, &ctx)
        .await?;
    Ok(Json(refund.to_response()))
}
