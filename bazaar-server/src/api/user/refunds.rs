use axum::{Json, extract::State, http::StatusCode};
use bazaar_core::rate_limit::OperationType;
use bazaar_core::workflow::NewRefund;
use bazaar_sdk::objects::{CreateRefundRequest, RefundResponse};

use crate::api::extractors::Principal;
use crate::api::{ApiError, enforce_rate_limit};
use crate::state::AppState;

/// `POST /refunds`: ask for a refund. Nothing moves until an admin approves it.
pub(super) async fn request_refund(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<CreateRefundRequest>,
) -> Result<(StatusCode, Json<RefundResponse>), ApiError> {
    enforce_rate_limit(
        &state.limiter,
        OperationType::Refund,
        &principal.id.to_string(),
    )
    .await?;

    let refund = state
        .refunds
        .request_refund(
            principal.id,
            NewRefund {
                amount: body.amount,
                reason: body.reason,
                ref_id: body.ref_id,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(refund.to_response())))
}
