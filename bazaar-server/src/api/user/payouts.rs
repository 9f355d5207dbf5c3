use axum::{Json, extract::State, http::StatusCode};
use bazaar_core::rate_limit::OperationType;
use bazaar_core::workflow::NewPayout;
use bazaar_sdk::objects::{CreatePayoutRequest, PayoutResponse};

use crate::api::extractors::{Principal, RequestCtx};
use crate::api::{ApiError, enforce_rate_limit};
use crate::state::AppState;

/// `POST /payouts`: open a payout request and hold its amount.
pub(super) async fn request_payout(
    State(state): State<AppState>,
    principal: Principal,
    RequestCtx(ctx): RequestCtx,
    Json(body): Json<CreatePayoutRequest>,
) -> Result<(StatusCode, Json<PayoutResponse>), ApiError> {
    if body.method.trim().is_empty() {
        return Err(ApiError::BadRequest("method is required".to_string()));
    }
    enforce_rate_limit(
        &state.limiter,
        OperationType::PayoutRequest,
        &principal.id.to_string(),
    )
    .await?;

    let payout = state
        .payouts
        .request_payout(
            principal.id,
            NewPayout {
                amount: body.amount,
                method: body.method,
                bank_details: body.bank_details,
                fraud_score: body.fraud_score,
                trust_score: body.trust_score,
            },
            &ctx,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(payout.to_response())))
}
