use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use bazaar_core::rate_limit::OperationType;
use bazaar_sdk::objects::{ListingResponse, RenewListingRequest, SubmitListingRequest};
use uuid::Uuid;

use crate::api::extractors::{Principal, RequestCtx};
use crate::api::{ApiError, enforce_rate_limit};
use crate::state::AppState;

const MAX_TITLE_LEN: usize = 200;

/// `POST /listings`: submit a listing; it stays hidden until approved.
pub(super) async fn submit_listing(
    State(state): State<AppState>,
    principal: Principal,
    RequestCtx(ctx): RequestCtx,
    Json(body): Json<SubmitListingRequest>,
) -> Result<(StatusCode, Json<ListingResponse>), ApiError> {
    let title = body.title.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
        return Err(ApiError::BadRequest(format!(
            "title must be 1 to {MAX_TITLE_LEN} characters"
        )));
    }
    enforce_rate_limit(
        &state.limiter,
        OperationType::ListingMutation,
        &principal.id.to_string(),
    )
    .await?;

    let listing = state
        .moderation
        .submit_listing(principal.id, title, &ctx)
        .await?;
    Ok((StatusCode::CREATED, Json(listing.to_response())))
}

/// `POST /listings/{listing_id}/renew`: seller only.
pub(super) async fn renew_listing(
    State(state): State<AppState>,
    principal: Principal,
    RequestCtx(ctx): RequestCtx,
    Path(listing_id): Path<Uuid>,
    Json(body): Json<RenewListingRequest>,
) -> Result<Json<ListingResponse>, ApiError> {
    enforce_rate_limit(
        &state.limiter,
        OperationType::ListingMutation,
        &principal.id.to_string(),
    )
    .await?;

    let listing = state
        .moderation
        .renew_listing(listing_id, principal.id, body.extend_days, &ctx)
        .await?;
    Ok(Json(listing.to_response()))
}
