use axum::{
    Json,
    extract::{Path, State},
};
use bazaar_core::rate_limit::OperationType;
use bazaar_sdk::objects::{ListingResponse, ReviewRequest};
use uuid::Uuid;

use crate::api::extractors::{AdminPrincipal, RequestCtx};
use crate::api::{ApiError, enforce_rate_limit};
use crate::state::AppState;

/// `POST /listings/{listing_id}/approve`: activate for the configured lifetime.
pub async fn approve_listing(
    State(state): State<AppState>,
    AdminPrincipal(admin_id): AdminPrincipal,
    RequestCtx(ctx): RequestCtx,
    Path(listing_id): Path<Uuid>,
    Json(body): Json<ReviewRequest>,
) -> Result<Json<ListingResponse>, ApiError> {
    enforce_rate_limit(
        &state.limiter,
        OperationType::ListingMutation,
        &admin_id.to_string(),
    )
    .await?;

    let listing = state
        .moderation
        .approve_listing(listing_id, admin_id, &body.reason, &ctx)
        .await?;
    Ok(Json(listing.to_response()))
}

/// `POST /listings/{listing_id}/reject`: the seller is notified with the reason.
pub async fn reject_listing(
    State(state): State<AppState>,
    AdminPrincipal(admin_id): AdminPrincipal,
    RequestCtx(ctx): RequestCtx,
    Path(listing_id): Path<Uuid>,
    Json(body): Json<ReviewRequest>,
) -> Result<Json<ListingResponse>, ApiError> {
    enforce_rate_limit(
        &state.limiter,
        OperationType::ListingMutation,
        &admin_id.to_string(),
    )
    .await?;

    let listing = state
        .moderation
        .reject_listing(listing_id, admin_id, &body.reason, &ctx)
        .await?;
    Ok(Json(listing.to_response()))
}
