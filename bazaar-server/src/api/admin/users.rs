use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use bazaar_sdk::objects::BlockUserRequest;
use uuid::Uuid;

use crate::api::ApiError;
use crate::api::extractors::{AdminPrincipal, RequestCtx};
use crate::state::AppState;

/// `POST /users/{user_id}/block`: freeze the wallet and announce the block.
pub async fn block_user(
    State(state): State<AppState>,
    AdminPrincipal(admin_id): AdminPrincipal,
    RequestCtx(ctx): RequestCtx,
    Path(user_id): Path<Uuid>,
    Json(body): Json<BlockUserRequest>,
) -> Result<StatusCode, ApiError> {
    if user_id == admin_id {
        return Err(ApiError::BadRequest("admins cannot block themselves".to_string()));
    }
    state
        .moderation
        .block_user(user_id, admin_id, &body.reason, &ctx)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
