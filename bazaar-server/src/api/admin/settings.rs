use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::api::ApiError;
use crate::api::extractors::{AdminPrincipal, RequestCtx};
use crate::state::AppState;

const MAX_KEY_LEN: usize = 128;

/// `PUT /settings/{key}`: broadcast a new value on `settings.update`.
///
/// The body is the raw JSON value. Storing the setting is the caller's
/// concern; this endpoint only announces and audits the change.
pub async fn update_setting(
    State(state): State<AppState>,
    AdminPrincipal(admin_id): AdminPrincipal,
    RequestCtx(ctx): RequestCtx,
    Path(key): Path<String>,
    Json(value): Json<serde_json::Value>,
) -> Result<StatusCode, ApiError> {
    let key = key.trim();
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(ApiError::BadRequest(format!(
            "setting key must be 1 to {MAX_KEY_LEN} characters"
        )));
    }

    state
        .moderation
        .update_setting(key, value, admin_id, &ctx)
        .await?;
    Ok(StatusCode::ACCEPTED)
}
