use axum::{
    Json,
    extract::{Path, State},
};
use bazaar_sdk::objects::JobRunResponse;

use crate::api::ApiError;
use crate::api::extractors::AdminPrincipal;
use crate::state::AppState;

/// `GET /jobs`: names accepted by `POST /jobs/{name}/run`.
pub async fn list_jobs(State(state): State<AppState>, _admin: AdminPrincipal) -> Json<Vec<String>> {
    Json(
        state
            .jobs
            .job_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    )
}

/// `POST /jobs/{name}/run`: run a job now and wait for it.
///
/// If the job is already running this returns `skipped_in_flight` without
/// starting a second instance.
pub async fn run_job(
    State(state): State<AppState>,
    AdminPrincipal(admin_id): AdminPrincipal,
    Path(name): Path<String>,
) -> Result<Json<JobRunResponse>, ApiError> {
    tracing::info!(job = %name, %admin_id, "Manual job run requested");
    let outcome = state
        .jobs
        .run_now(&name)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("no job named {name}")))?;

    Ok(Json(JobRunResponse {
        job: name,
        outcome: outcome.into(),
    }))
}
