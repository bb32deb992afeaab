//! Job status endpoints

use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::jobs::JobProgress;
use crate::server::state::AppState;

pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobProgress>> {
    Json(state.jobs().list())
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let progress = state
        .jobs()
        .get(job_id)
        .ok_or(Error::JobNotFound(job_id))?;

    let percent = progress.percent_complete();
    let mut value = serde_json::to_value(&progress)?;
    if let Some(map) = value.as_object_mut() {
        map.insert("percent_complete".to_string(), json!(percent));
    }
    Ok(Json(value))
}
