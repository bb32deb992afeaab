//! Chat history endpoints

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::Result;
use crate::server::state::AppState;
use crate::storage::ChatEntry;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(base_name): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<ChatEntry>>> {
    let base = state.bases().get(&base_name)?;
    Ok(Json(base.db.recent_history(params.limit)?))
}

pub async fn clear_history(
    State(state): State<AppState>,
    Path(base_name): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let base = state.bases().get(&base_name)?;
    let cleared = base.db.clear_history()?;
    tracing::info!(base = %base_name, cleared, "Cleared chat history");
    Ok(Json(json!({ "base": base_name, "cleared": cleared })))
}
