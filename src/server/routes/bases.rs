//! Knowledge base management endpoints

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::Result;
use crate::server::state::AppState;
use crate::storage::BaseInfo;

#[derive(Debug, Deserialize)]
pub struct CreateBaseRequest {
    pub name: String,
}

pub async fn list_bases(State(state): State<AppState>) -> Result<Json<Vec<BaseInfo>>> {
    Ok(Json(state.bases().list()?))
}

pub async fn create_base(
    State(state): State<AppState>,
    Json(request): Json<CreateBaseRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    state.bases().create(&request.name)?;
    tracing::info!(base = %request.name, "Created knowledge base");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "name": request.name, "created": true })),
    ))
}

pub async fn delete_base(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state.bases().delete(&name)?;
    tracing::info!(base = %name, "Deleted knowledge base");
    Ok(Json(json!({ "name": name, "deleted": true })))
}
