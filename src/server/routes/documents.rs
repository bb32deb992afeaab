//! Document listing and deletion

use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::document::Document;

pub async fn list_documents(
    State(state): State<AppState>,
    Path(base_name): Path<String>,
) -> Result<Json<Vec<Document>>> {
    let base = state.bases().get(&base_name)?;
    Ok(Json(base.db.list_documents(&base_name)?))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path((base_name, id)): Path<(String, Uuid)>,
) -> Result<Json<Document>> {
    let base = state.bases().get(&base_name)?;
    let doc = base
        .db
        .get_document(&base_name, id)?
        .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;
    Ok(Json(doc))
}

/// Remove a document: its vectors, database rows, and stored file
pub async fn delete_document(
    State(state): State<AppState>,
    Path((base_name, id)): Path<(String, Uuid)>,
) -> Result<Json<serde_json::Value>> {
    let base = state.bases().get(&base_name)?;
    let doc = base
        .db
        .get_document(&base_name, id)?
        .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;

    let removed_vectors = {
        let mut index = base.index.lock();
        let removed = index.remove_document(id);
        index.save()?;
        removed
    };
    base.db.delete_document(id)?;

    // Stored file may already be gone; that is fine
    let file_path = state.config().documents_dir(&base_name).join(&doc.filename);
    if let Err(e) = tokio::fs::remove_file(&file_path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %file_path.display(), error = %e, "Failed to remove stored file");
        }
    }

    tracing::info!(
        base = %base_name,
        filename = %doc.filename,
        vectors = removed_vectors,
        "Deleted document"
    );
    Ok(Json(json!({
        "id": id,
        "filename": doc.filename,
        "deleted": true,
        "vectors_removed": removed_vectors,
    })))
}
