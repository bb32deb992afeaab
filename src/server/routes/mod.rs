//! API route handlers

mod bases;
mod documents;
mod history;
mod ingest;
mod jobs;
mod query;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;

use super::state::AppState;

pub(in crate::server) use ingest::remove_stored_file;

pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        .route("/info", get(api_info))
        .route("/bases", get(bases::list_bases).post(bases::create_base))
        .route("/bases/:name", delete(bases::delete_base))
        .route(
            "/bases/:name/ingest",
            post(ingest::ingest_files).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route(
            "/bases/:name/ingest/async",
            post(ingest::ingest_files_async).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/bases/:name/scan", post(ingest::scan_base))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/:id", get(jobs::get_job))
        .route("/query", post(query::query))
        .route("/bases/:name/documents", get(documents::list_documents))
        .route(
            "/bases/:name/documents/:id",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route(
            "/bases/:name/history",
            get(history::get_history).delete(history::clear_history),
        )
}

async fn api_info() -> Json<serde_json::Value> {
    Json(json!({
        "service": "ragbase",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "bases": "GET/POST /api/bases, DELETE /api/bases/:name",
            "ingest": "POST /api/bases/:name/ingest (multipart), POST /api/bases/:name/ingest/async, POST /api/bases/:name/scan",
            "jobs": "GET /api/jobs, GET /api/jobs/:id",
            "query": "POST /api/query",
            "documents": "GET /api/bases/:name/documents, GET/DELETE /api/bases/:name/documents/:id",
            "history": "GET/DELETE /api/bases/:name/history",
        },
    }))
}
