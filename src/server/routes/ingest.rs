//! Ingestion endpoints: multipart upload (sync and async) and folder scan

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::ingestion::IngestOutcome;
use crate::types::document::FileType;
use crate::server::jobs::{FileData, JobKind};
use crate::server::state::AppState;
use crate::types::response::{IngestFileError, IngestReport};

/// Upload files and wait for them to be indexed
pub async fn ingest_files(
    State(state): State<AppState>,
    Path(base_name): Path<String>,
    multipart: Multipart,
) -> Result<Json<IngestReport>> {
    let base = state.bases().get(&base_name)?;
    let files = collect_files(&state, &base_name, multipart).await?;
    if files.is_empty() {
        return Err(Error::Config("No files in upload".to_string()));
    }

    let started = Instant::now();
    let mut report = IngestReport::new(&base_name);
    let mut first_error: Option<Error> = None;

    for file in files {
        match state
            .pipeline()
            .ingest_file(&base, &file.filename, &file.data, None)
            .await
        {
            Ok(IngestOutcome::Indexed(summary)) => {
                report.total_chunks_created += summary.total_chunks;
                report.documents.push(summary);
            }
            Ok(IngestOutcome::Skipped(summary)) => {
                report.files_skipped += 1;
                report.documents.push(summary);
            }
            Err(e) => {
                tracing::warn!(base = %base_name, filename = %file.filename, error = %e, "Upload failed");
                remove_stored_file(&state, &base_name, &file.filename).await;
                report.errors.push(IngestFileError {
                    filename: file.filename,
                    error: e.to_string(),
                });
                first_error.get_or_insert(e);
            }
        }
    }

    // A wholly failed upload surfaces the typed error; partial success
    // returns the report with per-file errors.
    if report.documents.is_empty() {
        if let Some(e) = first_error {
            return Err(e);
        }
    }

    report.processing_time_ms = started.elapsed().as_millis() as u64;
    Ok(Json(report))
}

/// Upload files and index them in the background; returns a job id to poll
pub async fn ingest_files_async(
    State(state): State<AppState>,
    Path(base_name): Path<String>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    // Reject a missing base before accepting the job
    state.bases().get(&base_name)?;
    let files = collect_files(&state, &base_name, multipart).await?;
    if files.is_empty() {
        return Err(Error::Config("No files in upload".to_string()));
    }

    let count = files.len();
    let job_id = state
        .jobs()
        .submit(base_name.clone(), JobKind::Upload(files))
        .await;
    tracing::info!(base = %base_name, %job_id, files = count, "Queued upload job");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "job_id": job_id, "base": base_name, "files": count })),
    ))
}

/// Re-scan the base's documents folder in the background
pub async fn scan_base(
    State(state): State<AppState>,
    Path(base_name): Path<String>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    state.bases().get(&base_name)?;

    let job_id = state.jobs().submit(base_name.clone(), JobKind::Scan).await;
    tracing::info!(base = %base_name, %job_id, "Queued folder scan job");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "job_id": job_id, "base": base_name })),
    ))
}

/// Read every file field from the multipart body and persist each into the
/// base's documents folder so later scans see it.
async fn collect_files(
    state: &AppState,
    base_name: &str,
    mut multipart: Multipart,
) -> Result<Vec<FileData>> {
    let documents_dir = state.config().documents_dir(base_name);
    tokio::fs::create_dir_all(&documents_dir).await?;

    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Config(format!("Invalid multipart body: {}", e)))?
    {
        let Some(raw_name) = field.file_name().map(|n| n.to_string()) else {
            continue;
        };
        // Strip any path components a client might send
        let filename = std::path::Path::new(&raw_name)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Config(format!("Invalid filename: {}", raw_name)))?
            .to_string();

        let data = field
            .bytes()
            .await
            .map_err(|e| Error::Config(format!("Failed to read upload {}: {}", filename, e)))?
            .to_vec();
        if data.is_empty() {
            return Err(Error::file_parse(&filename, "Uploaded file is empty"));
        }

        // Only content the pipeline can handle lands in documents/, so
        // later folder scans never trip over a rejected upload
        if FileType::from_filename(&filename).is_supported() {
            tokio::fs::write(documents_dir.join(&filename), &data).await?;
        }
        files.push(FileData { filename, data });
    }

    Ok(files)
}

/// Best-effort removal of a stored upload that failed to ingest
pub(in crate::server) async fn remove_stored_file(state: &AppState, base: &str, filename: &str) {
    let path = state.config().documents_dir(base).join(filename);
    if let Err(e) = tokio::fs::remove_file(&path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove rejected upload");
        }
    }
}
