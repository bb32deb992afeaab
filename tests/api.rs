//! End-to-end API tests with stub providers. No Ollama required.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use ragbase::config::Config;
use ragbase::error::Result;
use ragbase::providers::{EmbeddingProvider, LlmProvider};
use ragbase::server::{build_router, AppState};
use ragbase::types::response::Citation;

const DIMS: usize = 8;

struct StubEmbedder;

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![1.0f32; DIMS];
        for (i, b) in text.bytes().enumerate() {
            v[i % DIMS] += b as f32 / 255.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        Ok(v.into_iter().map(|x| x / norm).collect())
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "stub-embedder"
    }
}

struct StubLlm;

#[async_trait]
impl LlmProvider for StubLlm {
    async fn generate_answer(
        &self,
        _question: &str,
        _context: &str,
        citations: &[Citation],
    ) -> Result<String> {
        let marker = citations
            .first()
            .map(|c| c.format_inline())
            .unwrap_or_default();
        Ok(format!("The documents say so. {}", marker))
    }

    async fn generate_with_history(
        &self,
        question: &str,
        context: &str,
        citations: &[Citation],
        _history: &[(String, String)],
    ) -> Result<String> {
        self.generate_answer(question, context, citations).await
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "stub-llm"
    }

    fn model(&self) -> &str {
        "stub"
    }
}

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = dir.path().to_path_buf();
    config.embeddings.dimensions = DIMS;
    config
}

async fn test_app() -> (Router, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let state =
        AppState::with_providers(config.clone(), Arc::new(StubEmbedder), Arc::new(StubLlm))
            .unwrap();
    (build_router(&config, state), dir)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::delete(uri).body(Body::empty()).unwrap()
}

fn upload(uri: &str, filename: &str, data: &[u8]) -> Request<Body> {
    let boundary = "ragbase-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    Request::post(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap()
}

const SAMPLE_TEXT: &str = "The solar arrays on the station generate roughly one hundred \
    kilowatts of power. Each array wing is about thirty-five meters long and rotates to \
    track the sun across every orbit. Excess power charges the nickel-hydrogen batteries \
    that carry the station through orbital night.";

#[tokio::test]
async fn health_and_info() {
    let (app, _dir) = test_app().await;

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _) = send(&app, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get("/api/info")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "ragbase");
}

#[tokio::test]
async fn base_lifecycle() {
    let (app, _dir) = test_app().await;

    let (status, body) = send(
        &app,
        post_json("/api/bases", serde_json::json!({ "name": "research" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "research");

    let (status, _) = send(
        &app,
        post_json("/api/bases", serde_json::json!({ "name": "research" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        post_json("/api/bases", serde_json::json!({ "name": "bad name!" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, get("/api/bases")).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"default"));
    assert!(names.contains(&"research"));

    // The default base cannot be deleted
    let (status, _) = send(&app, delete("/api/bases/default")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, delete("/api/bases/research")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, delete("/api/bases/research")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_and_query() {
    let (app, _dir) = test_app().await;

    let (status, report) = send(
        &app,
        upload(
            "/api/bases/default/ingest",
            "station.txt",
            SAMPLE_TEXT.as_bytes(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["documents"].as_array().unwrap().len(), 1);
    assert!(report["total_chunks_created"].as_u64().unwrap() > 0);

    // Retrieval-only search
    let (status, body) = send(
        &app,
        post_json(
            "/api/query",
            serde_json::json!({
                "question": "How much power do the solar arrays generate?",
                "mode": "search",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let hits = body["hits"].as_array().unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0]["filename"], "station.txt");

    // Grounded answer with citations
    let (status, body) = send(
        &app,
        post_json(
            "/api/query",
            serde_json::json!({
                "question": "How much power do the solar arrays generate?",
                "mode": "qa",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["answer"].as_str().unwrap().contains("[Source:"));
    let citations = body["citations"].as_array().unwrap();
    assert!(!citations.is_empty());
    assert_eq!(citations[0]["filename"], "station.txt");

    // The QA turn landed in chat history
    let (status, history) = send(&app, get("/api/bases/default/history")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);

    let (status, body) = send(&app, delete("/api/bases/default/history")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], 1);
}

#[tokio::test]
async fn rejected_uploads_return_typed_errors_and_leave_no_file() {
    let (app, dir) = test_app().await;
    let docs_dir = dir.path().join("bases").join("default").join("documents");

    // Unsupported extension is a 400 and never lands on disk
    let (status, body) = send(
        &app,
        upload("/api/bases/default/ingest", "binary.exe", b"MZ\x90\x00"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "unsupported_type");
    assert!(!docs_dir.join("binary.exe").exists());

    // A supported extension with unparseable content is cleaned up again
    let (status, body) = send(
        &app,
        upload("/api/bases/default/ingest", "broken.pdf", b"not a pdf at all"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "parse_error");
    assert!(!docs_dir.join("broken.pdf").exists());

    let (_, docs) = send(&app, get("/api/bases/default/documents")).await;
    assert!(docs.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn reupload_unchanged_file_is_skipped() {
    let (app, _dir) = test_app().await;

    let (status, _) = send(
        &app,
        upload(
            "/api/bases/default/ingest",
            "station.txt",
            SAMPLE_TEXT.as_bytes(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, report) = send(
        &app,
        upload(
            "/api/bases/default/ingest",
            "station.txt",
            SAMPLE_TEXT.as_bytes(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["files_skipped"], 1);
    assert_eq!(report["total_chunks_created"], 0);
}

#[tokio::test]
async fn reupload_modified_file_replaces_the_document() {
    let (app, _dir) = test_app().await;

    let (status, report) = send(
        &app,
        upload(
            "/api/bases/default/ingest",
            "station.txt",
            SAMPLE_TEXT.as_bytes(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let first_id = report["documents"][0]["id"].as_str().unwrap().to_string();

    let revised = format!("{} The truss segments were assembled over forty flights.", SAMPLE_TEXT);
    let (status, report) = send(
        &app,
        upload("/api/bases/default/ingest", "station.txt", revised.as_bytes()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(report["errors"].as_array().map_or(true, |e| e.is_empty()));

    let (status, docs) = send(&app, get("/api/bases/default/documents")).await;
    assert_eq!(status, StatusCode::OK);
    let docs = docs.as_array().unwrap();
    assert_eq!(docs.len(), 1);
    assert_ne!(docs[0]["id"].as_str().unwrap(), first_id);

    let (status, body) = send(
        &app,
        post_json(
            "/api/query",
            serde_json::json!({
                "question": "How many flights assembled the truss segments?",
                "mode": "search",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["hits"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn async_upload_runs_as_job() {
    let (app, _dir) = test_app().await;

    let (status, body) = send(
        &app,
        upload(
            "/api/bases/default/ingest/async",
            "station.txt",
            SAMPLE_TEXT.as_bytes(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let mut status_str = String::new();
    for _ in 0..100 {
        let (status, job) = send(&app, get(&format!("/api/jobs/{}", job_id))).await;
        assert_eq!(status, StatusCode::OK);
        status_str = job["status"].as_str().unwrap().to_string();
        if status_str == "complete" || status_str == "failed" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(status_str, "complete");

    let (status, docs) = send(&app, get("/api/bases/default/documents")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(docs.as_array().unwrap().len(), 1);

    let (status, jobs) = send(&app, get("/api/jobs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(jobs.as_array().unwrap().len(), 1);

    let (status, _) = send(
        &app,
        get(&format!("/api/jobs/{}", uuid::Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_document_removes_it_from_search() {
    let (app, _dir) = test_app().await;

    let (_, report) = send(
        &app,
        upload(
            "/api/bases/default/ingest",
            "station.txt",
            SAMPLE_TEXT.as_bytes(),
        ),
    )
    .await;
    let doc_id = report["documents"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        delete(&format!("/api/bases/default/documents/{}", doc_id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);
    assert!(body["vectors_removed"].as_u64().unwrap() > 0);

    let (status, docs) = send(&app, get("/api/bases/default/documents")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(docs.as_array().unwrap().is_empty());

    let (status, body) = send(
        &app,
        post_json(
            "/api/query",
            serde_json::json!({
                "question": "How much power do the solar arrays generate?",
                "mode": "search",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["hits"].as_array().unwrap().is_empty());

    // Deleting again is a 404
    let (status, _) = send(
        &app,
        delete(&format!("/api/bases/default/documents/{}", doc_id)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn query_against_missing_base_is_404() {
    let (app, _dir) = test_app().await;

    let (status, _) = send(
        &app,
        post_json(
            "/api/query",
            serde_json::json!({
                "question": "anything",
                "base": "nope",
                "mode": "qa",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
