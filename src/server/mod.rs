//! HTTP server
//!
//! axum server exposing base management, ingestion, and query endpoints
//! under `/api`, plus `/health` and `/ready` probes at the root.

pub mod jobs;
pub mod routes;
pub mod state;

use axum::{routing::get, Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::Result;

pub use self::state::AppState;

pub struct RagServer {
    config: Config,
    state: AppState,
}

impl RagServer {
    pub async fn new(config: Config) -> Result<Self> {
        let state = AppState::new(config.clone()).await?;
        Ok(Self { config, state })
    }

    pub async fn start(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!(%addr, "Server listening");

        let router = build_router(&self.config, self.state);
        axum::serve(listener, router)
            .await
            .map_err(|e| crate::error::Error::internal(format!("Server error: {}", e)))?;
        Ok(())
    }
}

/// Assemble the full router for a configured state
pub fn build_router(config: &Config, state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", routes::api_routes(config.server.max_upload_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if config.server.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "ragbase",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn readiness_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> (axum::http::StatusCode, Json<serde_json::Value>) {
    if state.is_ready() {
        (
            axum::http::StatusCode::OK,
            Json(json!({ "ready": true })),
        )
    } else {
        (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "ready": false })),
        )
    }
}
