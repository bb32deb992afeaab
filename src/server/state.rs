//! Application state shared across request handlers

use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::ingestion::IngestPipeline;
use crate::providers::{EmbeddingProvider, LlmProvider, OllamaProvider};
use crate::storage::BaseManager;

use super::jobs::JobQueue;

/// Shared application state. Cloning is cheap; everything lives behind one
/// `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    bases: BaseManager,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    pipeline: IngestPipeline,
    jobs: JobQueue,
    ready: RwLock<bool>,
}

impl AppState {
    /// Build the state with Ollama-backed providers.
    pub async fn new(config: Config) -> Result<Self> {
        let provider = OllamaProvider::new(&config.llm, config.embeddings.dimensions)?;
        let (embedder, llm) = provider.split();
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(embedder);
        let llm: Arc<dyn LlmProvider> = Arc::new(llm);
        tracing::info!(
            embed_model = %config.llm.embed_model,
            generate_model = %config.llm.generate_model,
            "Ollama providers initialized"
        );

        match embedder.health_check().await {
            Ok(true) => tracing::info!(base_url = %config.llm.base_url, "Ollama reachable"),
            _ => tracing::warn!(
                base_url = %config.llm.base_url,
                "Ollama is not reachable; ingestion and queries will fail until it is"
            ),
        }

        Self::with_providers(config, embedder, llm)
    }

    /// Build the state around caller-supplied providers: base manager,
    /// pipeline, and the job queue with its worker pool. Must be called
    /// inside a tokio runtime.
    pub fn with_providers(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        tracing::info!(data_dir = %config.storage.data_dir.display(), "Initializing application state");

        let bases = BaseManager::new(config.clone())?;
        let pipeline = IngestPipeline::new(&config, Arc::clone(&embedder));

        let worker_count = num_cpus::get().min(4);
        let (jobs, receiver) = JobQueue::new();
        tracing::info!(workers = worker_count, "Job queue initialized");

        let state = Self {
            inner: Arc::new(AppStateInner {
                config,
                bases,
                embedder,
                llm,
                pipeline,
                jobs,
                ready: RwLock::new(true),
            }),
        };

        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        for worker_id in 0..worker_count {
            let worker_state = state.clone();
            let receiver = Arc::clone(&receiver);
            tokio::spawn(async move {
                super::jobs::run_worker(worker_id, worker_state, receiver).await;
            });
        }

        Ok(state)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn bases(&self) -> &BaseManager {
        &self.inner.bases
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.inner.embedder
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.inner.llm
    }

    pub fn pipeline(&self) -> &IngestPipeline {
        &self.inner.pipeline
    }

    pub fn jobs(&self) -> &JobQueue {
        &self.inner.jobs
    }

    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read()
    }

    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }
}
