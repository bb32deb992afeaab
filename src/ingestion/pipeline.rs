//! Ingestion pipeline: parse, dedup, chunk, embed, index
//!
//! One pipeline instance is shared by the upload and scan routes. Progress
//! events are sent over an optional channel so background jobs can report
//! per-file status without the pipeline knowing about the job registry.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::providers::EmbeddingProvider;
use crate::storage::{BaseHandle, FileStatus};
use crate::types::response::{DocumentSummary, IngestFileError, IngestReport};
use crate::types::{Document, FileType};

use super::chunker::TextChunker;
use super::parser::FileParser;

/// Stage of the pipeline a file is currently in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Parsing,
    Chunking,
    Embedding,
    Indexing,
    Complete,
    Skipped,
    Failed,
}

/// Progress update for one file moving through the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub filename: String,
    pub stage: ProgressStage,
    /// Units processed in this stage (chunks for embedding, files for scans)
    pub current: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    fn stage(filename: &str, stage: ProgressStage) -> Self {
        Self {
            filename: filename.to_string(),
            stage,
            current: 0,
            total: 0,
            error: None,
        }
    }
}

/// Outcome of ingesting a single file
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// Document was parsed, chunked, embedded, and indexed
    Indexed(DocumentSummary),
    /// Content hash matched the stored document; nothing to do
    Skipped(DocumentSummary),
}

impl IngestOutcome {
    pub fn summary(&self) -> &DocumentSummary {
        match self {
            Self::Indexed(s) | Self::Skipped(s) => s,
        }
    }
}

/// Shared ingestion pipeline
pub struct IngestPipeline {
    chunker: TextChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl IngestPipeline {
    /// Build the pipeline from configuration
    pub fn new(config: &Config, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            chunker: TextChunker::from_config(&config.chunking),
            embedder,
            batch_size: config.embeddings.batch_size.max(1),
        }
    }

    fn notify(progress: Option<&UnboundedSender<ProgressEvent>>, event: ProgressEvent) {
        if let Some(tx) = progress {
            // Receiver may have been dropped; progress is best effort
            let _ = tx.send(event);
        }
    }

    /// Ingest one file's bytes into a base.
    ///
    /// Unchanged content (same filename, same hash) is skipped. Modified
    /// content replaces the stored document, its pages, chunks, and vectors.
    pub async fn ingest_file(
        &self,
        base: &BaseHandle,
        filename: &str,
        data: &[u8],
        progress: Option<&UnboundedSender<ProgressEvent>>,
    ) -> Result<IngestOutcome> {
        let file_type = FileType::from_filename(filename);
        if !file_type.is_supported() {
            return Err(Error::UnsupportedFileType(filename.to_string()));
        }

        let content_hash = FileParser::hash_content(data);
        let replaced = match base.db.file_status(filename, &content_hash)? {
            FileStatus::Unchanged => {
                tracing::info!(base = %base.name, filename, "Skipping unchanged file");
                Self::notify(progress, ProgressEvent::stage(filename, ProgressStage::Skipped));
                let existing = base
                    .db
                    .get_document_by_filename(&base.name, filename)?
                    .ok_or_else(|| Error::DocumentNotFound(filename.to_string()))?;
                return Ok(IngestOutcome::Skipped(DocumentSummary {
                    id: existing.id,
                    filename: existing.filename,
                    file_type: existing.file_type,
                    total_pages: existing.total_pages,
                    total_chunks: existing.total_chunks,
                    skipped: true,
                }));
            }
            FileStatus::Modified(old_id) => Some(old_id),
            FileStatus::New => None,
        };

        // Parse
        Self::notify(progress, ProgressEvent::stage(filename, ProgressStage::Parsing));
        let parsed = FileParser::parse(filename, data)?;
        if parsed.content.trim().is_empty() {
            return Err(Error::file_parse(filename, "No text content extracted"));
        }

        // The filename row cannot change its id in place while pages and
        // chunks still reference it, so the old document goes first. The
        // old vectors stay searchable until the replacement is persisted.
        if let Some(old_id) = replaced {
            tracing::info!(base = %base.name, filename, "Re-indexing modified file");
            base.db.delete_document(old_id)?;
        }

        let mut doc = Document::new(
            filename.to_string(),
            base.name.clone(),
            parsed.file_type.clone(),
            content_hash,
            data.len() as u64,
        );
        doc.total_pages = Some(parsed.total_pages);
        base.db.upsert_document(&doc)?;

        let pages: Vec<(u32, String)> = parsed
            .pages
            .iter()
            .map(|p| (p.page_number, p.content.clone()))
            .collect();
        base.db.replace_pages(doc.id, &pages)?;

        // Chunk
        Self::notify(progress, ProgressEvent::stage(filename, ProgressStage::Chunking));
        let mut chunks = self.chunker.chunk_document(&doc, &parsed);
        if chunks.is_empty() {
            return Err(Error::file_parse(filename, "No chunks produced from content"));
        }
        tracing::debug!(base = %base.name, filename, chunks = chunks.len(), "Chunked document");

        // Embed in batches
        let total_chunks = chunks.len();
        let mut embedded = 0usize;
        for batch in chunks.chunks_mut(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            for (chunk, vector) in batch.iter_mut().zip(vectors) {
                chunk.embedding = vector;
            }
            embedded += batch.len();
            Self::notify(
                progress,
                ProgressEvent {
                    filename: filename.to_string(),
                    stage: ProgressStage::Embedding,
                    current: embedded,
                    total: total_chunks,
                    error: None,
                },
            );
        }

        // Persist chunks and vectors
        Self::notify(progress, ProgressEvent::stage(filename, ProgressStage::Indexing));
        base.db.replace_chunks(doc.id, &chunks)?;
        {
            let mut index = base.index.lock();
            if let Some(old_id) = replaced {
                index.remove_document(old_id);
            }
            for chunk in &chunks {
                index.insert(chunk.id, doc.id, chunk.embedding.clone())?;
            }
            index.save()?;
        }

        doc.total_chunks = total_chunks as u32;
        base.db.upsert_document(&doc)?;

        tracing::info!(
            base = %base.name,
            filename,
            chunks = total_chunks,
            pages = parsed.total_pages,
            "Indexed document"
        );
        Self::notify(progress, ProgressEvent::stage(filename, ProgressStage::Complete));

        Ok(IngestOutcome::Indexed(DocumentSummary {
            id: doc.id,
            filename: doc.filename,
            file_type: doc.file_type,
            total_pages: doc.total_pages,
            total_chunks: doc.total_chunks,
            skipped: false,
        }))
    }

    /// Ingest a file from disk
    pub async fn ingest_path(
        &self,
        base: &BaseHandle,
        path: &Path,
        progress: Option<&UnboundedSender<ProgressEvent>>,
    ) -> Result<IngestOutcome> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::file_parse(path.display().to_string(), "Invalid filename"))?
            .to_string();
        let data = tokio::fs::read(path).await?;
        self.ingest_file(base, &filename, &data, progress).await
    }

    /// Scan a folder and ingest every supported file in it.
    ///
    /// One failing file does not abort the scan; its error lands in the
    /// report and the scan moves on.
    pub async fn scan_folder(
        &self,
        base: &BaseHandle,
        dir: &Path,
        progress: Option<&UnboundedSender<ProgressEvent>>,
    ) -> Result<IngestReport> {
        let started = Instant::now();
        let mut report = IngestReport::new(&base.name);

        if !dir.is_dir() {
            return Err(Error::Config(format!(
                "Scan directory does not exist: {}",
                dir.display()
            )));
        }

        let files: Vec<_> = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .map(|n| FileType::from_filename(n).is_supported())
                    .unwrap_or(false)
            })
            .collect();

        tracing::info!(
            base = %base.name,
            dir = %dir.display(),
            files = files.len(),
            "Scanning folder"
        );

        for (i, entry) in files.iter().enumerate() {
            let filename = entry.file_name().to_string_lossy().to_string();
            Self::notify(
                progress,
                ProgressEvent {
                    filename: filename.clone(),
                    stage: ProgressStage::Parsing,
                    current: i + 1,
                    total: files.len(),
                    error: None,
                },
            );

            match self.ingest_path(base, entry.path(), progress).await {
                Ok(IngestOutcome::Indexed(summary)) => {
                    report.total_chunks_created += summary.total_chunks;
                    report.documents.push(summary);
                }
                Ok(IngestOutcome::Skipped(summary)) => {
                    report.files_skipped += 1;
                    report.documents.push(summary);
                }
                Err(e) => {
                    tracing::warn!(base = %base.name, filename, error = %e, "Failed to ingest file");
                    Self::notify(
                        progress,
                        ProgressEvent {
                            filename: filename.clone(),
                            stage: ProgressStage::Failed,
                            current: i + 1,
                            total: files.len(),
                            error: Some(e.to_string()),
                        },
                    );
                    report.errors.push(IngestFileError {
                        filename,
                        error: e.to_string(),
                    });
                }
            }
        }

        report.processing_time_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::BaseManager;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Deterministic embedder: vector derived from text length and bytes
    struct StubEmbedder {
        dims: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut v = vec![0.0f32; self.dims];
            for (i, b) in text.bytes().enumerate() {
                v[i % self.dims] += b as f32;
            }
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
            Ok(v.into_iter().map(|x| x / norm).collect())
        }

        fn dimensions(&self) -> usize {
            self.dims
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn test_setup(dir: &TempDir) -> (Config, BaseManager, IngestPipeline) {
        let mut config = Config::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config.embeddings.dimensions = 8;
        config.chunking.min_chunk_size = 10;
        let manager = BaseManager::new(config.clone()).unwrap();
        let pipeline = IngestPipeline::new(&config, Arc::new(StubEmbedder { dims: 8 }));
        (config, manager, pipeline)
    }

    fn sample_text() -> String {
        "Retrieval augmented generation grounds answers in documents. \
         Each document is split into chunks before embedding. \
         Chunks carry their source page for citations. \
         The vector index ranks chunks by cosine similarity. "
            .repeat(4)
    }

    #[tokio::test]
    async fn ingest_indexes_a_new_file() {
        let dir = TempDir::new().unwrap();
        let (_, manager, pipeline) = test_setup(&dir);
        let base = manager.get("default").unwrap();

        let outcome = pipeline
            .ingest_file(&base, "notes.txt", sample_text().as_bytes(), None)
            .await
            .unwrap();

        let summary = outcome.summary();
        assert!(!summary.skipped);
        assert!(summary.total_chunks > 0);
        assert_eq!(base.index.lock().len(), summary.total_chunks as usize);

        let stored = base.db.get_document_by_filename("default", "notes.txt").unwrap();
        assert_eq!(stored.unwrap().total_chunks, summary.total_chunks);
    }

    #[tokio::test]
    async fn unchanged_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let (_, manager, pipeline) = test_setup(&dir);
        let base = manager.get("default").unwrap();
        let text = sample_text();

        pipeline
            .ingest_file(&base, "notes.txt", text.as_bytes(), None)
            .await
            .unwrap();
        let before = base.index.lock().len();

        let outcome = pipeline
            .ingest_file(&base, "notes.txt", text.as_bytes(), None)
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Skipped(_)));
        assert_eq!(base.index.lock().len(), before);
    }

    #[tokio::test]
    async fn modified_file_replaces_old_vectors() {
        let dir = TempDir::new().unwrap();
        let (_, manager, pipeline) = test_setup(&dir);
        let base = manager.get("default").unwrap();

        pipeline
            .ingest_file(&base, "notes.txt", sample_text().as_bytes(), None)
            .await
            .unwrap();
        let first_id = base
            .db
            .get_document_by_filename("default", "notes.txt")
            .unwrap()
            .unwrap()
            .id;

        let new_text = format!("{} Completely revised content here.", sample_text());
        let outcome = pipeline
            .ingest_file(&base, "notes.txt", new_text.as_bytes(), None)
            .await
            .unwrap();
        let summary = outcome.summary();
        assert_ne!(summary.id, first_id);

        // Old document's vectors are gone
        let index = base.index.lock();
        assert_eq!(index.len(), summary.total_chunks as usize);
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (_, manager, pipeline) = test_setup(&dir);
        let base = manager.get("default").unwrap();

        let err = pipeline
            .ingest_file(&base, "binary.exe", b"MZ", None)
            .await;
        assert!(matches!(err, Err(Error::UnsupportedFileType(_))));
    }

    #[tokio::test]
    async fn scan_isolates_per_file_failures() {
        let dir = TempDir::new().unwrap();
        let (config, manager, pipeline) = test_setup(&dir);
        let base = manager.get("default").unwrap();

        let docs_dir = config.documents_dir("default");
        std::fs::write(docs_dir.join("good.txt"), sample_text()).unwrap();
        std::fs::write(docs_dir.join("empty.txt"), "").unwrap();
        std::fs::write(docs_dir.join("ignored.exe"), b"MZ").unwrap();

        let report = pipeline.scan_folder(&base, &docs_dir, None).await.unwrap();

        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.documents[0].filename, "good.txt");
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].filename, "empty.txt");
    }

    #[tokio::test]
    async fn progress_events_cover_the_stages() {
        let dir = TempDir::new().unwrap();
        let (_, manager, pipeline) = test_setup(&dir);
        let base = manager.get("default").unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        pipeline
            .ingest_file(&base, "notes.txt", sample_text().as_bytes(), Some(&tx))
            .await
            .unwrap();
        drop(tx);

        let mut stages = Vec::new();
        while let Some(event) = rx.recv().await {
            stages.push(event.stage);
        }
        assert!(stages.contains(&ProgressStage::Parsing));
        assert!(stages.contains(&ProgressStage::Embedding));
        assert_eq!(*stages.last().unwrap(), ProgressStage::Complete);
    }
}
