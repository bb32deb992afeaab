//! Background ingestion jobs
//!
//! Uploads and folder scans can run asynchronously. Progress lives in an
//! in-memory registry keyed by job id; clients poll `GET /api/jobs/:id`.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ingestion::{IngestOutcome, ProgressEvent, ProgressStage};
use crate::types::response::IngestFileError;

use super::state::AppState;

/// Job status
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

/// What a job does when the worker picks it up
#[derive(Debug, Clone)]
pub enum JobKind {
    /// Ingest uploaded file contents
    Upload(Vec<FileData>),
    /// Scan the base's documents folder
    Scan,
}

/// An uploaded file held until the worker processes it
#[derive(Debug, Clone)]
pub struct FileData {
    pub filename: String,
    pub data: Vec<u8>,
}

/// A queued ingestion job
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub base: String,
    pub kind: JobKind,
}

/// Progress snapshot for a job
#[derive(Debug, Clone, Serialize)]
pub struct JobProgress {
    pub job_id: Uuid,
    pub base: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<ProgressStage>,
    pub total_files: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub total_chunks: usize,
    pub chunks_embedded: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_errors: Vec<IngestFileError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobProgress {
    fn new(job_id: Uuid, base: String, total_files: usize) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            base,
            status: JobStatus::Pending,
            stage: None,
            total_files,
            files_processed: 0,
            files_skipped: 0,
            files_failed: 0,
            total_chunks: 0,
            chunks_embedded: 0,
            current_file: None,
            error: None,
            file_errors: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rough completion percentage for progress bars
    pub fn percent_complete(&self) -> f32 {
        if self.status == JobStatus::Complete {
            return 100.0;
        }
        if self.total_files == 0 {
            return 0.0;
        }
        let done = self.files_processed + self.files_skipped + self.files_failed;
        (done as f32 / self.total_files as f32) * 100.0
    }
}

/// Finished jobs kept around for polling before they are pruned
const FINISHED_JOBS_KEPT: usize = 50;

/// In-memory job registry plus the channel feeding the worker
pub struct JobQueue {
    jobs: Arc<DashMap<Uuid, JobProgress>>,
    sender: mpsc::Sender<Job>,
}

impl JobQueue {
    /// Create the queue and the receiver the worker consumes
    pub fn new() -> (Self, mpsc::Receiver<Job>) {
        let (sender, receiver) = mpsc::channel(100);
        (
            Self {
                jobs: Arc::new(DashMap::new()),
                sender,
            },
            receiver,
        )
    }

    /// Submit a job and return its id immediately
    pub async fn submit(&self, base: String, kind: JobKind) -> Uuid {
        self.prune_finished();
        let job_id = Uuid::new_v4();
        let total_files = match &kind {
            JobKind::Upload(files) => files.len(),
            // Unknown until the worker walks the folder
            JobKind::Scan => 0,
        };
        self.jobs
            .insert(job_id, JobProgress::new(job_id, base.clone(), total_files));

        let job = Job {
            id: job_id,
            base,
            kind,
        };
        if let Err(e) = self.sender.send(job).await {
            tracing::error!(%job_id, "Failed to queue job: {}", e);
            self.update(job_id, |p| {
                p.status = JobStatus::Failed;
                p.error = Some("Job queue is shut down".to_string());
            });
        }
        job_id
    }

    /// Progress snapshot for one job
    pub fn get(&self, job_id: Uuid) -> Option<JobProgress> {
        self.jobs.get(&job_id).map(|p| p.clone())
    }

    /// All jobs, newest first
    pub fn list(&self) -> Vec<JobProgress> {
        let mut jobs: Vec<JobProgress> = self.jobs.iter().map(|e| e.value().clone()).collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    fn update(&self, job_id: Uuid, f: impl FnOnce(&mut JobProgress)) {
        if let Some(mut progress) = self.jobs.get_mut(&job_id) {
            f(&mut progress);
            progress.updated_at = Utc::now();
        }
    }

    fn registry(&self) -> Arc<DashMap<Uuid, JobProgress>> {
        Arc::clone(&self.jobs)
    }

    /// Drop the oldest finished jobs once more than `FINISHED_JOBS_KEPT`
    /// have accumulated; running and pending jobs are never touched.
    fn prune_finished(&self) {
        let mut finished: Vec<(Uuid, DateTime<Utc>)> = self
            .jobs
            .iter()
            .filter(|e| {
                matches!(e.status, JobStatus::Complete | JobStatus::Failed)
            })
            .map(|e| (e.job_id, e.updated_at))
            .collect();
        if finished.len() <= FINISHED_JOBS_KEPT {
            return;
        }

        finished.sort_by_key(|(_, updated_at)| *updated_at);
        let excess = finished.len() - FINISHED_JOBS_KEPT;
        for (job_id, _) in finished.into_iter().take(excess) {
            self.jobs.remove(&job_id);
        }
        tracing::debug!(pruned = excess, "Pruned finished jobs");
    }
}

/// Background worker: pulls jobs off the shared channel and runs the
/// pipeline. Several workers share one receiver.
pub async fn run_worker(
    worker_id: usize,
    state: AppState,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
) {
    tracing::info!(worker_id, "Ingestion worker started");

    loop {
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else { break };
        let job_id = job.id;
        tracing::info!(%job_id, base = %job.base, "Processing job");
        state.jobs().update(job_id, |p| p.status = JobStatus::Processing);

        // Forward pipeline progress events into the registry
        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
        let registry = state.jobs().registry();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Some(mut progress) = registry.get_mut(&job_id) {
                    apply_event(&mut progress, &event);
                }
            }
        });

        let result = run_job(&state, &job, &tx).await;
        drop(tx);
        let _ = forwarder.await;

        state.jobs().update(job_id, |p| match &result {
            Ok(()) => {
                p.status = JobStatus::Complete;
                p.current_file = None;
                tracing::info!(%job_id, "Job complete");
            }
            Err(e) => {
                p.status = JobStatus::Failed;
                p.error = Some(e.to_string());
                tracing::error!(%job_id, "Job failed: {}", e);
            }
        });
    }

    tracing::info!(worker_id, "Ingestion worker stopped");
}

fn apply_event(progress: &mut JobProgress, event: &ProgressEvent) {
    progress.stage = Some(event.stage);
    progress.current_file = Some(event.filename.clone());
    progress.updated_at = Utc::now();

    match event.stage {
        ProgressStage::Parsing if event.total > 0 => {
            // Scan jobs learn their file count from the first events
            progress.total_files = event.total;
        }
        ProgressStage::Embedding => {
            progress.chunks_embedded = event.current;
            progress.total_chunks = event.total;
        }
        ProgressStage::Complete => progress.files_processed += 1,
        ProgressStage::Skipped => progress.files_skipped += 1,
        ProgressStage::Failed => {
            progress.files_failed += 1;
            progress.file_errors.push(IngestFileError {
                filename: event.filename.clone(),
                error: event.error.clone().unwrap_or_else(|| "unknown".to_string()),
            });
        }
        _ => {}
    }
}

async fn run_job(
    state: &AppState,
    job: &Job,
    tx: &mpsc::UnboundedSender<ProgressEvent>,
) -> crate::error::Result<()> {
    let base = state.bases().get(&job.base)?;

    match &job.kind {
        JobKind::Upload(files) => {
            for file in files {
                let result = state
                    .pipeline()
                    .ingest_file(&base, &file.filename, &file.data, Some(tx))
                    .await;
                match result {
                    Ok(IngestOutcome::Indexed(_)) | Ok(IngestOutcome::Skipped(_)) => {}
                    Err(e) => {
                        // Per-file failures are reported through the
                        // progress events; the job itself keeps going
                        tracing::warn!(filename = %file.filename, error = %e, "File failed in job");
                        super::routes::remove_stored_file(state, &job.base, &file.filename).await;
                        let _ = tx.send(ProgressEvent {
                            filename: file.filename.clone(),
                            stage: ProgressStage::Failed,
                            current: 0,
                            total: 0,
                            error: Some(e.to_string()),
                        });
                    }
                }
            }
            Ok(())
        }
        JobKind::Scan => {
            let dir = state.config().documents_dir(&job.base);
            state.pipeline().scan_folder(&base, &dir, Some(tx)).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_complete_tracks_file_counts() {
        let mut progress = JobProgress::new(Uuid::new_v4(), "default".to_string(), 4);
        assert_eq!(progress.percent_complete(), 0.0);

        progress.files_processed = 1;
        progress.files_skipped = 1;
        assert_eq!(progress.percent_complete(), 50.0);

        progress.status = JobStatus::Complete;
        assert_eq!(progress.percent_complete(), 100.0);
    }

    #[test]
    fn events_update_progress() {
        let mut progress = JobProgress::new(Uuid::new_v4(), "default".to_string(), 0);

        apply_event(
            &mut progress,
            &ProgressEvent {
                filename: "a.txt".to_string(),
                stage: ProgressStage::Parsing,
                current: 1,
                total: 3,
                error: None,
            },
        );
        assert_eq!(progress.total_files, 3);
        assert_eq!(progress.current_file.as_deref(), Some("a.txt"));

        apply_event(
            &mut progress,
            &ProgressEvent {
                filename: "a.txt".to_string(),
                stage: ProgressStage::Failed,
                current: 1,
                total: 3,
                error: Some("boom".to_string()),
            },
        );
        assert_eq!(progress.files_failed, 1);
        assert_eq!(progress.file_errors[0].error, "boom");
    }

    #[tokio::test]
    async fn finished_jobs_are_pruned_on_submit() {
        let (queue, mut receiver) = JobQueue::new();

        for i in 0..FINISHED_JOBS_KEPT + 10 {
            let mut progress =
                JobProgress::new(Uuid::new_v4(), "default".to_string(), 1);
            progress.status = JobStatus::Complete;
            progress.updated_at = Utc::now() + chrono::Duration::milliseconds(i as i64);
            queue.jobs.insert(progress.job_id, progress);
        }
        let mut running = JobProgress::new(Uuid::new_v4(), "default".to_string(), 1);
        running.status = JobStatus::Processing;
        let running_id = running.job_id;
        queue.jobs.insert(running_id, running);

        let submitted = queue.submit("default".to_string(), JobKind::Scan).await;
        receiver.recv().await.unwrap();

        let finished = queue
            .list()
            .into_iter()
            .filter(|p| p.status == JobStatus::Complete)
            .count();
        assert_eq!(finished, FINISHED_JOBS_KEPT);
        assert!(queue.get(running_id).is_some());
        assert!(queue.get(submitted).is_some());
    }

    #[tokio::test]
    async fn queue_lists_newest_first() {
        let (queue, mut receiver) = JobQueue::new();
        let first = queue.submit("default".to_string(), JobKind::Scan).await;
        let second = queue.submit("default".to_string(), JobKind::Scan).await;

        // Drain the channel so the sender isn't blocked
        assert_eq!(receiver.recv().await.unwrap().id, first);
        assert_eq!(receiver.recv().await.unwrap().id, second);

        let listed = queue.list();
        assert_eq!(listed.len(), 2);
        assert!(queue.get(first).is_some());
        assert!(queue.get(Uuid::new_v4()).is_none());
    }
}
