//! Submission entry point.
//!
//! An upload is accepted in two steps so the body never has to sit in
//! memory: [`Orchestrator::begin_upload`] gates on the rate limiter,
//! validates the leading bytes and opens the upload file; the caller streams
//! the rest through [`PendingUpload::write_chunk`] and hands it back to
//! [`Orchestrator::enqueue`], which records a queued job for the dispatcher.

use std::path::PathBuf;
use std::sync::Arc;

use swimlens_core::error::CoreError;
use swimlens_core::types::JobId;
use swimlens_core::upload::validate_upload;
use swimlens_pipeline::AnalysisPipeline;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::{JobDispatcher, QueuedJob};
use crate::error::SubmitError;
use crate::job::Job;
use crate::rate_limit::SlidingWindowLimiter;
use crate::storage::{upload_path, UploadGuard};
use crate::store::JobStore;

/// Default worker pool size.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 3;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub upload_dir: PathBuf,
    pub max_concurrent_jobs: usize,
}

/// A validated upload being written to disk. Dropping it before
/// [`Orchestrator::enqueue`] deletes the partial file.
#[derive(Debug)]
pub struct PendingUpload {
    id: JobId,
    file: tokio::fs::File,
    guard: UploadGuard,
    written: u64,
}

impl PendingUpload {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Bytes written so far.
    pub fn len(&self) -> u64 {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), SubmitError> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }
}

pub struct Orchestrator {
    store: Arc<JobStore>,
    limiter: Arc<SlidingWindowLimiter>,
    queue: mpsc::UnboundedSender<QueuedJob>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Build the orchestrator and spawn its dispatcher on the current
    /// runtime. The dispatcher stops when `cancel` fires or the
    /// orchestrator is dropped.
    pub fn start(
        store: Arc<JobStore>,
        limiter: Arc<SlidingWindowLimiter>,
        pipeline: Arc<AnalysisPipeline>,
        config: OrchestratorConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let dispatcher = JobDispatcher::new(Arc::clone(&store), pipeline, config.max_concurrent_jobs);
        tokio::spawn(dispatcher.run(rx, cancel));

        Self {
            store,
            limiter,
            queue,
            config,
        }
    }

    pub fn workers(&self) -> usize {
        self.config.max_concurrent_jobs.max(1)
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.limiter
    }

    /// Start accepting a video whose body begins with `head`.
    ///
    /// `head` must hold at least the container signature
    /// ([`swimlens_core::upload::SNIFF_LEN`] bytes) unless the whole file is
    /// shorter. Every call that passes the rate limiter counts against it,
    /// even if validation then rejects the upload. Rejected uploads are
    /// never written to disk.
    pub async fn begin_upload(
        &self,
        client_id: &str,
        filename: &str,
        head: &[u8],
    ) -> Result<PendingUpload, SubmitError> {
        if let Err(retry_after) = self.limiter.check(client_id).await {
            tracing::info!(client_id, retry_after_secs = retry_after.as_secs(), "Upload rate limited");
            return Err(SubmitError::RateLimited { retry_after });
        }

        let ext = validate_upload(filename, head).map_err(|e| match e {
            CoreError::Validation(msg) => SubmitError::InvalidInput(msg),
            other => SubmitError::InvalidInput(other.to_string()),
        })?;

        let id = JobId::new_v4();
        let path = upload_path(&self.config.upload_dir, id, &ext);
        let file = tokio::fs::File::create(&path).await?;
        let mut upload = PendingUpload {
            id,
            file,
            guard: UploadGuard::new(path),
            written: 0,
        };
        upload.write_chunk(head).await?;
        tracing::debug!(job_id = %id, client_id, filename, "Upload validated, receiving body");
        Ok(upload)
    }

    /// Finish writing `upload` and queue it for analysis.
    pub async fn enqueue(&self, upload: PendingUpload) -> Result<JobId, SubmitError> {
        let PendingUpload {
            id,
            mut file,
            guard,
            written,
        } = upload;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        self.store.insert(Job::queued(id)).await;
        let queued = QueuedJob {
            id,
            upload: guard.keep(),
        };
        if let Err(mpsc::error::SendError(job)) = self.queue.send(queued) {
            UploadGuard::new(job.upload).remove().await;
            if let Err(e) = self.store.fail(id, "Job queue is shut down").await {
                tracing::warn!(job_id = %id, error = %e, "Could not record rejected job");
            }
            return Err(SubmitError::QueueClosed);
        }

        tracing::info!(job_id = %id, size = written, "Upload accepted");
        Ok(id)
    }

    /// Accept a video already held in memory.
    pub async fn submit(
        &self,
        client_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<JobId, SubmitError> {
        let upload = self.begin_upload(client_id, filename, bytes).await?;
        self.enqueue(upload).await
    }

    /// Point-in-time copy of a job's status.
    pub async fn status(&self, id: JobId) -> Option<Job> {
        self.store.snapshot(id).await
    }
}
