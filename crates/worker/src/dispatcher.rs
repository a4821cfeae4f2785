//! FIFO job dispatcher.
//!
//! A single long-lived task receives accepted jobs in submission order,
//! waits for a worker permit, and only then spawns the job. Jobs beyond the
//! pool size therefore wait in the channel, in order, and never run early.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use swimlens_core::types::JobId;
use swimlens_pipeline::{AnalysisPipeline, PipelineOutput, ProgressSink};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::storage::UploadGuard;
use crate::store::JobStore;

const MSG_PICKED_UP: &str = "Starting analysis";
pub const MSG_SHUTTING_DOWN: &str = "Server shutting down";

/// An accepted job waiting for a worker.
#[derive(Debug)]
pub struct QueuedJob {
    pub id: JobId,
    pub upload: PathBuf,
}

/// Pushes pipeline progress into the job store.
struct StoreProgress {
    store: Arc<JobStore>,
    id: JobId,
}

#[async_trait]
impl ProgressSink for StoreProgress {
    async fn report(&self, progress: u8, message: &str) {
        if let Err(e) = self.store.update_progress(self.id, progress, message).await {
            tracing::debug!(job_id = %self.id, error = %e, "Progress update ignored");
        }
    }
}

pub struct JobDispatcher {
    store: Arc<JobStore>,
    pipeline: Arc<AnalysisPipeline>,
    permits: Arc<Semaphore>,
}

impl JobDispatcher {
    pub fn new(store: Arc<JobStore>, pipeline: Arc<AnalysisPipeline>, workers: usize) -> Self {
        Self {
            store,
            pipeline,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Run until the queue closes or `cancel` fires. Jobs already running
    /// are left to finish; jobs still waiting for a worker are failed.
    pub async fn run(self, mut queue: mpsc::UnboundedReceiver<QueuedJob>, cancel: CancellationToken) {
        tracing::info!(workers = self.permits.available_permits(), "Job dispatcher started");

        loop {
            let job = tokio::select! {
                _ = cancel.cancelled() => break,
                job = queue.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let permit = tokio::select! {
                _ = cancel.cancelled() => {
                    self.abandon(job).await;
                    break;
                }
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        self.abandon(job).await;
                        break;
                    }
                },
            };

            self.spawn_job(job, permit);
        }

        queue.close();
        let mut abandoned = 0usize;
        while let Ok(job) = queue.try_recv() {
            self.abandon(job).await;
            abandoned += 1;
        }
        tracing::info!(abandoned, "Job dispatcher shutting down");
    }

    /// Fail a job that never reached a worker and release its upload.
    async fn abandon(&self, job: QueuedJob) {
        UploadGuard::new(job.upload).remove().await;
        if let Err(e) = self.store.fail(job.id, MSG_SHUTTING_DOWN).await {
            tracing::warn!(job_id = %job.id, error = %e, "Could not record abandoned job");
        }
    }

    /// Run one job on its own task, supervised so a panic still marks the
    /// job failed.
    fn spawn_job(&self, job: QueuedJob, permit: OwnedSemaphorePermit) {
        let store = Arc::clone(&self.store);
        let pipeline = Arc::clone(&self.pipeline);
        let id = job.id;

        let handle = tokio::spawn(execute(Arc::clone(&store), pipeline, job, permit));

        tokio::spawn(async move {
            if let Err(e) = handle.await {
                let reason = if e.is_panic() {
                    "Internal error: analysis worker panicked".to_string()
                } else {
                    format!("Internal error: {e}")
                };
                tracing::error!(job_id = %id, error = %e, "Analysis task aborted");
                if let Err(e) = store.fail(id, &reason).await {
                    tracing::warn!(job_id = %id, error = %e, "Could not record aborted job");
                }
            }
        });
    }
}

async fn execute(
    store: Arc<JobStore>,
    pipeline: Arc<AnalysisPipeline>,
    job: QueuedJob,
    _permit: OwnedSemaphorePermit,
) {
    let upload = UploadGuard::new(job.upload);

    if let Err(e) = store.mark_processing(job.id, MSG_PICKED_UP).await {
        tracing::warn!(job_id = %job.id, error = %e, "Job could not be claimed");
        return;
    }
    tracing::info!(job_id = %job.id, "Analysis started");

    let sink = StoreProgress {
        store: Arc::clone(&store),
        id: job.id,
    };
    let outcome = pipeline
        .run(job.id, upload.path(), &sink)
        .await
        .map_err(|e| e.to_string());

    finalize(&store, job.id, outcome, upload).await;
}

/// Release the raw upload, then record the terminal state, so a client that
/// sees a finished job never finds its upload still on disk.
pub async fn finalize(
    store: &JobStore,
    id: JobId,
    outcome: Result<PipelineOutput, String>,
    upload: UploadGuard,
) {
    upload.remove().await;
    let recorded = match outcome {
        Ok(output) => {
            tracing::info!(job_id = %id, summary = %output.summary, "Analysis complete");
            store.complete(id).await
        }
        Err(error) => {
            tracing::error!(job_id = %id, error = %error, "Analysis failed");
            store.fail(id, &error).await
        }
    };
    if let Err(e) = recorded {
        tracing::warn!(job_id = %id, error = %e, "Could not record job outcome");
    }
}
