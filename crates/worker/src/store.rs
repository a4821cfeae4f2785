//! In-memory job table.
//!
//! Every method takes the lock for a single read or update and releases it
//! before returning, so status reads never wait on pipeline work.

use std::collections::HashMap;

use chrono::Utc;
use swimlens_core::types::{JobId, Timestamp};
use swimlens_pipeline::pipeline::{MSG_DONE, PROGRESS_DONE};
use tokio::sync::RwLock;

use crate::job::{Job, JobState, MSG_FAILED};

const UNKNOWN_ERROR: &str = "Unknown error";

#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("Job {0} not found")]
    NotFound(JobId),

    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },
}

#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: Job) {
        self.jobs.write().await.insert(job.id, job);
    }

    /// Point-in-time copy of a job.
    pub async fn snapshot(&self, id: JobId) -> Option<Job> {
        self.jobs.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Claim a queued job for execution. Only one caller can win.
    pub async fn mark_processing(&self, id: JobId, message: &str) -> Result<(), JobStoreError> {
        self.transition(id, JobState::Processing, |job| {
            job.message = message.to_string();
        })
        .await
    }

    /// Record progress on a processing job. Lower values than the current
    /// progress are ignored so observers never see it go backwards.
    pub async fn update_progress(
        &self,
        id: JobId,
        progress: u8,
        message: &str,
    ) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        if job.state != JobState::Processing {
            return Err(JobStoreError::InvalidTransition {
                from: job.state,
                to: JobState::Processing,
            });
        }
        job.progress = job.progress.max(progress.min(PROGRESS_DONE));
        job.message = message.to_string();
        job.updated_at = Utc::now();
        Ok(())
    }

    pub async fn complete(&self, id: JobId) -> Result<(), JobStoreError> {
        self.transition(id, JobState::Completed, |job| {
            job.progress = PROGRESS_DONE;
            job.message = MSG_DONE.to_string();
        })
        .await
    }

    /// Mark a job failed. An empty `error` is replaced so a failed job
    /// always explains itself.
    pub async fn fail(&self, id: JobId, error: &str) -> Result<(), JobStoreError> {
        let error = if error.trim().is_empty() {
            UNKNOWN_ERROR
        } else {
            error
        };
        self.transition(id, JobState::Failed, |job| {
            job.message = MSG_FAILED.to_string();
            job.error = Some(error.to_string());
        })
        .await
    }

    /// Drop finished jobs last updated before `cutoff`. Returns how many
    /// were removed.
    pub async fn prune_finished(&self, cutoff: Timestamp) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !(job.state.is_terminal() && job.updated_at < cutoff));
        before - jobs.len()
    }

    async fn transition(
        &self,
        id: JobId,
        to: JobState,
        apply: impl FnOnce(&mut Job),
    ) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        if !job.state.can_transition_to(to) {
            return Err(JobStoreError::InvalidTransition {
                from: job.state,
                to,
            });
        }
        job.state = to;
        job.updated_at = Utc::now();
        apply(job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    async fn store_with_job() -> (JobStore, JobId) {
        let store = JobStore::new();
        let id = JobId::new_v4();
        store.insert(Job::queued(id)).await;
        (store, id)
    }

    #[tokio::test]
    async fn only_one_claim_succeeds() {
        let (store, id) = store_with_job().await;
        store.mark_processing(id, "Starting").await.unwrap();
        assert_matches!(
            store.mark_processing(id, "Starting").await,
            Err(JobStoreError::InvalidTransition {
                from: JobState::Processing,
                to: JobState::Processing
            })
        );
    }

    #[tokio::test]
    async fn progress_never_decreases() {
        let (store, id) = store_with_job().await;
        store.mark_processing(id, "Starting").await.unwrap();
        store.update_progress(id, 40, "pose").await.unwrap();
        store.update_progress(id, 30, "late").await.unwrap();
        let job = store.snapshot(id).await.unwrap();
        assert_eq!(job.progress, 40);
        assert_eq!(job.message, "late");
    }

    #[tokio::test]
    async fn progress_rejected_unless_processing() {
        let (store, id) = store_with_job().await;
        assert_matches!(
            store.update_progress(id, 10, "x").await,
            Err(JobStoreError::InvalidTransition { from: JobState::Queued, .. })
        );
        assert_matches!(
            store.update_progress(JobId::new_v4(), 10, "x").await,
            Err(JobStoreError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn completion_sets_full_progress() {
        let (store, id) = store_with_job().await;
        store.mark_processing(id, "Starting").await.unwrap();
        store.complete(id).await.unwrap();
        let job = store.snapshot(id).await.unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.message, MSG_DONE);
    }

    #[tokio::test]
    async fn terminal_states_are_final() {
        let (store, id) = store_with_job().await;
        store.mark_processing(id, "Starting").await.unwrap();
        store.complete(id).await.unwrap();
        assert_matches!(store.fail(id, "late").await, Err(JobStoreError::InvalidTransition { .. }));
        assert_eq!(store.snapshot(id).await.unwrap().state, JobState::Completed);
    }

    #[tokio::test]
    async fn failed_job_always_has_error() {
        let (store, id) = store_with_job().await;
        store.mark_processing(id, "Starting").await.unwrap();
        store.fail(id, "  ").await.unwrap();
        let job = store.snapshot(id).await.unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error.as_deref(), Some(UNKNOWN_ERROR));
    }

    #[tokio::test]
    async fn prune_keeps_active_and_recent_jobs() {
        let store = JobStore::new();
        let active = JobId::new_v4();
        let done = JobId::new_v4();
        store.insert(Job::queued(active)).await;
        store.insert(Job::queued(done)).await;
        store.mark_processing(done, "Starting").await.unwrap();
        store.complete(done).await.unwrap();

        assert_eq!(store.prune_finished(Utc::now() - chrono::Duration::hours(1)).await, 0);
        assert_eq!(store.prune_finished(Utc::now() + chrono::Duration::hours(1)).await, 1);
        assert!(store.snapshot(active).await.is_some());
        assert!(store.snapshot(done).await.is_none());
    }
}
