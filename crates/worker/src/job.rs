//! Job record and status state machine.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use swimlens_core::types::{JobId, Timestamp};

pub const MSG_QUEUED: &str = "Upload complete, waiting for a worker";
pub const MSG_FAILED: &str = "Analysis failed";

/// Lifecycle: `Queued -> Processing -> {Completed, Failed}`.
///
/// A queued job may also fail directly if it could not be started.
/// Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Processing)
                | (JobState::Queued, JobState::Failed)
                | (JobState::Processing, JobState::Completed)
                | (JobState::Processing, JobState::Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub state: JobState,
    /// 0..=100, never decreases while processing.
    pub progress: u8,
    pub message: String,
    /// Always set, and non-empty, once `state` is `Failed`.
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    pub fn queued(id: JobId) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: JobState::Queued,
            progress: 0,
            message: MSG_QUEUED.to_string(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_one_directional() {
        use JobState::*;
        assert!(Queued.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Processing.can_transition_to(Queued));
        assert!(!Queued.can_transition_to(Completed));
        for terminal in [Completed, Failed] {
            assert!(terminal.is_terminal());
            for next in [Queued, Processing, Completed, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&JobState::Processing).unwrap(), "\"processing\"");
        assert_eq!(JobState::Failed.to_string(), "failed");
    }

    #[test]
    fn new_job_is_queued() {
        let job = Job::queued(JobId::new_v4());
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.progress, 0);
        assert_eq!(job.message, MSG_QUEUED);
        assert!(job.error.is_none());
    }
}
