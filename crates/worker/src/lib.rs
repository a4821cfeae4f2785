//! Job orchestration: submission, bounded execution, status tracking,
//! rate limiting and file retention.

pub mod dispatcher;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod rate_limit;
pub mod retention;
pub mod storage;
pub mod store;

pub use error::SubmitError;
pub use job::{Job, JobState};
pub use orchestrator::{Orchestrator, OrchestratorConfig, PendingUpload};
pub use rate_limit::SlidingWindowLimiter;
pub use store::{JobStore, JobStoreError};
