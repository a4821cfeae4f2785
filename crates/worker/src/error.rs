use std::time::Duration;

/// Why a submission was not accepted.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Rate limit exceeded, retry in {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("{0}")]
    InvalidInput(String),

    #[error("Failed to store upload: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Job queue is shut down")]
    QueueClosed,
}
