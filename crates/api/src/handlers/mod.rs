pub mod result;
pub mod status;
pub mod upload;

use swimlens_core::types::JobId;

use crate::error::{AppError, AppResult};

/// Parse a `{video_id}` path segment. Anything that is not a job id is
/// reported as unknown rather than malformed.
pub(crate) fn parse_video_id(raw: &str) -> AppResult<JobId> {
    JobId::parse_str(raw).map_err(|_| AppError::NotFound(format!("Video {raw} not found")))
}
