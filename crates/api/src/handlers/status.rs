//! Handler for `GET /api/status/{video_id}`.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use swimlens_worker::{Job, JobState};

use crate::error::{AppError, AppResult};
use crate::handlers::parse_video_id;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: JobState,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Job> for StatusResponse {
    fn from(job: Job) -> Self {
        Self {
            status: job.state,
            progress: job.progress,
            message: job.message,
            error: job.error,
        }
    }
}

/// GET /api/status/{video_id}
pub async fn get_status(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> AppResult<Json<StatusResponse>> {
    let id = parse_video_id(&video_id)?;
    let job = state
        .orchestrator
        .status(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Video {id} not found")))?;
    Ok(Json(job.into()))
}
