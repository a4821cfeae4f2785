//! Handler for `POST /api/upload`.

use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use swimlens_core::types::JobId;
use swimlens_core::upload::SNIFF_LEN;

use crate::error::{AppError, AppResult};
use crate::middleware::client_id::ClientId;
use crate::state::AppState;

/// Multipart field carrying the video.
pub const VIDEO_FIELD: &str = "video";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub video_id: JobId,
    pub message: &'static str,
}

fn multipart_error(status: StatusCode, text: String) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(text)
    } else {
        AppError::BadRequest(text)
    }
}

fn field_error(e: MultipartError) -> AppError {
    multipart_error(e.status(), e.body_text())
}

/// POST /api/upload
///
/// Streams the `video` field to the orchestrator, which rate limits,
/// validates, stores and enqueues it.
pub async fn upload_video(
    State(state): State<AppState>,
    client: ClientId,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<UploadResponse>> {
    let mut multipart = multipart.map_err(|e| multipart_error(e.status(), e.body_text()))?;

    while let Some(mut field) = multipart.next_field().await.map_err(field_error)? {
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let video_id = stream_video(&state, &client, &filename, &mut field).await?;

        return Ok(Json(UploadResponse {
            video_id,
            message: "Upload successful, processing started",
        }));
    }

    Err(AppError::BadRequest("No video file provided".to_string()))
}

/// Buffer only the container signature, then copy the rest of the field to
/// disk chunk by chunk. Any error drops the pending upload, which deletes
/// the partial file.
async fn stream_video(
    state: &AppState,
    client: &ClientId,
    filename: &str,
    field: &mut Field<'_>,
) -> AppResult<JobId> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    while head.len() < SNIFF_LEN {
        match field.chunk().await.map_err(field_error)? {
            Some(chunk) => head.extend_from_slice(&chunk),
            None => break,
        }
    }

    let mut upload = state
        .orchestrator
        .begin_upload(client.as_str(), filename, &head)
        .await?;
    while let Some(chunk) = field.chunk().await.map_err(field_error)? {
        upload.write_chunk(&chunk).await?;
    }

    Ok(state.orchestrator.enqueue(upload).await?)
}
