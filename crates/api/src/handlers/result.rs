//! Handlers for `/api/result/{video_id}/*`.
//!
//! Results are served from the results directory for as long as the files
//! exist, independent of whether the job is still in the job table.

use std::path::Path as FsPath;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{self, HeaderMap};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use swimlens_core::analysis::Analysis;
use swimlens_core::error::CoreError;
use swimlens_core::types::JobId;
use swimlens_pipeline::ResultPaths;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::error::{AppError, AppResult};
use crate::handlers::parse_video_id;
use crate::state::AppState;

/// Maximum bytes returned for an open-ended range (1 MiB).
const MAX_CHUNK_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub report: String,
}

fn result_paths(state: &AppState, raw_id: &str) -> AppResult<(JobId, ResultPaths)> {
    let id = parse_video_id(raw_id)?;
    Ok((id, ResultPaths::for_job(&state.config.results_dir, id)))
}

fn internal(e: impl std::fmt::Display) -> AppError {
    AppError::InternalError(e.to_string())
}

/// Read a whole result file, mapping a missing file to 404.
async fn read_result(path: &FsPath, entity: &'static str, id: JobId) -> AppResult<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(AppError::Core(CoreError::NotFound { entity, id }))
        }
        Err(e) => Err(internal(e)),
    }
}

/// Guess a Content-Type from a file extension.
fn content_type_for_extension(path: &FsPath) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

/// Parse a `Range: bytes=START-END` header value.
/// Returns `(start, optional_end)`.
fn parse_range_header(range: &str) -> Option<(u64, Option<u64>)> {
    let (start, end) = range.strip_prefix("bytes=")?.split_once('-')?;
    let start = start.trim().parse::<u64>().ok()?;
    let end = match end.trim() {
        "" => None,
        end => Some(end.parse::<u64>().ok()?),
    };
    Some((start, end))
}

/// GET /api/result/{video_id}/video
///
/// Streams the annotated video with HTTP range request support.
pub async fn stream_result_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let (id, paths) = result_paths(&state, &video_id)?;
    let path = paths.video.as_path();

    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) if m.is_file() => m,
        Ok(_) => return Err(AppError::Core(CoreError::NotFound { entity: "Result video", id })),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::Core(CoreError::NotFound { entity: "Result video", id }))
        }
        Err(e) => return Err(internal(e)),
    };
    let file_size = metadata.len();
    let content_type = content_type_for_extension(path);

    if let Some(range_value) = headers.get(header::RANGE) {
        let range_str = range_value
            .to_str()
            .map_err(|_| AppError::BadRequest("Invalid Range header".into()))?;

        if let Some((start, end)) = parse_range_header(range_str) {
            if start >= file_size || end.is_some_and(|e| e < start) {
                return Response::builder()
                    .status(StatusCode::RANGE_NOT_SATISFIABLE)
                    .header(header::CONTENT_RANGE, format!("bytes */{file_size}"))
                    .body(Body::empty())
                    .map_err(internal);
            }

            let last = file_size - 1;
            let end = end
                .map(|e| e.min(last))
                .unwrap_or_else(|| (start + MAX_CHUNK_SIZE - 1).min(last));
            let length = end - start + 1;

            let mut file = tokio::fs::File::open(path).await.map_err(internal)?;
            file.seek(std::io::SeekFrom::Start(start))
                .await
                .map_err(internal)?;
            let stream = ReaderStream::new(file.take(length));

            return Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, length.to_string())
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {start}-{end}/{file_size}"),
                )
                .header(header::ACCEPT_RANGES, "bytes")
                .body(Body::from_stream(stream))
                .map_err(internal);
        }
    }

    // No usable Range header: serve the full file.
    let file = tokio::fs::File::open(path).await.map_err(internal)?;
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, file_size.to_string())
        .header(header::ACCEPT_RANGES, "bytes")
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(internal)
}

/// GET /api/result/{video_id}/report
pub async fn get_report(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> AppResult<Json<ReportResponse>> {
    let (id, paths) = result_paths(&state, &video_id)?;
    let bytes = read_result(&paths.report, "Report", id).await?;
    let report = String::from_utf8(bytes).map_err(internal)?;
    Ok(Json(ReportResponse { report }))
}

/// GET /api/result/{video_id}/analysis
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> AppResult<Json<Analysis>> {
    let (id, paths) = result_paths(&state, &video_id)?;
    let bytes = read_result(&paths.analysis, "Analysis", id).await?;
    let analysis = serde_json::from_slice(&bytes).map_err(internal)?;
    Ok(Json(analysis))
}
