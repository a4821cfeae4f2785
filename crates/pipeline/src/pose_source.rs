//! Pose sequence collaborator.
//!
//! The pose model runs out of process. [`HttpPoseSource`] uploads the video
//! to the pose service and streams its NDJSON reply back as [`PoseFrame`]s,
//! one line per sampled frame.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use swimlens_core::pose::PoseFrame;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_stream::wrappers::LinesStream;
use tokio_util::io::{ReaderStream, StreamReader};

pub type PoseStream = BoxStream<'static, Result<PoseFrame, PoseServiceError>>;

/// Errors from the pose service layer.
#[derive(Debug, thiserror::Error)]
pub enum PoseServiceError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The pose service returned a non-2xx status code.
    #[error("pose service error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("malformed pose frame on line {line}: {message}")]
    Decode { line: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Source of per-frame landmarks for a video.
#[async_trait]
pub trait PoseSource: Send + Sync {
    /// Sample every `sample_every`-th frame of `video`, in frame order.
    async fn frames(&self, video: &Path, sample_every: u32) -> Result<PoseStream, PoseServiceError>;
}

/// HTTP client for the pose-estimation service.
pub struct HttpPoseSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPoseSource {
    /// * `base_url` - e.g. `http://localhost:8001`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, PoseServiceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(PoseServiceError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl PoseSource for HttpPoseSource {
    async fn frames(&self, video: &Path, sample_every: u32) -> Result<PoseStream, PoseServiceError> {
        let file = tokio::fs::File::open(video).await?;
        let len = file.metadata().await?.len();
        let file_name = video
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = reqwest::multipart::Part::stream_with_length(body, len).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("video", part);

        let response = self
            .client
            .post(format!("{}/v1/pose", self.base_url))
            .query(&[("sample_every", sample_every.max(1))])
            .multipart(form)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;

        let bytes = Box::pin(response.bytes_stream().map_err(io::Error::other));
        Ok(decode_ndjson(StreamReader::new(bytes)))
    }
}

/// Decode an NDJSON body into pose frames. Blank lines are skipped.
pub fn decode_ndjson<R>(reader: R) -> PoseStream
where
    R: AsyncBufRead + Send + Unpin + 'static,
{
    LinesStream::new(reader.lines())
        .enumerate()
        .filter_map(|(index, line)| async move {
            match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(serde_json::from_str::<PoseFrame>(&line).map_err(|e| {
                    PoseServiceError::Decode {
                        line: index + 1,
                        message: e.to_string(),
                    }
                })),
                Err(e) => Some(Err(PoseServiceError::Io(e))),
            }
        })
        .boxed()
}
