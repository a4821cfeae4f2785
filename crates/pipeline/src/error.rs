use crate::ffmpeg::FfmpegError;
use crate::pose_source::PoseServiceError;

/// Any failure inside one analysis run. The worker records its display
/// string as the job's error.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Pose detection failed: {0}")]
    PoseService(#[from] PoseServiceError),

    #[error("No pose data extracted from video")]
    NoPoseData,

    #[error("Could not read video: {0}")]
    Probe(#[from] FfmpegError),

    #[error("Rendering annotated video failed: {0}")]
    Render(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
