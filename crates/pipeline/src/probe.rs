//! Media probe capability.

use std::path::Path;

use async_trait::async_trait;
use swimlens_core::pose::FrameSize;

use crate::ffmpeg::{self, FfmpegError};

/// What the pipeline needs to know about a source video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub size: FrameSize,
    pub fps: f64,
    pub duration: f64,
    /// `None` when the container reports neither a frame count nor a
    /// duration and rate to estimate one from.
    pub total_frames: Option<u64>,
}

#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<VideoInfo, FfmpegError>;
}

/// [`MediaProbe`] backed by the `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: String,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> Result<VideoInfo, FfmpegError> {
        let output = ffmpeg::probe_video(&self.program, path).await?;
        let (width, height) = ffmpeg::parse_resolution(&output);
        if width == 0 || height == 0 {
            return Err(FfmpegError::ParseError(
                "no video stream with a resolution".into(),
            ));
        }

        Ok(VideoInfo {
            size: FrameSize::new(width, height),
            fps: ffmpeg::parse_framerate(&output),
            duration: ffmpeg::parse_duration(&output),
            total_frames: ffmpeg::parse_total_frames(&output),
        })
    }
}
