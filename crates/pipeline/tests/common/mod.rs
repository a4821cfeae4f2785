use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use swimlens_core::pose::{BodyPart, FrameSize, Landmark, Landmarks, PoseFrame};
use swimlens_pipeline::ffmpeg::FfmpegError;
use swimlens_pipeline::overlay::{OverlayRenderer, OverlayStyle, PoseTimeline};
use swimlens_pipeline::pose_source::{PoseServiceError, PoseSource, PoseStream};
use swimlens_pipeline::probe::{MediaProbe, VideoInfo};
use swimlens_pipeline::{PipelineError, ProgressSink};

pub const SIZE: FrameSize = FrameSize {
    width: 1000,
    height: 1000,
};

/// Replays a fixed pose sequence.
pub struct FakePoseSource(pub Vec<PoseFrame>);

#[async_trait]
impl PoseSource for FakePoseSource {
    async fn frames(&self, _video: &Path, _sample_every: u32) -> Result<PoseStream, PoseServiceError> {
        Ok(stream::iter(self.0.clone().into_iter().map(Ok)).boxed())
    }
}

pub struct FakeProbe {
    pub total_frames: Option<u64>,
}

#[async_trait]
impl MediaProbe for FakeProbe {
    async fn probe(&self, _path: &Path) -> Result<VideoInfo, FfmpegError> {
        Ok(VideoInfo {
            size: SIZE,
            fps: 30.0,
            duration: 2.0,
            total_frames: self.total_frames,
        })
    }
}

/// Writes a placeholder file instead of encoding video.
pub struct FakeRenderer;

#[async_trait]
impl OverlayRenderer for FakeRenderer {
    async fn render(
        &self,
        _source: &Path,
        output: &Path,
        _info: &VideoInfo,
        _timeline: &PoseTimeline,
        _style: &OverlayStyle,
    ) -> Result<u64, PipelineError> {
        tokio::fs::write(output, b"rendered").await?;
        Ok(1)
    }
}

/// Keeps the style it was asked to render with.
#[derive(Default)]
pub struct StyleRecordingRenderer(pub Mutex<Option<OverlayStyle>>);

#[async_trait]
impl OverlayRenderer for StyleRecordingRenderer {
    async fn render(
        &self,
        _source: &Path,
        output: &Path,
        _info: &VideoInfo,
        _timeline: &PoseTimeline,
        style: &OverlayStyle,
    ) -> Result<u64, PipelineError> {
        *self.0.lock().unwrap() = Some(*style);
        tokio::fs::write(output, b"rendered").await?;
        Ok(1)
    }
}

#[derive(Default)]
pub struct RecordingSink(pub Mutex<Vec<(u8, String)>>);

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn report(&self, progress: u8, message: &str) {
        self.0.lock().unwrap().push((progress, message.to_string()));
    }
}

/// `count` sampled frames, every other source frame, without landmarks.
pub fn empty_frames(count: u64) -> Vec<PoseFrame> {
    (0..count)
        .map(|i| PoseFrame {
            frame_index: i * 2,
            timestamp: i as f64 * 2.0 / 30.0,
            landmarks: None,
        })
        .collect()
}

/// Both elbows held at `angle` degrees; nothing else visible. Keep `count`
/// under ten so no stroke rate is measured.
pub fn elbow_frames(count: u64, angle: f64) -> Vec<PoseFrame> {
    let rad = angle.to_radians();
    (0..count)
        .map(|i| {
            let mut l = Landmarks::new();
            for (shoulder, elbow, wrist) in [
                (BodyPart::LeftShoulder, BodyPart::LeftElbow, BodyPart::LeftWrist),
                (BodyPart::RightShoulder, BodyPart::RightElbow, BodyPart::RightWrist),
            ] {
                l.insert(shoulder, Landmark::new(500.0, 400.0, 0.9));
                l.insert(elbow, Landmark::new(500.0, 500.0, 0.9));
                l.insert(
                    wrist,
                    Landmark::new(500.0 + 100.0 * rad.sin(), 500.0 - 100.0 * rad.cos(), 0.9),
                );
            }
            PoseFrame {
                frame_index: i * 2,
                timestamp: i as f64 * 2.0 / 30.0,
                landmarks: Some(l),
            }
        })
        .collect()
}
