use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use swimlens_core::pose::{FrameSize, PoseFrame};
use swimlens_core::types::JobId;
use swimlens_pipeline::ffmpeg::FfmpegError;
use swimlens_pipeline::overlay::{OverlayRenderer, OverlayStyle, PoseTimeline};
use swimlens_pipeline::pose_source::{PoseServiceError, PoseSource, PoseStream};
use swimlens_pipeline::probe::{MediaProbe, VideoInfo};
use swimlens_pipeline::{AnalysisPipeline, PipelineConfig, PipelineError};
use swimlens_worker::{Job, JobStore, Orchestrator, OrchestratorConfig, SlidingWindowLimiter};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Tracks how many pose extractions run at once.
#[derive(Default)]
pub struct Concurrency {
    active: AtomicUsize,
    pub peak: AtomicUsize,
}

/// Pose source that yields `frames` empty samples, `delay` apart.
pub struct SlowPoseSource {
    pub frames: u64,
    pub delay: Duration,
    pub concurrency: Arc<Concurrency>,
}

#[async_trait]
impl PoseSource for SlowPoseSource {
    async fn frames(&self, _video: &Path, _sample_every: u32) -> Result<PoseStream, PoseServiceError> {
        let c = Arc::clone(&self.concurrency);
        let now = c.active.fetch_add(1, Ordering::SeqCst) + 1;
        c.peak.fetch_max(now, Ordering::SeqCst);

        let delay = self.delay;
        let total = self.frames;
        let frames = stream::iter(0..total).then(move |i| {
            let c = Arc::clone(&c);
            async move {
                tokio::time::sleep(delay).await;
                if i + 1 == total {
                    c.active.fetch_sub(1, Ordering::SeqCst);
                }
                Ok(PoseFrame {
                    frame_index: i * 2,
                    timestamp: i as f64 / 15.0,
                    landmarks: None,
                })
            }
        });
        Ok(frames.boxed())
    }
}

pub struct FakeProbe;

#[async_trait]
impl MediaProbe for FakeProbe {
    async fn probe(&self, _path: &Path) -> Result<VideoInfo, FfmpegError> {
        Ok(VideoInfo {
            size: FrameSize::new(640, 480),
            fps: 30.0,
            duration: 1.0,
            total_frames: Some(20),
        })
    }
}

pub struct FakeRenderer {
    pub panic: bool,
}

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
        if self.panic {
            panic!("renderer exploded");
        }
        tokio::fs::write(output, b"rendered").await?;
        Ok(1)
    }
}

pub struct TestRig {
    pub orchestrator: Orchestrator,
    pub store: Arc<JobStore>,
    pub concurrency: Arc<Concurrency>,
    pub uploads: TempDir,
    pub results: TempDir,
    pub cancel: CancellationToken,
}

pub struct RigOptions {
    pub workers: usize,
    pub frames: u64,
    pub delay: Duration,
    pub panic: bool,
    pub limit: usize,
}

impl Default for RigOptions {
    fn default() -> Self {
        Self {
            workers: 3,
            frames: 10,
            delay: Duration::from_millis(1),
            panic: false,
            limit: 100,
        }
    }
}

pub fn rig(options: RigOptions) -> TestRig {
    let uploads = tempfile::tempdir().unwrap();
    let results = tempfile::tempdir().unwrap();
    let concurrency = Arc::new(Concurrency::default());

    let pipeline = AnalysisPipeline::new(
        Arc::new(SlowPoseSource {
            frames: options.frames,
            delay: options.delay,
            concurrency: Arc::clone(&concurrency),
        }),
        Arc::new(FakeProbe),
        Arc::new(FakeRenderer {
            panic: options.panic,
        }),
        PipelineConfig::new(results.path()),
    );

    let store = Arc::new(JobStore::new());
    let cancel = CancellationToken::new();
    let orchestrator = Orchestrator::start(
        Arc::clone(&store),
        Arc::new(SlidingWindowLimiter::new(options.limit, Duration::from_secs(3600))),
        Arc::new(pipeline),
        OrchestratorConfig {
            upload_dir: uploads.path().to_path_buf(),
            max_concurrent_jobs: options.workers,
        },
        cancel.clone(),
    );

    TestRig {
        orchestrator,
        store,
        concurrency,
        uploads,
        results,
        cancel,
    }
}

/// Minimal bytes that pass the mp4 magic check.
pub fn mp4_bytes() -> Vec<u8> {
    let mut bytes = vec![0, 0, 0, 0x18];
    bytes.extend_from_slice(b"ftypmp42");
    bytes.extend_from_slice(&[0; 32]);
    bytes
}

pub async fn wait_terminal(orchestrator: &Orchestrator, id: JobId) -> Job {
    for _ in 0..500 {
        let job = orchestrator.status(id).await.unwrap();
        if job.state.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not finish");
}

pub fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}
