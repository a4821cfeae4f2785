use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use futures::stream::{self, StreamExt};
use http_body_util::BodyExt;
use swimlens_api::config::ServerConfig;
use swimlens_api::router::build_app_router;
use swimlens_api::state::AppState;
use swimlens_core::pose::{BodyPart, FrameSize, Landmark, Landmarks, PoseFrame};
use swimlens_pipeline::ffmpeg::FfmpegError;
use swimlens_pipeline::overlay::{OverlayRenderer, OverlayStyle, PoseTimeline};
use swimlens_pipeline::pose_source::{PoseServiceError, PoseSource, PoseStream};
use swimlens_pipeline::probe::{MediaProbe, VideoInfo};
use swimlens_pipeline::{AnalysisPipeline, PipelineConfig, PipelineError};
use swimlens_worker::{JobStore, Orchestrator, OrchestratorConfig, SlidingWindowLimiter};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Size of the fake rendered video.
pub const RENDERED_LEN: usize = 256;

const BOUNDARY: &str = "swimlens-test-boundary";

/// Replays eight frames with both elbows bent to `angle` degrees.
pub struct FakePoseSource {
    pub angle: f64,
}

#[async_trait]
impl PoseSource for FakePoseSource {
    async fn frames(&self, _video: &Path, _sample_every: u32) -> Result<PoseStream, PoseServiceError> {
        let rad = self.angle.to_radians();
        let frames: Vec<_> = (0..8u64)
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
                Ok::<_, PoseServiceError>(PoseFrame {
                    frame_index: i * 2,
                    timestamp: i as f64 / 15.0,
                    landmarks: Some(l),
                })
            })
            .collect();
        Ok(stream::iter(frames).boxed())
    }
}

pub struct FakeProbe;

#[async_trait]
impl MediaProbe for FakeProbe {
    async fn probe(&self, _path: &Path) -> Result<VideoInfo, FfmpegError> {
        Ok(VideoInfo {
            size: FrameSize::new(1000, 1000),
            fps: 30.0,
            duration: 0.5,
            total_frames: Some(16),
        })
    }
}

/// Writes bytes `0..RENDERED_LEN` instead of encoding video.
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
        let bytes: Vec<u8> = (0..RENDERED_LEN).map(|b| b as u8).collect();
        tokio::fs::write(output, bytes).await?;
        Ok(1)
    }
}

/// Build a test `ServerConfig` rooted in the given directories.
pub fn test_config(uploads: &Path, results: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        app_env: "development".to_string(),
        frontend_url: "http://localhost:3000".to_string(),
        request_timeout_secs: 30,
        upload_dir: uploads.to_path_buf(),
        results_dir: results.to_path_buf(),
        max_upload_bytes: 1024 * 1024,
        max_concurrent_jobs: 2,
        rate_limit_max_requests: 10,
        rate_limit_window_secs: 3600,
        retention_hours: 24,
        retention_sweep_interval_secs: 3600,
        pose_service_url: "http://127.0.0.1:9".to_string(),
        pose_sample_every: 2,
        ffmpeg_bin: "ffmpeg".to_string(),
        ffprobe_bin: "ffprobe".to_string(),
        reencode_enabled: false,
        reencode_timeout_secs: 120,
        trust_forwarded_for: false,
    }
}

pub struct TestApp {
    pub router: Router,
    pub orchestrator: Arc<Orchestrator>,
    pub uploads: TempDir,
    pub results: TempDir,
    pub cancel: CancellationToken,
}

impl TestApp {
    pub fn results_dir(&self) -> PathBuf {
        self.results.path().to_path_buf()
    }
}

/// Build the full application router over fake pose, probe and render
/// collaborators. `tweak` adjusts the config before anything is built.
pub fn build_test_app_with(tweak: impl FnOnce(&mut ServerConfig)) -> TestApp {
    let uploads = tempfile::tempdir().unwrap();
    let results = tempfile::tempdir().unwrap();
    let mut config = test_config(uploads.path(), results.path());
    tweak(&mut config);

    let pipeline = AnalysisPipeline::new(
        Arc::new(FakePoseSource { angle: 130.0 }),
        Arc::new(FakeProbe),
        Arc::new(FakeRenderer),
        PipelineConfig::new(results.path()),
    );

    let cancel = CancellationToken::new();
    let orchestrator = Arc::new(Orchestrator::start(
        Arc::new(JobStore::new()),
        Arc::new(SlidingWindowLimiter::new(
            config.rate_limit_max_requests,
            Duration::from_secs(config.rate_limit_window_secs),
        )),
        Arc::new(pipeline),
        OrchestratorConfig {
            upload_dir: config.upload_dir.clone(),
            max_concurrent_jobs: config.max_concurrent_jobs,
        },
        cancel.clone(),
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator: Arc::clone(&orchestrator),
    };

    TestApp {
        router: build_app_router(state, &config),
        orchestrator,
        uploads,
        results,
        cancel,
    }
}

pub fn build_test_app() -> TestApp {
    build_test_app_with(|_| {})
}

/// Minimal bytes that pass the mp4 magic check.
pub fn mp4_bytes() -> Vec<u8> {
    let mut bytes = vec![0, 0, 0, 0x18];
    bytes.extend_from_slice(b"ftypmp42");
    bytes.extend_from_slice(&[0; 32]);
    bytes
}

/// A single-field `multipart/form-data` POST to `/api/upload`.
pub fn upload_request(field: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn send(app: &TestApp, request: Request<Body>) -> Response<Body> {
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &TestApp, uri: &str) -> Response<Body> {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Upload a valid mp4 and return its video id.
pub async fn upload_ok(app: &TestApp) -> String {
    let response = send(app, upload_request("video", "swim.mp4", &mp4_bytes())).await;
    assert_eq!(response.status(), 200);
    body_json(response).await["video_id"]
        .as_str()
        .unwrap()
        .to_string()
}

/// Poll `/api/status/{id}` until the job is terminal.
pub async fn wait_terminal(app: &TestApp, id: &str) -> serde_json::Value {
    for _ in 0..500 {
        let json = body_json(get(app, &format!("/api/status/{id}")).await).await;
        if json["status"] == "completed" || json["status"] == "failed" {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not finish");
}
