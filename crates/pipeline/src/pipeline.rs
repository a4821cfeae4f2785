//! Stage sequencing for one analysis job.
//!
//! probe -> pose -> metrics/rules -> overlay (+ re-encode) -> report files.
//! Progress is pushed through a [`ProgressSink`] at fixed milestones.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use swimlens_core::analysis::{analyze, Analysis};
use swimlens_core::pose::{PoseFrame, DEFAULT_MIN_VISIBILITY};
use swimlens_core::report;
use swimlens_core::rules::RuleTable;
use swimlens_core::types::JobId;

use crate::error::PipelineError;
use crate::ffmpeg::Reencoder;
use crate::overlay::{OverlayRenderer, OverlayStyle, PanelStats, PoseTimeline};
use crate::pose_source::PoseSource;
use crate::probe::{MediaProbe, VideoInfo};

// ---------------------------------------------------------------------------
// Progress milestones
// ---------------------------------------------------------------------------

pub const PROGRESS_START: u8 = 10;
pub const PROGRESS_POSE_START: u8 = 20;
pub const PROGRESS_POSE_END: u8 = 50;
pub const PROGRESS_RENDER: u8 = 70;
pub const PROGRESS_REPORT: u8 = 90;
pub const PROGRESS_DONE: u8 = 100;

pub const MSG_START: &str = "Starting analysis";
pub const MSG_POSE: &str = "Detecting swimmer pose";
pub const MSG_METRICS: &str = "Computing stroke metrics";
pub const MSG_RENDER: &str = "Generating annotated video";
pub const MSG_REPORT: &str = "Writing report";
pub const MSG_DONE: &str = "Analysis complete!";

/// Receives progress updates for one job.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, progress: u8, message: &str);
}

/// Progress within the pose stage for `received` of `expected` samples.
pub fn pose_progress(received: u64, expected: Option<u64>) -> u8 {
    let span = u64::from(PROGRESS_POSE_END - PROGRESS_POSE_START);
    match expected {
        Some(expected) if expected > 0 => {
            let step = (received.min(expected) * span / expected) as u8;
            PROGRESS_POSE_START + step
        }
        _ => PROGRESS_POSE_START,
    }
}

// ---------------------------------------------------------------------------
// Result layout
// ---------------------------------------------------------------------------

/// Files a finished job leaves in the results directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPaths {
    pub video: PathBuf,
    pub report: PathBuf,
    pub analysis: PathBuf,
}

impl ResultPaths {
    pub fn for_job(results_dir: &Path, id: JobId) -> Self {
        Self {
            video: results_dir.join(format!("{id}_analyzed.mp4")),
            report: results_dir.join(format!("{id}_report.txt")),
            analysis: results_dir.join(format!("{id}_analysis.json")),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub results_dir: PathBuf,
    pub sample_every: u32,
    pub min_visibility: f64,
    /// Forward-fill cutoff; defaults to twice the sampling stride.
    pub max_stale_frames: Option<u64>,
}

impl PipelineConfig {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
            sample_every: 2,
            min_visibility: DEFAULT_MIN_VISIBILITY,
            max_stale_frames: None,
        }
    }
}

/// Everything learned about a video before anything is rendered.
#[derive(Debug, Clone)]
pub struct AnalyzedVideo {
    pub info: VideoInfo,
    pub frames: Vec<PoseFrame>,
    pub analysis: Analysis,
}

/// Output of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub analysis: Analysis,
    pub paths: ResultPaths,
    pub summary: String,
}

pub struct AnalysisPipeline {
    pose: Arc<dyn PoseSource>,
    probe: Arc<dyn MediaProbe>,
    renderer: Arc<dyn OverlayRenderer>,
    reencoder: Option<Reencoder>,
    rules: Arc<RuleTable>,
    config: PipelineConfig,
}

impl AnalysisPipeline {
    pub fn new(
        pose: Arc<dyn PoseSource>,
        probe: Arc<dyn MediaProbe>,
        renderer: Arc<dyn OverlayRenderer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            pose,
            probe,
            renderer,
            reencoder: None,
            rules: Arc::new(RuleTable::freestyle()),
            config,
        }
    }

    pub fn with_reencoder(mut self, reencoder: Reencoder) -> Self {
        self.reencoder = Some(reencoder);
        self
    }

    pub fn with_rules(mut self, rules: RuleTable) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Run every stage for `input`. Does not touch the input file beyond
    /// reading it.
    pub async fn run(
        &self,
        job_id: JobId,
        input: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<PipelineOutput, PipelineError> {
        let video = self.analyze_video(input, progress).await?;
        let analysis = &video.analysis;
        tracing::info!(
            job_id = %job_id,
            valid_frames = analysis.metrics.valid_frames,
            total_frames = analysis.metrics.total_frames,
            issues = analysis.issues.len(),
            "Metrics computed",
        );

        progress.report(PROGRESS_RENDER, MSG_RENDER).await;
        let paths = ResultPaths::for_job(&self.config.results_dir, job_id);
        let written = self.render_video(input, &paths.video, &video).await?;
        tracing::debug!(job_id = %job_id, frames = written, "Annotated video rendered");

        progress.report(PROGRESS_REPORT, MSG_REPORT).await;
        let text = report::render(analysis, &self.rules);
        tokio::fs::write(&paths.report, text).await?;
        let json = serde_json::to_vec_pretty(analysis)?;
        tokio::fs::write(&paths.analysis, json).await?;

        Ok(PipelineOutput {
            summary: report::summary(analysis),
            analysis: video.analysis,
            paths,
        })
    }

    /// Probe, extract poses and score them. Progress runs up to
    /// [`PROGRESS_POSE_END`].
    pub async fn analyze_video(
        &self,
        input: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<AnalyzedVideo, PipelineError> {
        progress.report(PROGRESS_START, MSG_START).await;
        let info = self.probe.probe(input).await?;
        tracing::debug!(
            video = %input.display(),
            width = info.size.width,
            height = info.size.height,
            fps = info.fps,
            total_frames = ?info.total_frames,
            "Probed source video",
        );

        progress.report(PROGRESS_POSE_START, MSG_POSE).await;
        let frames = self.collect_poses(input, info.total_frames, progress).await?;
        if frames.is_empty() {
            return Err(PipelineError::NoPoseData);
        }

        progress.report(PROGRESS_POSE_END, MSG_METRICS).await;
        let analysis = analyze(&frames, info.size, self.config.min_visibility, &self.rules);

        Ok(AnalyzedVideo {
            info,
            frames,
            analysis,
        })
    }

    /// Write the annotated copy of `input` to `output`, re-encoding it for
    /// browsers when a re-encoder is configured. Returns frames written.
    pub async fn render_video(
        &self,
        input: &Path,
        output: &Path,
        video: &AnalyzedVideo,
    ) -> Result<u64, PipelineError> {
        let max_stale = self
            .config
            .max_stale_frames
            .unwrap_or_else(|| PoseTimeline::default_max_stale(self.config.sample_every));
        let timeline = PoseTimeline::new(video.frames.clone(), max_stale);
        let style = OverlayStyle::from_rules(&self.rules, self.config.min_visibility)
            .with_stats(PanelStats::from_metrics(&video.analysis.metrics));
        let written = self
            .renderer
            .render(input, output, &video.info, &timeline, &style)
            .await?;

        if let Some(reencoder) = &self.reencoder {
            if let Err(e) = reencoder.reencode(output).await {
                tracing::warn!(video = %output.display(), error = %e, "Re-encode failed, keeping original encoding");
            }
        }
        Ok(written)
    }

    async fn collect_poses(
        &self,
        input: &Path,
        total_frames: Option<u64>,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<PoseFrame>, PipelineError> {
        let sample_every = self.config.sample_every.max(1);
        let expected = total_frames.map(|t| t.div_ceil(u64::from(sample_every)));

        let mut stream = self.pose.frames(input, sample_every).await?;
        let mut frames = Vec::new();
        let mut last = PROGRESS_POSE_START;

        while let Some(frame) = stream.next().await {
            frames.push(frame?);
            let pct = pose_progress(frames.len() as u64, expected).min(PROGRESS_POSE_END - 1);
            if pct > last {
                progress.report(pct, MSG_POSE).await;
                last = pct;
            }
        }
        Ok(frames)
    }
}
