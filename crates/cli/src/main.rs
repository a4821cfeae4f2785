//! Local video analysis.
//!
//! Runs the same pipeline as the HTTP service against a file on disk,
//! prints the coaching report and writes it next to the annotated video.
//!
//! ```bash
//! swimlens lap.mp4                      # report + lap_analyzed.mp4
//! swimlens lap.mp4 -o out/session.mp4   # custom video path
//! swimlens lap.mp4 --report-only        # skip the annotated video
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use swimlens_core::report;
use swimlens_pipeline::ffmpeg::Reencoder;
use swimlens_pipeline::frames::FfmpegOverlayRenderer;
use swimlens_pipeline::pose_source::HttpPoseSource;
use swimlens_pipeline::probe::FfprobeProbe;
use swimlens_pipeline::{AnalysisPipeline, PipelineConfig, PipelineError, ProgressSink};

const RULE: &str = "============================================================";

/// Analyze freestyle swimming technique from a video file
#[derive(Parser, Debug)]
#[command(name = "swimlens", version)]
struct Args {
    /// Path to the input video
    video: PathBuf,

    /// Path for the annotated video (default: <input>_analyzed.mp4)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Write the text report only, skip the annotated video
    #[arg(long, conflicts_with = "no_report")]
    report_only: bool,

    /// Skip the text report, only write the annotated video
    #[arg(long)]
    no_report: bool,

    /// Base URL of the pose estimation service
    #[arg(long, env = "POSE_SERVICE_URL", default_value = "http://localhost:8001")]
    pose_service_url: String,

    /// Analyse every n-th frame
    #[arg(long, env = "POSE_SAMPLE_EVERY", default_value_t = 2)]
    sample_every: u32,

    #[arg(long, env = "FFMPEG_BIN", default_value = "ffmpeg")]
    ffmpeg_bin: String,

    #[arg(long, env = "FFPROBE_BIN", default_value = "ffprobe")]
    ffprobe_bin: String,

    /// Re-encode the annotated video to H.264 for browser playback
    #[arg(long)]
    reencode: bool,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("Video file not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// `dir/lap.mp4` -> `dir/lap_analyzed.mp4`
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "video".to_string());
    input.with_file_name(format!("{stem}_analyzed.mp4"))
}

/// `dir/lap_analyzed.mp4` -> `dir/lap_analyzed_report.txt`
fn report_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    output.with_file_name(format!("{stem}_report.txt"))
}

/// Prints each pipeline stage once, as it starts.
#[derive(Default)]
struct ConsoleProgress {
    last: Mutex<String>,
}

#[async_trait]
impl ProgressSink for ConsoleProgress {
    async fn report(&self, progress: u8, message: &str) {
        let Ok(mut last) = self.last.lock() else { return };
        if *last != message {
            println!("[{progress:>3}%] {message}");
            *last = message.to_string();
        }
    }
}

fn build_pipeline(args: &Args, output: &Path) -> AnalysisPipeline {
    let results_dir = output
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut config = PipelineConfig::new(results_dir);
    config.sample_every = args.sample_every;

    let pipeline = AnalysisPipeline::new(
        Arc::new(HttpPoseSource::new(args.pose_service_url.clone())),
        Arc::new(FfprobeProbe::new(args.ffprobe_bin.clone())),
        Arc::new(FfmpegOverlayRenderer::new(args.ffmpeg_bin.clone())),
        config,
    );
    if args.reencode {
        pipeline.with_reencoder(Reencoder::new(args.ffmpeg_bin.clone(), Duration::from_secs(600)))
    } else {
        pipeline
    }
}

async fn run(args: &Args, output: &Path, pipeline: &AnalysisPipeline) -> Result<(), CliError> {
    if !args.video.is_file() {
        return Err(CliError::MissingInput(args.video.clone()));
    }

    println!("{RULE}\nSWIM STROKE ANALYZER\n{RULE}");
    println!("Input video: {}", args.video.display());
    if !args.report_only {
        println!("Output video: {}", output.display());
    }
    println!();

    let video = pipeline
        .analyze_video(&args.video, &ConsoleProgress::default())
        .await?;
    println!("Processed {} sampled frames\n", video.frames.len());
    tracing::debug!(issues = video.analysis.issues.len(), "Analysis finished");

    if !args.no_report {
        let text = report::render(&video.analysis, pipeline.rules());
        println!("{text}\n");
        let path = report_path(output);
        tokio::fs::write(&path, &text)
            .await
            .map_err(|source| CliError::Write {
                path: path.clone(),
                source,
            })?;
        println!("Report saved to: {}\n", path.display());
    }

    if !args.report_only {
        println!("Creating annotated video...");
        let frames = pipeline.render_video(&args.video, output, &video).await?;
        println!("Video saved to: {} ({frames} frames)\n", output.display());
    }

    println!("{RULE}\nANALYSIS COMPLETE\n{RULE}");
    println!("{}", report::summary(&video.analysis));
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.video));
    let pipeline = build_pipeline(&args, &output);

    match run(&args, &output, &pipeline).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
