//! FFmpeg-backed frame I/O over rawvideo pipes.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::error::PipelineError;
use crate::overlay::{
    render_overlay, FrameReader, FrameWriter, OverlayRenderer, OverlayStyle, PoseTimeline, RgbFrame,
};
use crate::probe::VideoInfo;

const FALLBACK_FPS: f64 = 30.0;

fn spawn_error(program: &str, e: std::io::Error) -> PipelineError {
    PipelineError::Render(format!("failed to start {program}: {e}"))
}

/// Read a child's stderr to the end on a separate task, so a chatty child
/// never stalls on a full pipe while we are busy with stdin or stdout.
fn drain_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let mut pipe = child.stderr.take()?;
    Some(tokio::spawn(async move {
        let mut bytes = Vec::new();
        let _ = pipe.read_to_end(&mut bytes).await;
        String::from_utf8_lossy(&bytes).trim().to_string()
    }))
}

async fn collect_stderr(handle: Option<JoinHandle<String>>) -> String {
    match handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}

/// Decodes a video to RGB24 frames.
pub struct FfmpegFrameReader {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
}

impl FfmpegFrameReader {
    pub fn open(program: &str, source: &Path, width: u32, height: u32) -> Result<Self, PipelineError> {
        let mut child = Command::new(program)
            .args(["-v", "error", "-i"])
            .arg(source)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(program, e))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PipelineError::Render("decoder stdout not captured".into()))?;
        let stderr = drain_stderr(&mut child);

        Ok(Self {
            child,
            stdout,
            stderr,
            width,
            height,
        })
    }
}

#[async_trait]
impl FrameReader for FfmpegFrameReader {
    async fn next_frame(&mut self) -> Result<Option<RgbFrame>, PipelineError> {
        let mut frame = RgbFrame::new(self.width, self.height);
        match self.stdout.read_exact(&mut frame.data).await {
            Ok(_) => Ok(Some(frame)),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                let status = self.child.wait().await?;
                let stderr = collect_stderr(self.stderr.take()).await;
                if !status.success() {
                    return Err(PipelineError::Render(format!(
                        "decoder exited with {status}: {stderr}"
                    )));
                }
                Ok(None)
            }
            Err(e) => Err(PipelineError::Io(e)),
        }
    }
}

/// Encodes RGB24 frames to an mp4 file.
pub struct FfmpegFrameWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
}

impl FfmpegFrameWriter {
    pub fn create(
        program: &str,
        output: &Path,
        width: u32,
        height: u32,
        fps: f64,
    ) -> Result<Self, PipelineError> {
        let fps = if fps > 0.0 { fps } else { FALLBACK_FPS };
        let mut child = Command::new(program)
            .args(["-v", "error", "-y", "-f", "rawvideo", "-pix_fmt", "rgb24", "-s"])
            .arg(format!("{width}x{height}"))
            .arg("-r")
            .arg(format!("{fps:.3}"))
            .args(["-i", "-", "-c:v", "mpeg4", "-q:v", "5", "-pix_fmt", "yuv420p", "-f", "mp4"])
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(program, e))?;
        let stdin = child.stdin.take();
        let stderr = drain_stderr(&mut child);

        Ok(Self {
            child,
            stdin,
            stderr,
        })
    }
}

#[async_trait]
impl FrameWriter for FfmpegFrameWriter {
    async fn write_frame(&mut self, frame: &RgbFrame) -> Result<(), PipelineError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| PipelineError::Render("encoder already finished".into()))?;
        stdin.write_all(&frame.data).await?;
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), PipelineError> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush().await?;
        }
        let status = self.child.wait().await?;
        let stderr = collect_stderr(self.stderr.take()).await;
        if !status.success() {
            return Err(PipelineError::Render(format!(
                "encoder exited with {status}: {stderr}"
            )));
        }
        Ok(())
    }
}

/// [`OverlayRenderer`] that decodes and encodes through `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegOverlayRenderer {
    program: String,
}

impl FfmpegOverlayRenderer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl OverlayRenderer for FfmpegOverlayRenderer {
    async fn render(
        &self,
        source: &Path,
        output: &Path,
        info: &VideoInfo,
        timeline: &PoseTimeline,
        style: &OverlayStyle,
    ) -> Result<u64, PipelineError> {
        let (width, height) = (info.size.width, info.size.height);
        let mut reader = FfmpegFrameReader::open(&self.program, source, width, height)?;
        let mut writer = FfmpegFrameWriter::create(&self.program, output, width, height, info.fps)?;
        render_overlay(&mut reader, &mut writer, timeline, style, info.total_frames).await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use swimlens_core::pose::FrameSize;

    use super::*;

    #[tokio::test]
    async fn missing_binary_is_render_error() {
        let info = VideoInfo {
            size: FrameSize::new(16, 16),
            fps: 30.0,
            duration: 1.0,
            total_frames: Some(30),
        };
        let renderer = FfmpegOverlayRenderer::new("/nonexistent/ffmpeg");
        let result = renderer
            .render(
                Path::new("in.mp4"),
                Path::new("out.mp4"),
                &info,
                &PoseTimeline::new(Vec::new(), 4),
                &OverlayStyle::default(),
            )
            .await;
        assert_matches!(result, Err(PipelineError::Render(msg)) if msg.contains("failed to start"));
    }

    #[cfg(unix)]
    fn script(dir: &Path, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    /// Scripts stand in for ffmpeg. Cases run sequentially in one test so no
    /// other thread forks while a script file is still open for writing.
    #[cfg(unix)]
    #[tokio::test]
    async fn ffmpeg_failures_surface_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let crash = script(dir.path(), "crash.sh", "echo 'moov atom not found' >&2\nexit 1");
        let noisy = script(
            dir.path(),
            "noisy.sh",
            "head -c 262144 /dev/zero | tr '\\000' x >&2\ncat > /dev/null",
        );

        // A decoder that dies is an error, not an empty video.
        let mut reader = FfmpegFrameReader::open(&crash, Path::new("in.mp4"), 2, 2).unwrap();
        let result = reader.next_frame().await;
        assert_matches!(result, Err(PipelineError::Render(msg)) if msg.contains("moov atom not found"));

        let mut writer = FfmpegFrameWriter::create(&crash, &dir.path().join("out.mp4"), 2, 2, 30.0).unwrap();
        let _ = writer.write_frame(&RgbFrame::new(2, 2)).await;
        let result = writer.finish().await;
        assert_matches!(result, Err(PipelineError::Render(msg)) if msg.contains("moov atom not found"));

        // 256 KiB of stderr must not wedge an encoder still reading frames.
        let mut writer = FfmpegFrameWriter::create(&noisy, &dir.path().join("out.mp4"), 64, 64, 30.0).unwrap();
        let frame = RgbFrame::new(64, 64);
        let written = tokio::time::timeout(std::time::Duration::from_secs(10), async {
            for _ in 0..32 {
                writer.write_frame(&frame).await?;
            }
            writer.finish().await
        })
        .await
        .expect("encoder stalled on its stderr pipe");
        assert_matches!(written, Ok(()));
    }
}
