//! Annotated-video rendering.
//!
//! Frames are decoded to RGB24, the pose in effect is drawn on top, and the
//! result is handed to an encoder. Decoding and encoding sit behind
//! [`FrameReader`] and [`FrameWriter`] so the drawing loop runs against
//! in-memory frames in tests.

use std::path::Path;

use async_trait::async_trait;
use swimlens_core::geometry::joint_angle;
use swimlens_core::metrics::MetricBundle;
use swimlens_core::pose::{BodyPart, Landmarks, PoseFrame, DEFAULT_MIN_VISIBILITY, SKELETON_EDGES};
use swimlens_core::rules::RuleTable;

use crate::error::PipelineError;
use crate::font::{glyph, text_width, GLYPH_ADVANCE, GLYPH_HEIGHT};
use crate::probe::VideoInfo;

// ---------------------------------------------------------------------------
// Frames and drawing primitives
// ---------------------------------------------------------------------------

pub type Rgb = [u8; 3];

pub const GREEN: Rgb = [0, 200, 0];
pub const ORANGE: Rgb = [255, 140, 0];
pub const RED: Rgb = [220, 0, 0];
pub const WHITE: Rgb = [255, 255, 255];
pub const BLACK: Rgb = [0, 0, 0];
const BAR_BACKGROUND: Rgb = [40, 40, 40];
const BAR_FILL: Rgb = [0, 160, 255];

const LINE_RADIUS: i64 = 2;
const JOINT_RADIUS: i64 = 4;
const BAR_HEIGHT: u32 = 8;
/// Frame width that maps to text scale 1.
const TEXT_BASE_WIDTH: u32 = 640;
/// Share of the underlying pixel kept under the stats panel.
const PANEL_SHADE: f64 = 0.3;

/// One decoded frame, packed RGB24, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RgbFrame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; Self::byte_len(width, height)],
        }
    }

    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }

    /// Out-of-bounds writes are clipped.
    pub fn put(&mut self, x: i64, y: i64, color: Rgb) {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return;
        }
        let i = (y as usize * self.width as usize + x as usize) * 3;
        self.data[i..i + 3].copy_from_slice(&color);
    }

    pub fn fill_disc(&mut self, cx: i64, cy: i64, radius: i64, color: Rgb) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.put(cx + dx, cy + dy, color);
                }
            }
        }
    }

    /// Bresenham line stamped with a disc of `radius`.
    pub fn draw_line(&mut self, from: (i64, i64), to: (i64, i64), radius: i64, color: Rgb) {
        let (mut x, mut y) = from;
        let dx = (to.0 - x).abs();
        let dy = -(to.1 - y).abs();
        let sx = if x < to.0 { 1 } else { -1 };
        let sy = if y < to.1 { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            self.fill_disc(x, y, radius, color);
            if (x, y) == to {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    pub fn fill_rect(&mut self, x: i64, y: i64, w: i64, h: i64, color: Rgb) {
        for yy in y..y + h {
            for xx in x..x + w {
                self.put(xx, yy, color);
            }
        }
    }

    /// Darken a rectangle, keeping `keep` of each channel.
    pub fn shade_rect(&mut self, x: i64, y: i64, w: i64, h: i64, keep: f64) {
        for yy in y.max(0)..(y + h).min(i64::from(self.height)) {
            for xx in x.max(0)..(x + w).min(i64::from(self.width)) {
                let i = (yy as usize * self.width as usize + xx as usize) * 3;
                for c in &mut self.data[i..i + 3] {
                    *c = (f64::from(*c) * keep).round() as u8;
                }
            }
        }
    }

    /// Draw `text` with its top-left corner at `(x, y)`, each font pixel
    /// `scale` pixels square. Returns the drawn width.
    pub fn draw_text(&mut self, x: i64, y: i64, text: &str, scale: i64, color: Rgb) -> i64 {
        for (n, c) in text.chars().enumerate() {
            let Some(rows) = glyph(c) else { continue };
            let left = x + n as i64 * GLYPH_ADVANCE * scale;
            for (row, &bits) in rows.iter().enumerate() {
                for col in 0..5 {
                    if bits & (0x10u8 >> col) != 0 {
                        self.fill_rect(left + col * scale, y + row as i64 * scale, scale, scale, color);
                    }
                }
            }
        }
        text_width(text, scale)
    }
}

// ---------------------------------------------------------------------------
// Pose timeline (forward-fill with staleness cutoff)
// ---------------------------------------------------------------------------

/// Sampled poses indexed by source frame number.
///
/// The pose service only samples every n-th frame. For frames in between,
/// the most recent sample at or before the frame is reused while it is at
/// most `max_stale_frames` old. A most-recent sample without landmarks means
/// nothing is drawn, even if an older one had a pose.
#[derive(Debug, Clone)]
pub struct PoseTimeline {
    samples: Vec<PoseFrame>,
    max_stale_frames: u64,
}

impl PoseTimeline {
    pub fn new(mut samples: Vec<PoseFrame>, max_stale_frames: u64) -> Self {
        samples.sort_by_key(|f| f.frame_index);
        Self {
            samples,
            max_stale_frames,
        }
    }

    /// Default cutoff for a given sampling stride.
    pub fn default_max_stale(sample_every: u32) -> u64 {
        2 * u64::from(sample_every.max(1))
    }

    pub fn pose_at(&self, frame_index: u64) -> Option<&Landmarks> {
        let after = self
            .samples
            .partition_point(|f| f.frame_index <= frame_index);
        let sample = self.samples.get(after.checked_sub(1)?)?;
        if frame_index - sample.frame_index > self.max_stale_frames {
            return None;
        }
        sample.landmarks.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Annotation
// ---------------------------------------------------------------------------

/// Whole-video readouts shown in the stats panel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PanelStats {
    pub elbow_avg: Option<f64>,
    pub rotation_avg: Option<f64>,
    pub spm: Option<f64>,
}

impl PanelStats {
    pub fn from_metrics(metrics: &MetricBundle) -> Self {
        Self {
            elbow_avg: metrics.elbow.avg_angle,
            rotation_avg: metrics.rotation.avg_rotation,
            spm: metrics.stroke_rate.spm,
        }
    }
}

/// Thresholds used to colour the arms and readouts, plus the readouts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub elbow_optimal: (f64, f64),
    pub elbow_dropped: f64,
    pub rotation_optimal: (f64, f64),
    pub rotation_too_flat: f64,
    pub min_visibility: f64,
    pub stats: PanelStats,
}

impl OverlayStyle {
    pub fn from_rules(rules: &RuleTable, min_visibility: f64) -> Self {
        Self {
            elbow_optimal: rules.elbow_optimal,
            elbow_dropped: rules.elbow_dropped,
            rotation_optimal: rules.rotation_optimal,
            rotation_too_flat: rules.rotation_too_flat,
            min_visibility,
            stats: PanelStats::default(),
        }
    }

    pub fn with_stats(mut self, stats: PanelStats) -> Self {
        self.stats = stats;
        self
    }

    /// Red below the too-flat threshold, orange below the optimal band,
    /// green otherwise.
    pub fn rotation_color(&self, rotation: f64) -> Rgb {
        if rotation < self.rotation_too_flat {
            RED
        } else if rotation < self.rotation_optimal.0 {
            ORANGE
        } else {
            GREEN
        }
    }

    /// Green inside the optimal band, red past the dropped threshold,
    /// orange otherwise. Unmeasurable arms are white.
    pub fn elbow_color(&self, angle: Option<f64>) -> Rgb {
        match angle {
            None => WHITE,
            Some(a) if (self.elbow_optimal.0..=self.elbow_optimal.1).contains(&a) => GREEN,
            Some(a) if a > self.elbow_dropped => RED,
            Some(_) => ORANGE,
        }
    }
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self::from_rules(&RuleTable::freestyle(), DEFAULT_MIN_VISIBILITY)
    }
}

const LEFT_ARM: [BodyPart; 3] = [BodyPart::LeftShoulder, BodyPart::LeftElbow, BodyPart::LeftWrist];
const RIGHT_ARM: [BodyPart; 3] = [BodyPart::RightShoulder, BodyPart::RightElbow, BodyPart::RightWrist];

fn arm_angle(pose: &Landmarks, arm: [BodyPart; 3], min_visibility: f64) -> Option<f64> {
    let [s, e, w] = arm.map(|p| pose.get(&p).filter(|lm| lm.is_visible(min_visibility)));
    joint_angle(s?, e?, w?)
}

fn edge_color(edge: (BodyPart, BodyPart), left: Rgb, right: Rgb) -> Rgb {
    let in_arm = |arm: &[BodyPart; 3]| arm.contains(&edge.0) && arm.contains(&edge.1);
    if in_arm(&LEFT_ARM) {
        left
    } else if in_arm(&RIGHT_ARM) {
        right
    } else {
        WHITE
    }
}

/// Text scale for a frame: 1 up to 640px wide, growing with width.
fn text_scale(frame: &RgbFrame) -> i64 {
    i64::from((frame.width / TEXT_BASE_WIDTH).max(1))
}

/// Angle readout on a dark box just above and right of the elbow.
fn draw_angle_label(frame: &mut RgbFrame, elbow: (i64, i64), angle: f64, color: Rgb) {
    let scale = text_scale(frame);
    let text = format!("{angle:.0}°");
    let (w, h) = (text_width(&text, scale), GLYPH_HEIGHT * scale);
    let (x, top) = (elbow.0, elbow.1 - h - 8 * scale);
    frame.fill_rect(x - 3 * scale, top - 2 * scale, w + 6 * scale, h + 4 * scale, BLACK);
    frame.draw_text(x, top, &text, scale, color);
}

/// Title and whole-video readouts in the top-left corner, over a shaded
/// box. Skipped when the box would cover more than a quarter of the frame.
fn draw_stats_panel(frame: &mut RgbFrame, style: &OverlayStyle) {
    let scale = text_scale(frame);
    let stats = &style.stats;
    let mut lines = vec![("FREESTYLE ANALYSIS".to_string(), WHITE)];
    if let Some(elbow) = stats.elbow_avg {
        lines.push((format!("ELBOW ANGLE: {elbow:.0}°"), style.elbow_color(Some(elbow))));
    }
    if let Some(rotation) = stats.rotation_avg {
        lines.push((format!("BODY ROTATION: {rotation:.0}°"), style.rotation_color(rotation)));
    }
    if let Some(spm) = stats.spm {
        lines.push((format!("STROKE RATE: {spm:.0} SPM"), WHITE));
    }

    let pad = GLYPH_ADVANCE * scale;
    let line_height = (GLYPH_HEIGHT + 5) * scale;
    let width = lines
        .iter()
        .map(|(text, _)| text_width(text, scale))
        .max()
        .unwrap_or(0)
        + 2 * pad;
    let height = lines.len() as i64 * line_height - 5 * scale + 2 * pad;
    if width * 2 > i64::from(frame.width) || height * 2 > i64::from(frame.height) {
        return;
    }

    frame.shade_rect(0, 0, width, height, PANEL_SHADE);
    for (n, (text, color)) in lines.iter().enumerate() {
        frame.draw_text(pad, pad + n as i64 * line_height, text, scale, *color);
    }
}

/// Draw the skeleton and elbow labels (if posed), the stats panel and a
/// progress bar of `progress` in `0..=1`.
pub fn annotate(frame: &mut RgbFrame, pose: Option<&Landmarks>, progress: f64, style: &OverlayStyle) {
    if let Some(pose) = pose {
        let left_angle = arm_angle(pose, LEFT_ARM, style.min_visibility);
        let right_angle = arm_angle(pose, RIGHT_ARM, style.min_visibility);
        let left = style.elbow_color(left_angle);
        let right = style.elbow_color(right_angle);
        let point = |part: BodyPart| {
            pose.get(&part)
                .filter(|lm| lm.is_visible(style.min_visibility))
                .map(|lm| (lm.x.round() as i64, lm.y.round() as i64))
        };

        for &(a, b) in SKELETON_EDGES {
            if let (Some(pa), Some(pb)) = (point(a), point(b)) {
                frame.draw_line(pa, pb, LINE_RADIUS, edge_color((a, b), left, right));
            }
        }
        for part in BodyPart::ALL {
            if let Some((x, y)) = point(part) {
                frame.fill_disc(x, y, JOINT_RADIUS, WHITE);
            }
        }
        for (elbow, angle, color) in [
            (BodyPart::LeftElbow, left_angle, left),
            (BodyPart::RightElbow, right_angle, right),
        ] {
            if let (Some(at), Some(angle)) = (point(elbow), angle) {
                draw_angle_label(frame, at, angle, color);
            }
        }
    }

    draw_stats_panel(frame, style);

    let bar_y = i64::from(frame.height.saturating_sub(BAR_HEIGHT));
    let width = i64::from(frame.width);
    let filled = (progress.clamp(0.0, 1.0) * width as f64).round() as i64;
    frame.fill_rect(0, bar_y, width, i64::from(BAR_HEIGHT), BAR_BACKGROUND);
    frame.fill_rect(0, bar_y, filled, i64::from(BAR_HEIGHT), BAR_FILL);
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Sequential decoder.
#[async_trait]
pub trait FrameReader: Send {
    /// `Ok(None)` at end of stream.
    async fn next_frame(&mut self) -> Result<Option<RgbFrame>, PipelineError>;
}

/// Sequential encoder.
#[async_trait]
pub trait FrameWriter: Send {
    async fn write_frame(&mut self, frame: &RgbFrame) -> Result<(), PipelineError>;

    /// Flush and close the output. Must be called once after the last frame.
    async fn finish(&mut self) -> Result<(), PipelineError>;
}

/// Produces the annotated video for a job.
#[async_trait]
pub trait OverlayRenderer: Send + Sync {
    async fn render(
        &self,
        source: &Path,
        output: &Path,
        info: &VideoInfo,
        timeline: &PoseTimeline,
        style: &OverlayStyle,
    ) -> Result<u64, PipelineError>;
}

/// Copy every frame from `reader` to `writer`, annotated. Returns the number
/// of frames written.
pub async fn render_overlay<R, W>(
    reader: &mut R,
    writer: &mut W,
    timeline: &PoseTimeline,
    style: &OverlayStyle,
    total_frames: Option<u64>,
) -> Result<u64, PipelineError>
where
    R: FrameReader + ?Sized,
    W: FrameWriter + ?Sized,
{
    let mut index = 0u64;
    while let Some(mut frame) = reader.next_frame().await? {
        let progress = match total_frames {
            Some(total) if total > 0 => (index + 1) as f64 / total as f64,
            _ => 0.0,
        };
        annotate(&mut frame, timeline.pose_at(index), progress, style);
        writer.write_frame(&frame).await?;
        index += 1;
    }
    writer.finish().await?;
    Ok(index)
}
