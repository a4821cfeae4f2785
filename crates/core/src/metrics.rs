//! Metric extraction engine.
//!
//! Consumes a full pose-frame sequence and produces a [`MetricBundle`]. Every
//! aggregate is an `Option`: `None` means the prerequisite landmarks never
//! cleared the visibility threshold anywhere in the sequence, which callers
//! must read as "not measurable" rather than zero.

use serde::{Deserialize, Serialize};

use crate::geometry::joint_angle;
use crate::pose::{BodyPart, FrameSize, PoseFrame};

/// Minimum number of wrist samples before a stroke rate is reported.
pub const MIN_STROKE_SAMPLES: usize = 10;

/// Each detected single-arm peak stands for one stroke per arm.
const ARMS_PER_PEAK: u32 = 2;

// ---------------------------------------------------------------------------
// Metric types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElbowMetrics {
    pub avg_angle: Option<f64>,
    pub min_angle: Option<f64>,
    pub max_angle: Option<f64>,
    pub left_avg: Option<f64>,
    pub right_avg: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationMetrics {
    pub avg_rotation: Option<f64>,
    pub min_rotation: Option<f64>,
    pub max_rotation: Option<f64>,
    pub std_rotation: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmEntryMetrics {
    /// Mean wrist distance from the shoulder centerline, as a fraction of frame width.
    pub avg_centerline_distance: Option<f64>,
    /// Largest wrist distance from the centerline seen in any frame.
    pub max_crossing: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadMetrics {
    /// Range of nose height as a fraction of frame height.
    pub vertical_movement: Option<f64>,
    pub avg_y: Option<f64>,
    /// `1 - vertical_movement`; higher is steadier.
    pub stability: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrokeRateMetrics {
    /// Strokes per minute.
    pub spm: Option<f64>,
    pub total_strokes: Option<u32>,
    /// Seconds between the first and last valid frame.
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KickMetrics {
    pub avg_knee_angle: Option<f64>,
    pub min_knee_angle: Option<f64>,
}

/// Every aggregate derived from one video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricBundle {
    pub elbow: ElbowMetrics,
    pub rotation: RotationMetrics,
    pub entry: ArmEntryMetrics,
    pub head: HeadMetrics,
    pub stroke_rate: StrokeRateMetrics,
    pub kick: KickMetrics,
    /// `valid_frames / total_frames`, always within `0.0..=1.0`.
    pub valid_frame_ratio: f64,
    pub valid_frames: usize,
    pub total_frames: usize,
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Compute all metric categories for a sampled pose sequence.
pub fn extract_metrics(frames: &[PoseFrame], size: FrameSize, min_visibility: f64) -> MetricBundle {
    let valid: Vec<&PoseFrame> = frames.iter().filter(|f| f.is_valid()).collect();

    let valid_frame_ratio = if frames.is_empty() {
        0.0
    } else {
        valid.len() as f64 / frames.len() as f64
    };

    MetricBundle {
        elbow: elbow_metrics(&valid, min_visibility),
        rotation: rotation_metrics(&valid, size, min_visibility),
        entry: arm_entry_metrics(&valid, size, min_visibility),
        head: head_metrics(&valid, size, min_visibility),
        stroke_rate: stroke_rate_metrics(&valid, min_visibility),
        kick: kick_metrics(&valid, min_visibility),
        valid_frame_ratio,
        valid_frames: valid.len(),
        total_frames: frames.len(),
    }
}

/// Angle at `vertex` when all three points clear the threshold.
fn visible_angle(
    frame: &PoseFrame,
    a: BodyPart,
    vertex: BodyPart,
    c: BodyPart,
    min_visibility: f64,
) -> Option<f64> {
    let a = frame.visible(a, min_visibility)?;
    let v = frame.visible(vertex, min_visibility)?;
    let c = frame.visible(c, min_visibility)?;
    joint_angle(a, v, c)
}

/// Elbow catch angle, each side measured independently.
fn elbow_metrics(frames: &[&PoseFrame], min_visibility: f64) -> ElbowMetrics {
    let mut left = Vec::new();
    let mut right = Vec::new();

    for frame in frames {
        if let Some(angle) = visible_angle(
            frame,
            BodyPart::LeftShoulder,
            BodyPart::LeftElbow,
            BodyPart::LeftWrist,
            min_visibility,
        ) {
            left.push(angle);
        }
        if let Some(angle) = visible_angle(
            frame,
            BodyPart::RightShoulder,
            BodyPart::RightElbow,
            BodyPart::RightWrist,
            min_visibility,
        ) {
            right.push(angle);
        }
    }

    let pooled: Vec<f64> = left.iter().chain(right.iter()).copied().collect();

    ElbowMetrics {
        avg_angle: mean(&pooled),
        min_angle: min(&pooled),
        max_angle: max(&pooled),
        left_avg: mean(&left),
        right_avg: mean(&right),
    }
}

/// Monocular rotation heuristic: a swimmer seen side-on shows narrow
/// shoulders and hips, a flat swimmer shows them wide.
fn rotation_metrics(frames: &[&PoseFrame], size: FrameSize, min_visibility: f64) -> RotationMetrics {
    if size.width == 0 {
        return RotationMetrics::default();
    }
    let frame_width = f64::from(size.width);

    let rotations: Vec<f64> = frames
        .iter()
        .filter_map(|frame| {
            let ls = frame.visible(BodyPart::LeftShoulder, min_visibility)?;
            let rs = frame.visible(BodyPart::RightShoulder, min_visibility)?;
            let lh = frame.visible(BodyPart::LeftHip, min_visibility)?;
            let rh = frame.visible(BodyPart::RightHip, min_visibility)?;

            let shoulder_width = (ls.x - rs.x).abs();
            let hip_width = (lh.x - rh.x).abs();
            let width_ratio = (shoulder_width + hip_width) / 2.0 / frame_width;

            Some((90.0 - width_ratio * 180.0).clamp(0.0, 90.0))
        })
        .collect();

    RotationMetrics {
        avg_rotation: mean(&rotations),
        min_rotation: min(&rotations),
        max_rotation: max(&rotations),
        std_rotation: std_dev(&rotations),
    }
}

/// Horizontal wrist distance from the shoulder midpoint.
fn arm_entry_metrics(frames: &[&PoseFrame], size: FrameSize, min_visibility: f64) -> ArmEntryMetrics {
    if size.width == 0 {
        return ArmEntryMetrics::default();
    }
    let frame_width = f64::from(size.width);
    let mut distances = Vec::new();

    for frame in frames {
        let (Some(ls), Some(rs)) = (
            frame.visible(BodyPart::LeftShoulder, min_visibility),
            frame.visible(BodyPart::RightShoulder, min_visibility),
        ) else {
            continue;
        };
        let center_x = (ls.x + rs.x) / 2.0;

        for wrist in [BodyPart::LeftWrist, BodyPart::RightWrist] {
            if let Some(w) = frame.visible(wrist, min_visibility) {
                distances.push((w.x - center_x).abs() / frame_width);
            }
        }
    }

    ArmEntryMetrics {
        avg_centerline_distance: mean(&distances),
        max_crossing: max(&distances),
    }
}

fn head_metrics(frames: &[&PoseFrame], size: FrameSize, min_visibility: f64) -> HeadMetrics {
    let nose_y: Vec<f64> = frames
        .iter()
        .filter_map(|f| f.visible(BodyPart::Nose, min_visibility))
        .map(|lm| lm.y)
        .collect();

    let (Some(lo), Some(hi)) = (min(&nose_y), max(&nose_y)) else {
        return HeadMetrics::default();
    };
    if size.height == 0 {
        return HeadMetrics {
            avg_y: mean(&nose_y),
            ..HeadMetrics::default()
        };
    }

    let vertical_movement = (hi - lo) / f64::from(size.height);
    HeadMetrics {
        vertical_movement: Some(vertical_movement),
        avg_y: mean(&nose_y),
        stability: Some(1.0 - vertical_movement),
    }
}

/// Count forward-reach peaks of the left wrist and scale to strokes/minute.
fn stroke_rate_metrics(frames: &[&PoseFrame], min_visibility: f64) -> StrokeRateMetrics {
    let (Some(first), Some(last)) = (frames.first(), frames.last()) else {
        return StrokeRateMetrics::default();
    };
    if frames.len() < 2 {
        return StrokeRateMetrics::default();
    }
    let duration = last.timestamp - first.timestamp;

    let wrist_x: Vec<f64> = frames
        .iter()
        .filter_map(|f| f.visible(BodyPart::LeftWrist, min_visibility))
        .map(|lm| lm.x)
        .collect();

    if wrist_x.len() < MIN_STROKE_SAMPLES {
        return StrokeRateMetrics::default();
    }

    let strokes = count_peaks(&wrist_x) * ARMS_PER_PEAK;
    let spm = (duration > 0.0).then(|| f64::from(strokes) / duration * 60.0);

    StrokeRateMetrics {
        spm,
        total_strokes: Some(strokes),
        duration: Some(duration),
    }
}

/// Number of samples strictly greater than both neighbours.
pub fn count_peaks(samples: &[f64]) -> u32 {
    samples
        .windows(3)
        .filter(|w| w[1] > w[0] && w[1] > w[2])
        .count() as u32
}

fn kick_metrics(frames: &[&PoseFrame], min_visibility: f64) -> KickMetrics {
    let mut knee_angles = Vec::new();

    for frame in frames {
        for (hip, knee, ankle) in [
            (BodyPart::LeftHip, BodyPart::LeftKnee, BodyPart::LeftAnkle),
            (BodyPart::RightHip, BodyPart::RightKnee, BodyPart::RightAnkle),
        ] {
            if let Some(angle) = visible_angle(frame, hip, knee, ankle, min_visibility) {
                knee_angles.push(angle);
            }
        }
    }

    KickMetrics {
        avg_knee_angle: mean(&knee_angles),
        min_knee_angle: min(&knee_angles),
    }
}

// ---------------------------------------------------------------------------
// Aggregation helpers
// ---------------------------------------------------------------------------

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Landmark, Landmarks};

    const SIZE: FrameSize = FrameSize {
        width: 1000,
        height: 500,
    };

    fn frame(index: u64, landmarks: Option<Landmarks>) -> PoseFrame {
        PoseFrame {
            frame_index: index,
            timestamp: index as f64 / 30.0,
            landmarks,
        }
    }

    fn lm(x: f64, y: f64) -> Landmark {
        Landmark::new(x, y, 0.9)
    }

    /// Left arm bent at 90 degrees, right arm straight.
    fn arms() -> Landmarks {
        let mut l = Landmarks::new();
        l.insert(BodyPart::LeftShoulder, lm(400.0, 100.0));
        l.insert(BodyPart::LeftElbow, lm(400.0, 200.0));
        l.insert(BodyPart::LeftWrist, lm(500.0, 200.0));
        l.insert(BodyPart::RightShoulder, lm(600.0, 100.0));
        l.insert(BodyPart::RightElbow, lm(600.0, 200.0));
        l.insert(BodyPart::RightWrist, lm(600.0, 300.0));
        l
    }

    #[test]
    fn empty_sequence_has_zero_ratio_and_no_aggregates() {
        let bundle = extract_metrics(&[], SIZE, 0.5);
        assert_eq!(bundle.valid_frame_ratio, 0.0);
        assert_eq!(bundle.elbow, ElbowMetrics::default());
        assert!(bundle.stroke_rate.spm.is_none());
    }

    #[test]
    fn valid_frame_ratio_counts_frames_with_landmarks() {
        let frames = vec![frame(0, Some(arms())), frame(2, None), frame(4, None), frame(6, Some(arms()))];
        let bundle = extract_metrics(&frames, SIZE, 0.5);
        assert_eq!(bundle.valid_frames, 2);
        assert_eq!(bundle.total_frames, 4);
        assert!((bundle.valid_frame_ratio - 0.5).abs() < 1e-12);
    }

    #[test]
    fn elbow_sides_pooled_and_split() {
        let bundle = extract_metrics(&[frame(0, Some(arms()))], SIZE, 0.5);
        let elbow = bundle.elbow;
        assert!((elbow.left_avg.unwrap() - 90.0).abs() < 1e-9);
        assert!((elbow.right_avg.unwrap() - 180.0).abs() < 1e-9);
        assert!((elbow.avg_angle.unwrap() - 135.0).abs() < 1e-9);
        assert!((elbow.min_angle.unwrap() - 90.0).abs() < 1e-9);
        assert!((elbow.max_angle.unwrap() - 180.0).abs() < 1e-9);
    }

    #[test]
    fn right_elbow_measured_even_when_left_hidden() {
        let mut l = arms();
        l.insert(BodyPart::LeftWrist, Landmark::new(500.0, 200.0, 0.1));
        let bundle = extract_metrics(&[frame(0, Some(l))], SIZE, 0.5);
        assert!(bundle.elbow.left_avg.is_none());
        assert!((bundle.elbow.right_avg.unwrap() - 180.0).abs() < 1e-9);
    }

    #[test]
    fn rotation_clamped_to_quarter_turn() {
        let mut l = Landmarks::new();
        // Full-width shoulders and hips: ratio 1.0 -> 90 - 180 clamps to 0.
        l.insert(BodyPart::LeftShoulder, lm(0.0, 0.0));
        l.insert(BodyPart::RightShoulder, lm(1000.0, 0.0));
        l.insert(BodyPart::LeftHip, lm(0.0, 100.0));
        l.insert(BodyPart::RightHip, lm(1000.0, 100.0));
        let bundle = extract_metrics(&[frame(0, Some(l))], SIZE, 0.5);
        assert_eq!(bundle.rotation.avg_rotation, Some(0.0));
        assert_eq!(bundle.rotation.std_rotation, Some(0.0));
    }

    #[test]
    fn rotation_heuristic_from_widths() {
        let mut l = Landmarks::new();
        // Average width 100px of 1000px -> 90 - 0.1 * 180 = 72 degrees.
        l.insert(BodyPart::LeftShoulder, lm(450.0, 0.0));
        l.insert(BodyPart::RightShoulder, lm(550.0, 0.0));
        l.insert(BodyPart::LeftHip, lm(450.0, 100.0));
        l.insert(BodyPart::RightHip, lm(550.0, 100.0));
        let bundle = extract_metrics(&[frame(0, Some(l))], SIZE, 0.5);
        assert!((bundle.rotation.avg_rotation.unwrap() - 72.0).abs() < 1e-9);
    }

    #[test]
    fn arm_entry_normalized_by_frame_width() {
        let bundle = extract_metrics(&[frame(0, Some(arms()))], SIZE, 0.5);
        // Centerline at x=500; left wrist 0px away, right wrist 100px away.
        assert!((bundle.entry.max_crossing.unwrap() - 0.1).abs() < 1e-12);
        assert!((bundle.entry.avg_centerline_distance.unwrap() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn head_stability_from_nose_range() {
        let frames: Vec<PoseFrame> = [100.0, 150.0, 125.0]
            .iter()
            .enumerate()
            .map(|(i, y)| {
                let mut l = Landmarks::new();
                l.insert(BodyPart::Nose, lm(0.0, *y));
                frame(i as u64, Some(l))
            })
            .collect();
        let head = extract_metrics(&frames, SIZE, 0.5).head;
        assert!((head.vertical_movement.unwrap() - 0.1).abs() < 1e-12);
        assert!((head.stability.unwrap() - 0.9).abs() < 1e-12);
        assert!((head.avg_y.unwrap() - 125.0).abs() < 1e-12);
    }

    #[test]
    fn peaks_must_be_strict() {
        assert_eq!(count_peaks(&[0.0, 1.0, 0.0, 1.0, 1.0, 0.0]), 1);
        assert_eq!(count_peaks(&[0.0, 2.0, 0.0, 2.0, 0.0]), 2);
        assert_eq!(count_peaks(&[1.0, 2.0]), 0);
    }

    #[test]
    fn stroke_rate_from_wrist_peaks() {
        // 13 samples one second apart, alternating: peaks at odd indices 1..=11 -> 6 peaks.
        let frames: Vec<PoseFrame> = (0..13)
            .map(|i| {
                let mut l = Landmarks::new();
                let x = if i % 2 == 1 { 200.0 } else { 100.0 };
                l.insert(BodyPart::LeftWrist, lm(x, 0.0));
                PoseFrame {
                    frame_index: i,
                    timestamp: i as f64,
                    landmarks: Some(l),
                }
            })
            .collect();
        let sr = extract_metrics(&frames, SIZE, 0.5).stroke_rate;
        assert_eq!(sr.total_strokes, Some(12));
        assert_eq!(sr.duration, Some(12.0));
        assert!((sr.spm.unwrap() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn stroke_rate_undetermined_below_min_samples() {
        let frames: Vec<PoseFrame> = (0..9)
            .map(|i| {
                let mut l = Landmarks::new();
                l.insert(BodyPart::LeftWrist, lm(i as f64, 0.0));
                frame(i, Some(l))
            })
            .collect();
        assert_eq!(extract_metrics(&frames, SIZE, 0.5).stroke_rate, StrokeRateMetrics::default());
    }

    #[test]
    fn kick_pools_both_legs() {
        let mut l = Landmarks::new();
        l.insert(BodyPart::LeftHip, lm(0.0, 0.0));
        l.insert(BodyPart::LeftKnee, lm(0.0, 100.0));
        l.insert(BodyPart::LeftAnkle, lm(0.0, 200.0));
        l.insert(BodyPart::RightHip, lm(100.0, 0.0));
        l.insert(BodyPart::RightKnee, lm(100.0, 100.0));
        l.insert(BodyPart::RightAnkle, lm(200.0, 100.0));
        let kick = extract_metrics(&[frame(0, Some(l))], SIZE, 0.5).kick;
        assert!((kick.avg_knee_angle.unwrap() - 135.0).abs() < 1e-9);
        assert!((kick.min_knee_angle.unwrap() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn invisible_landmarks_leave_categories_absent() {
        let mut l = Landmarks::new();
        for part in BodyPart::ALL {
            l.insert(part, Landmark::new(10.0, 10.0, 0.2));
        }
        let bundle = extract_metrics(&[frame(0, Some(l))], SIZE, 0.5);
        assert!(bundle.elbow.avg_angle.is_none());
        assert!(bundle.kick.avg_knee_angle.is_none());
        assert!(bundle.head.stability.is_none());
        assert!(bundle.entry.max_crossing.is_none());
        assert_eq!(bundle.rotation, RotationMetrics::default());
        assert_eq!(bundle.valid_frame_ratio, 1.0);
    }

    #[test]
    fn hidden_torso_raises_no_rotation_issue() {
        let mut l = Landmarks::new();
        for part in BodyPart::ALL {
            l.insert(part, Landmark::new(500.0, 100.0, 0.0));
        }
        let bundle = extract_metrics(&[frame(0, Some(l))], SIZE, 0.5);
        assert!(bundle.rotation.avg_rotation.is_none());
        assert!(crate::rules::detect_issues(&bundle, &crate::rules::RuleTable::freestyle()).is_empty());
    }

    #[test]
    fn hidden_shoulder_skips_arm_entry_frame() {
        let mut l = arms();
        l.insert(BodyPart::RightShoulder, Landmark::new(600.0, 100.0, 0.3));
        let bundle = extract_metrics(&[frame(0, Some(l))], SIZE, 0.5);
        assert!(bundle.entry.max_crossing.is_none());
    }
}
