//! Pose data model shared by the pose source, the metric engine and the
//! overlay renderer.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Default landmark confidence a point must reach before it is used.
pub const DEFAULT_MIN_VISIBILITY: f64 = 0.5;

// ---------------------------------------------------------------------------
// Body parts
// ---------------------------------------------------------------------------

/// Anatomical points tracked for freestyle analysis.
///
/// Serialized in `snake_case` (`"left_shoulder"`), which is also the key
/// format used by the pose service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyPart {
    Nose,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl BodyPart {
    /// Every tracked body part, in a stable order.
    pub const ALL: [BodyPart; 13] = [
        BodyPart::Nose,
        BodyPart::LeftShoulder,
        BodyPart::RightShoulder,
        BodyPart::LeftElbow,
        BodyPart::RightElbow,
        BodyPart::LeftWrist,
        BodyPart::RightWrist,
        BodyPart::LeftHip,
        BodyPart::RightHip,
        BodyPart::LeftKnee,
        BodyPart::RightKnee,
        BodyPart::LeftAnkle,
        BodyPart::RightAnkle,
    ];

    /// Parse a pose-service key such as `"left_shoulder"`.
    pub fn from_name(name: &str) -> Option<Self> {
        let part = match name {
            "nose" => BodyPart::Nose,
            "left_shoulder" => BodyPart::LeftShoulder,
            "right_shoulder" => BodyPart::RightShoulder,
            "left_elbow" => BodyPart::LeftElbow,
            "right_elbow" => BodyPart::RightElbow,
            "left_wrist" => BodyPart::LeftWrist,
            "right_wrist" => BodyPart::RightWrist,
            "left_hip" => BodyPart::LeftHip,
            "right_hip" => BodyPart::RightHip,
            "left_knee" => BodyPart::LeftKnee,
            "right_knee" => BodyPart::RightKnee,
            "left_ankle" => BodyPart::LeftAnkle,
            "right_ankle" => BodyPart::RightAnkle,
            _ => return None,
        };
        Some(part)
    }
}

/// Segments drawn when rendering a skeleton.
pub const SKELETON_EDGES: &[(BodyPart, BodyPart)] = &[
    (BodyPart::LeftShoulder, BodyPart::RightShoulder),
    (BodyPart::LeftShoulder, BodyPart::LeftElbow),
    (BodyPart::LeftElbow, BodyPart::LeftWrist),
    (BodyPart::RightShoulder, BodyPart::RightElbow),
    (BodyPart::RightElbow, BodyPart::RightWrist),
    (BodyPart::LeftShoulder, BodyPart::LeftHip),
    (BodyPart::RightShoulder, BodyPart::RightHip),
    (BodyPart::LeftHip, BodyPart::RightHip),
    (BodyPart::LeftHip, BodyPart::LeftKnee),
    (BodyPart::LeftKnee, BodyPart::LeftAnkle),
    (BodyPart::RightHip, BodyPart::RightKnee),
    (BodyPart::RightKnee, BodyPart::RightAnkle),
];

// ---------------------------------------------------------------------------
// Landmarks and frames
// ---------------------------------------------------------------------------

/// A single detected point. `x`/`y` are pixels in the source frame, `z` is
/// the model's relative depth and `visibility` its confidence in `0..=1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    pub visibility: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, visibility: f64) -> Self {
        Self {
            x,
            y,
            z: 0.0,
            visibility,
        }
    }

    /// Whether this point is confident enough to be measured.
    pub fn is_visible(&self, min_visibility: f64) -> bool {
        self.visibility >= min_visibility
    }
}

/// All landmarks detected on one frame.
pub type Landmarks = BTreeMap<BodyPart, Landmark>;

/// One sampled frame from the pose source.
///
/// Frames without a detected swimmer are kept (with `landmarks: None`) so
/// that timing and the valid-frame ratio stay accurate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseFrame {
    pub frame_index: u64,
    /// Seconds from the start of the video.
    pub timestamp: f64,
    #[serde(default, deserialize_with = "known_landmarks")]
    pub landmarks: Option<Landmarks>,
}

/// Keep only the landmark keys this crate tracks. The pose model reports
/// more points (eyes, ears, fingers) than the analysis uses.
fn known_landmarks<'de, D>(deserializer: D) -> Result<Option<Landmarks>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Landmark>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|points| {
        points
            .into_iter()
            .filter_map(|(name, lm)| BodyPart::from_name(&name).map(|part| (part, lm)))
            .collect()
    }))
}

impl PoseFrame {
    pub fn is_valid(&self) -> bool {
        self.landmarks.is_some()
    }

    /// Look up a landmark only if it clears the visibility threshold.
    pub fn visible(&self, part: BodyPart, min_visibility: f64) -> Option<&Landmark> {
        self.landmarks
            .as_ref()?
            .get(&part)
            .filter(|lm| lm.is_visible(min_visibility))
    }

    /// Look up a landmark regardless of its visibility.
    pub fn landmark(&self, part: BodyPart) -> Option<&Landmark> {
        self.landmarks.as_ref()?.get(&part)
    }
}

/// Pixel dimensions of the analysed video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}
