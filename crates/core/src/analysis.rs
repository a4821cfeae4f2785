//! The persisted result of one analysis job.

use serde::{Deserialize, Serialize};

use crate::metrics::{extract_metrics, MetricBundle};
use crate::pose::{FrameSize, PoseFrame};
use crate::rules::{detect_issues, overall_rating, Issue, RuleTable, Severity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub metrics: MetricBundle,
    pub issues: Vec<Issue>,
    pub rating: u8,
    /// `false` when no sampled frame carried landmarks. Such an analysis has
    /// no issues but must not be read as flawless technique.
    pub pose_detected: bool,
}

impl Analysis {
    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }
}

/// Run metric extraction and rule evaluation over a pose sequence.
pub fn analyze(
    frames: &[PoseFrame],
    size: FrameSize,
    min_visibility: f64,
    table: &RuleTable,
) -> Analysis {
    let metrics = extract_metrics(frames, size, min_visibility);
    let issues = detect_issues(&metrics, table);
    let rating = overall_rating(&issues);

    Analysis {
        pose_detected: metrics.valid_frames > 0,
        metrics,
        issues,
        rating,
    }
}
