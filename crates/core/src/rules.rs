//! Issue detection rule engine and overall rating.
//!
//! Thresholds, severities and coaching copy live in one immutable
//! [`RuleTable`]; [`detect_issues`] is a pure function of a
//! [`MetricBundle`] and that table.

use serde::{Deserialize, Serialize};

use crate::metrics::MetricBundle;

/// Score every analysis starts from before deductions.
pub const MAX_RATING: u8 = 10;
/// Floor of the overall rating.
pub const MIN_RATING: u8 = 1;

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Moderate,
    Minor,
}

impl Severity {
    /// Sort key: lower ranks are reported first.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::Moderate => 1,
            Severity::Minor => 2,
        }
    }

    /// Points deducted from the rating for one issue of this severity.
    pub fn penalty(self) -> f64 {
        match self {
            Severity::Critical => 2.0,
            Severity::Moderate => 1.0,
            Severity::Minor => 0.5,
        }
    }

    /// Heading used when issues are grouped by severity.
    pub fn label(self) -> &'static str {
        match self {
            Severity::Critical => "Critical Issues",
            Severity::Moderate => "Areas for Improvement",
            Severity::Minor => "Minor Suggestions",
        }
    }
}

// ---------------------------------------------------------------------------
// Issue types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    DroppedElbow,
    FlatBody,
    OverRotation,
    CrossingCenterline,
    HeadLifting,
    SlowStrokeRate,
    FastStrokeRate,
    ExcessiveKneeBend,
}

impl IssueType {
    pub const ALL: [IssueType; 8] = [
        IssueType::DroppedElbow,
        IssueType::FlatBody,
        IssueType::OverRotation,
        IssueType::CrossingCenterline,
        IssueType::HeadLifting,
        IssueType::SlowStrokeRate,
        IssueType::FastStrokeRate,
        IssueType::ExcessiveKneeBend,
    ];

    /// Wire name, e.g. `dropped_elbow`.
    pub fn as_str(self) -> &'static str {
        match self {
            IssueType::DroppedElbow => "dropped_elbow",
            IssueType::FlatBody => "flat_body",
            IssueType::OverRotation => "over_rotation",
            IssueType::CrossingCenterline => "crossing_centerline",
            IssueType::HeadLifting => "head_lifting",
            IssueType::SlowStrokeRate => "slow_stroke_rate",
            IssueType::FastStrokeRate => "fast_stroke_rate",
            IssueType::ExcessiveKneeBend => "excessive_knee_bend",
        }
    }
}

/// One detected technique problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub issue_type: IssueType,
    pub severity: Severity,
    pub description: String,
    pub coaching_tip: String,
    pub metric_value: Option<f64>,
}

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

/// Severity and coaching copy for one issue type.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueDefinition {
    pub issue_type: IssueType,
    pub name: &'static str,
    pub severity: Severity,
    pub tip: &'static str,
}

/// Every threshold the rule engine consults.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleTable {
    pub elbow_optimal: (f64, f64),
    /// Mean elbow angle above this is a dropped elbow.
    pub elbow_dropped: f64,
    pub rotation_optimal: (f64, f64),
    pub rotation_too_flat: f64,
    pub rotation_too_much: f64,
    /// Fraction of frame width.
    pub centerline_threshold: f64,
    /// Fraction of frame height.
    pub head_lift_threshold: f64,
    pub stroke_rate_optimal: (f64, f64),
    pub knee_optimal: f64,
    pub knee_excessive_bend: f64,
    /// Head stability above this is called out as a strength.
    pub head_stability_strength: f64,
    pub definitions: Vec<IssueDefinition>,
}

impl RuleTable {
    /// Default freestyle thresholds.
    pub fn freestyle() -> Self {
        Self {
            elbow_optimal: (80.0, 100.0),
            elbow_dropped: 120.0,
            rotation_optimal: (45.0, 60.0),
            rotation_too_flat: 30.0,
            rotation_too_much: 70.0,
            centerline_threshold: 0.15,
            head_lift_threshold: 0.1,
            stroke_rate_optimal: (50.0, 60.0),
            knee_optimal: 170.0,
            knee_excessive_bend: 140.0,
            head_stability_strength: 0.8,
            definitions: vec![
                IssueDefinition {
                    issue_type: IssueType::DroppedElbow,
                    name: "Dropped Elbow",
                    severity: Severity::Critical,
                    tip: "Focus on high elbow catch. Imagine reaching over a barrel. Keep your elbow higher than your wrist during the catch phase.",
                },
                IssueDefinition {
                    issue_type: IssueType::FlatBody,
                    name: "Flat Body Position",
                    severity: Severity::Critical,
                    tip: "Increase body rotation (45-60°). Initiate rotation from your hips, not shoulders. Roll your body like a log.",
                },
                IssueDefinition {
                    issue_type: IssueType::OverRotation,
                    name: "Over-rotation",
                    severity: Severity::Moderate,
                    tip: "Reduce body rotation. Focus on controlled roll. Your shoulders should rotate more than your hips.",
                },
                IssueDefinition {
                    issue_type: IssueType::CrossingCenterline,
                    name: "Arm Crossing Centerline",
                    severity: Severity::Critical,
                    tip: "Enter your hand in line with your shoulder. Avoid crossing past the centerline of your body. Track straight back.",
                },
                IssueDefinition {
                    issue_type: IssueType::HeadLifting,
                    name: "Head Lifting During Breathing",
                    severity: Severity::Moderate,
                    tip: "Rotate your head to breathe, don't lift it. Keep one goggle in the water. Look to the side, not forward.",
                },
                IssueDefinition {
                    issue_type: IssueType::ExcessiveKneeBend,
                    name: "Excessive Knee Bend",
                    severity: Severity::Moderate,
                    tip: "Keep your legs straighter. Kick from your hips, not your knees. Small, quick kicks with minimal knee bend.",
                },
                IssueDefinition {
                    issue_type: IssueType::SlowStrokeRate,
                    name: "Slow Stroke Rate",
                    severity: Severity::Minor,
                    tip: "Increase your tempo slightly (aim for 50-60 SPM for distance swimming). Focus on quicker hand turnover.",
                },
                IssueDefinition {
                    issue_type: IssueType::FastStrokeRate,
                    name: "Fast Stroke Rate",
                    severity: Severity::Minor,
                    tip: "Slow down and focus on longer strokes. Glide more after each stroke. Distance per stroke is more efficient.",
                },
            ],
        }
    }

    pub fn definition(&self, issue_type: IssueType) -> Option<&IssueDefinition> {
        self.definitions.iter().find(|d| d.issue_type == issue_type)
    }

    /// Build an issue from its table entry. Types missing from the table fall
    /// back to a moderate issue with an empty tip.
    fn issue(&self, issue_type: IssueType, description: String, value: f64) -> Issue {
        let (severity, tip) = match self.definition(issue_type) {
            Some(def) => (def.severity, def.tip),
            None => (Severity::Moderate, ""),
        };
        Issue {
            issue_type,
            severity,
            description,
            coaching_tip: tip.to_string(),
            metric_value: Some(value),
        }
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::freestyle()
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Evaluate every rule against the metrics and return the fired issues,
/// ordered by severity with evaluation order preserved among equals.
pub fn detect_issues(metrics: &MetricBundle, table: &RuleTable) -> Vec<Issue> {
    let mut issues = Vec::new();

    if let Some(avg) = metrics.elbow.avg_angle {
        if avg > table.elbow_dropped {
            issues.push(table.issue(
                IssueType::DroppedElbow,
                format!(
                    "Dropped elbow during catch (avg {avg:.0}° - should be {:.0}-{:.0}°)",
                    table.elbow_optimal.0, table.elbow_optimal.1
                ),
                avg,
            ));
        }
    }

    if let Some(avg) = metrics.rotation.avg_rotation {
        let (lo, hi) = table.rotation_optimal;
        if avg < table.rotation_too_flat {
            issues.push(table.issue(
                IssueType::FlatBody,
                format!("Limited body rotation ({avg:.0}° avg - optimal {lo:.0}-{hi:.0}°)"),
                avg,
            ));
        } else if avg > table.rotation_too_much {
            issues.push(table.issue(
                IssueType::OverRotation,
                format!("Over-rotation ({avg:.0}° avg - optimal {lo:.0}-{hi:.0}°)"),
                avg,
            ));
        }
    }

    if let Some(max_crossing) = metrics.entry.max_crossing {
        if max_crossing > table.centerline_threshold {
            issues.push(table.issue(
                IssueType::CrossingCenterline,
                format!(
                    "Crossing centerline on entry ({:.0}% of frame width over center)",
                    max_crossing * 100.0
                ),
                max_crossing,
            ));
        }
    }

    if let Some(movement) = metrics.head.vertical_movement {
        if movement > table.head_lift_threshold {
            issues.push(table.issue(
                IssueType::HeadLifting,
                format!(
                    "Head lifting during breathing ({:.0}% vertical movement)",
                    movement * 100.0
                ),
                movement,
            ));
        }
    }

    if let Some(spm) = metrics.stroke_rate.spm {
        let (lo, hi) = table.stroke_rate_optimal;
        if spm < lo {
            issues.push(table.issue(
                IssueType::SlowStrokeRate,
                format!("Stroke rate below optimal ({spm:.0} SPM - optimal {lo:.0}-{hi:.0})"),
                spm,
            ));
        } else if spm > hi {
            issues.push(table.issue(
                IssueType::FastStrokeRate,
                format!("Stroke rate above optimal ({spm:.0} SPM - optimal {lo:.0}-{hi:.0})"),
                spm,
            ));
        }
    }

    if let Some(knee) = metrics.kick.avg_knee_angle {
        if knee < table.knee_excessive_bend {
            issues.push(table.issue(
                IssueType::ExcessiveKneeBend,
                format!(
                    "Excessive knee bend ({knee:.0}° - should be near {:.0}°)",
                    table.knee_optimal
                ),
                knee,
            ));
        }
    }

    sort_by_severity(&mut issues);
    issues
}

/// Stable sort by severity rank.
pub fn sort_by_severity(issues: &mut [Issue]) {
    issues.sort_by_key(|issue| issue.severity.rank());
}

/// Overall technique rating in `1..=10`.
///
/// Starts at 10 and deducts each issue's severity penalty. Half-point
/// results round to even (`8.5 -> 8`, `7.5 -> 8`).
pub fn overall_rating(issues: &[Issue]) -> u8 {
    let deductions: f64 = issues.iter().map(|i| i.severity.penalty()).sum();
    let score = (f64::from(MAX_RATING) - deductions).round_ties_even();
    score.clamp(f64::from(MIN_RATING), f64::from(MAX_RATING)) as u8
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
