//! Plain-text coaching report.

use std::fmt::Write as _;

use crate::analysis::Analysis;
use crate::metrics::MetricBundle;
use crate::rules::{Issue, RuleTable, Severity};

const RULE: &str = "------------------------------------------------------------";

/// Moderate issues listed in the action plan after every critical one.
const ACTION_PLAN_MODERATE: usize = 2;

/// One-line summary logged at job completion.
pub fn summary(analysis: &Analysis) -> String {
    format!(
        "Score: {}/10 | Critical Issues: {} | Areas for Improvement: {}",
        analysis.rating,
        analysis.count(Severity::Critical),
        analysis.count(Severity::Moderate),
    )
}

/// Render the full report for a finished analysis.
pub fn render(analysis: &Analysis, table: &RuleTable) -> String {
    let mut out = Report::default();

    out.line("YOUR SWIM ANALYSIS");
    out.blank();

    if !analysis.pose_detected {
        render_no_pose(&mut out, &analysis.metrics);
        return out.finish();
    }

    let critical: Vec<&Issue> = by_severity(&analysis.issues, Severity::Critical);
    let moderate: Vec<&Issue> = by_severity(&analysis.issues, Severity::Moderate);

    out.line(&format!("Overall Technique Score: {}/10", analysis.rating));
    out.blank();

    out.section("QUICK INSIGHT");
    out.line(&quick_insight(analysis.rating, critical.first().copied()));
    out.blank();

    if let Some(top) = critical.first() {
        out.section("BIGGEST RED FLAG");
        out.line(&format!("! {}", top.description));
        out.blank();
        out.line("HOW TO FIX IT:");
        out.line(&format!("   {}", top.coaching_tip));
        let others = critical.len() - 1;
        if others > 0 {
            let plural = if others > 1 { "s" } else { "" };
            out.line(&format!("   (+ {others} more critical issue{plural} detected)"));
        }
        out.blank();
    }

    let strengths = strengths(&analysis.metrics, &analysis.issues, table);
    if !strengths.is_empty() {
        out.section("WHAT'S WORKING");
        for s in strengths {
            out.line(&format!("* {s}"));
        }
        out.blank();
    }

    if !critical.is_empty() || !moderate.is_empty() {
        out.section("YOUR ACTION PLAN");
        out.line("Focus on these in order:");
        out.blank();
        let plan = critical
            .iter()
            .map(|i| ("FIX THIS FIRST", *i))
            .chain(moderate.iter().take(ACTION_PLAN_MODERATE).map(|i| ("IMPORTANT", *i)));
        for (n, (label, issue)) in plan.enumerate() {
            out.line(&format!("{}. {label}: {}", n + 1, issue.description));
            out.line(&format!("   -> {}", issue.coaching_tip));
            out.blank();
        }
    }

    if !analysis.issues.is_empty() {
        out.section("DETAILED BREAKDOWN");
        for severity in [Severity::Critical, Severity::Moderate, Severity::Minor] {
            let group = by_severity(&analysis.issues, severity);
            if group.is_empty() {
                continue;
            }
            out.line(&format!("{}:", severity.label()));
            for issue in group {
                out.line(&format!("  * {}", issue.description));
                out.line(&format!("    -> {}", issue.coaching_tip));
            }
            out.blank();
        }
    }

    out.section("YOUR NUMBERS");
    format_metrics(&mut out, &analysis.metrics, table);
    out.blank();

    if analysis.issues.is_empty() {
        out.section("EXCELLENT TECHNIQUE!");
        out.line("No major technique issues detected! Your freestyle form is solid.");
        out.line("Keep up the great work and maintain that consistency!");
        out.blank();
    }

    out.line(RULE);
    out.line("PRO TIP: Focus on fixing one issue at a time.");
    out.line("   Trying to change everything at once = slower progress!");
    out.line(RULE);

    out.finish()
}

fn render_no_pose(out: &mut Report, metrics: &MetricBundle) {
    out.line("Overall Technique Score: not available");
    out.blank();
    out.section("NO SWIMMER DETECTED");
    out.line("No swimmer pose was detected in any analysed frame.");
    out.line("No technique assessment was possible for this video.");
    out.blank();
    out.section("FILMING TIPS");
    out.line("* Film from the side with the whole body in frame.");
    out.line("* Use good lighting and avoid heavy splash or glare.");
    out.line("* Keep the camera steady and close enough that the swimmer fills the frame.");
    out.blank();
    out.line(&format!(
        "Frames sampled: {} (0.0% with a detected pose)",
        metrics.total_frames
    ));
}

fn by_severity(issues: &[Issue], severity: Severity) -> Vec<&Issue> {
    issues.iter().filter(|i| i.severity == severity).collect()
}

fn quick_insight(rating: u8, top_critical: Option<&Issue>) -> String {
    let name = top_critical.map(|i| i.issue_type.as_str().replace('_', " "));
    match (rating, name) {
        (9.., _) => {
            "Your technique is Olympic-level! Maintain this form and focus on consistency.".into()
        }
        (7..=8, Some(name)) => format!(
            "Solid foundation, but you're losing speed/efficiency due to: {name}. Fix that and you'll see big gains!"
        ),
        (7..=8, None) => {
            "Good technique overall! A few tweaks and you'll be swimming like a pro.".into()
        }
        (5..=6, Some(name)) => format!(
            "Your biggest issue is: {name}. This is costing you the most energy and speed. Focus here first!"
        ),
        (5..=6, None) => {
            "Several areas need work, but they're all fixable! Follow the action plan below.".into()
        }
        (_, Some(name)) => format!(
            "Red flag alert: {name}. This is significantly impacting your swim. Let's fix it step by step!"
        ),
        (_, None) => {
            "You're just getting started! Follow the action plan and you'll see improvement quickly."
                .into()
        }
    }
}

fn in_band(value: Option<f64>, (lo, hi): (f64, f64)) -> bool {
    value.is_some_and(|v| (lo..=hi).contains(&v))
}

fn strengths(metrics: &MetricBundle, issues: &[Issue], table: &RuleTable) -> Vec<&'static str> {
    let mut out = Vec::new();
    if in_band(metrics.elbow.avg_angle, table.elbow_optimal) {
        out.push("Great elbow catch angle - you're engaging your lats properly!");
    }
    if in_band(metrics.rotation.avg_rotation, table.rotation_optimal) {
        out.push("Excellent body rotation - you're using your core effectively!");
    }
    if metrics
        .head
        .stability
        .is_some_and(|s| s > table.head_stability_strength)
    {
        out.push("Solid head position - you're maintaining good alignment!");
    }
    if in_band(metrics.stroke_rate.spm, table.stroke_rate_optimal) {
        out.push("Optimal stroke rate - nice rhythm and tempo!");
    }
    if out.is_empty() && issues.len() <= 2 {
        out.push("Your overall form is consistent across the video!");
    }
    out
}

fn format_metrics(out: &mut Report, m: &MetricBundle, table: &RuleTable) {
    if let Some(avg) = m.elbow.avg_angle {
        let (lo, hi) = table.elbow_optimal;
        out.line("Elbow Catch Angle:");
        out.line(&format!("   Average: {avg:.1}° (optimal: {lo:.0}-{hi:.0}°)"));
        if let (Some(l), Some(r)) = (m.elbow.left_avg, m.elbow.right_avg) {
            out.line(&format!("   Left: {l:.1}° | Right: {r:.1}°"));
        }
        out.blank();
    }

    if let Some(avg) = m.rotation.avg_rotation {
        let (lo, hi) = table.rotation_optimal;
        out.line("Body Rotation:");
        out.line(&format!("   Average: {avg:.1}° (optimal: {lo:.0}-{hi:.0}°)"));
        if let (Some(min), Some(max)) = (m.rotation.min_rotation, m.rotation.max_rotation) {
            out.line(&format!("   Range: {min:.1}° - {max:.1}°"));
        }
        out.blank();
    }

    if let Some(max) = m.entry.max_crossing {
        out.line("Arm Entry:");
        out.line(&format!(
            "   Widest entry: {:.1}% of frame width from center (limit: {:.0}%)",
            max * 100.0,
            table.centerline_threshold * 100.0
        ));
        out.blank();
    }

    if let Some(spm) = m.stroke_rate.spm {
        let (lo, hi) = table.stroke_rate_optimal;
        out.line("Stroke Rate:");
        out.line(&format!("   {spm:.1} strokes per minute (optimal: {lo:.0}-{hi:.0} SPM)"));
        if let (Some(duration), Some(strokes)) = (m.stroke_rate.duration, m.stroke_rate.total_strokes) {
            out.line(&format!("   Duration: {duration:.1}s | Total strokes: {strokes}"));
        }
        out.blank();
    }

    if let Some(stability) = m.head.stability {
        out.line(&format!(
            "Head Stability: {:.1}% (higher is better)",
            stability * 100.0
        ));
        out.blank();
    }

    if let Some(knee) = m.kick.avg_knee_angle {
        out.line("Kick Mechanics:");
        out.line(&format!(
            "   Knee angle: {knee:.1}° (should be near {:.0}°)",
            table.knee_optimal
        ));
        out.blank();
    }

    out.line(&format!(
        "Detection Quality: {:.1}% of frames analyzed",
        m.valid_frame_ratio * 100.0
    ));
}

#[derive(Default)]
struct Report {
    buf: String,
}

impl Report {
    fn line(&mut self, text: &str) {
        // Writing to a String cannot fail.
        let _ = writeln!(self.buf, "{text}");
    }

    fn blank(&mut self) {
        self.buf.push('\n');
    }

    fn section(&mut self, title: &str) {
        self.line(title);
        self.line(RULE);
    }

    fn finish(self) -> String {
        self.buf.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::pose::{FrameSize, PoseFrame};
    use crate::rules::{detect_issues, overall_rating};

    fn analysis_from(metrics: MetricBundle) -> Analysis {
        let issues = detect_issues(&metrics, &RuleTable::freestyle());
        let rating = overall_rating(&issues);
        Analysis {
            pose_detected: metrics.valid_frames > 0,
            metrics,
            issues,
            rating,
        }
    }

    #[test]
    fn no_pose_report_never_claims_excellent_technique() {
        let frames = vec![
            PoseFrame {
                frame_index: 0,
                timestamp: 0.0,
                landmarks: None,
            };
            4
        ];
        let analysis = analyze(&frames, FrameSize::new(640, 480), 0.5, &RuleTable::freestyle());
        let report = render(&analysis, &RuleTable::freestyle());

        assert!(report.contains("No swimmer pose was detected"));
        assert!(report.contains("No technique assessment was possible"));
        assert!(!report.contains("EXCELLENT"));
        assert!(!report.contains("10/10"));
    }

    #[test]
    fn clean_analysis_celebrates() {
        let mut metrics = MetricBundle::default();
        metrics.elbow.avg_angle = Some(90.0);
        metrics.valid_frames = 10;
        metrics.total_frames = 10;
        metrics.valid_frame_ratio = 1.0;
        let report = render(&analysis_from(metrics), &RuleTable::freestyle());

        assert!(report.contains("Overall Technique Score: 10/10"));
        assert!(report.contains("EXCELLENT TECHNIQUE!"));
        assert!(report.contains("Great elbow catch angle"));
        assert!(report.contains("Average: 90.0° (optimal: 80-100°)"));
        assert!(report.contains("Detection Quality: 100.0% of frames analyzed"));
    }

    #[test]
    fn critical_issue_leads_the_report() {
        let mut metrics = MetricBundle::default();
        metrics.elbow.avg_angle = Some(130.0);
        metrics.entry.max_crossing = Some(0.3);
        metrics.kick.avg_knee_angle = Some(120.0);
        metrics.valid_frames = 10;
        metrics.total_frames = 10;
        metrics.valid_frame_ratio = 1.0;
        let analysis = analysis_from(metrics);
        let report = render(&analysis, &RuleTable::freestyle());

        assert_eq!(analysis.rating, 5);
        assert!(report.contains("Your biggest issue is: dropped elbow."));
        assert!(report.contains("! Dropped elbow during catch (avg 130° - should be 80-100°)"));
        assert!(report.contains("(+ 1 more critical issue detected)"));
        assert!(report.contains("1. FIX THIS FIRST: Dropped elbow"));
        assert!(report.contains("2. FIX THIS FIRST: Crossing centerline"));
        assert!(report.contains("3. IMPORTANT: Excessive knee bend"));
        assert!(!report.contains("EXCELLENT"));

        let flag = report.find("BIGGEST RED FLAG").unwrap();
        let plan = report.find("YOUR ACTION PLAN").unwrap();
        let numbers = report.find("YOUR NUMBERS").unwrap();
        assert!(flag < plan && plan < numbers);
    }

    #[test]
    fn summary_counts_by_severity() {
        let mut metrics = MetricBundle::default();
        metrics.elbow.avg_angle = Some(130.0);
        metrics.head.vertical_movement = Some(0.5);
        metrics.valid_frames = 1;
        let analysis = analysis_from(metrics);
        assert_eq!(
            summary(&analysis),
            "Score: 7/10 | Critical Issues: 1 | Areas for Improvement: 1"
        );
    }
}
