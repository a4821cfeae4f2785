//! 2D joint geometry.

use crate::pose::Landmark;

/// Segments shorter than this (in pixels) are treated as degenerate.
const MIN_SEGMENT_LEN: f64 = 1e-9;

/// Angle in degrees at `vertex` between the segments to `a` and `c`.
///
/// Computed as `atan2(|cross|, dot)`, which stays accurate near 0° and 180°
/// where `acos` of the cosine loses most of its precision. Returns `None`
/// when either segment has zero length.
pub fn joint_angle(a: &Landmark, vertex: &Landmark, c: &Landmark) -> Option<f64> {
    let (v1x, v1y) = (a.x - vertex.x, a.y - vertex.y);
    let (v2x, v2y) = (c.x - vertex.x, c.y - vertex.y);

    let n1 = v1x.hypot(v1y);
    let n2 = v2x.hypot(v2y);
    if n1 < MIN_SEGMENT_LEN || n2 < MIN_SEGMENT_LEN {
        return None;
    }

    let cross = v1x * v2y - v1y * v2x;
    let dot = v1x * v2x + v1y * v2y;
    Some(cross.abs().atan2(dot).to_degrees())
}
