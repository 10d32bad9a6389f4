use crate::session::StrokePoint;

/// Line segments used to flatten each quadratic curve.
pub const CURVE_SEGMENTS: usize = 8;

/// Flattens a recorded stroke into a polyline using quadratic-midpoint
/// smoothing: every interior point is the control point of a quadratic curve
/// running between the midpoints of its neighbouring segments. The first and
/// last points are kept exactly.
pub fn smooth_stroke(points: &[StrokePoint]) -> Vec<StrokePoint> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let mut out = Vec::with_capacity(points.len() * CURVE_SEGMENTS);
    let mut current = points[0];
    out.push(current);
    for idx in 1..points.len() - 1 {
        let control = points[idx];
        let end = control.midpoint(&points[idx + 1]);
        for step in 1..=CURVE_SEGMENTS {
            let t = step as f32 / CURVE_SEGMENTS as f32;
            let inv = 1.0 - t;
            out.push(StrokePoint::new(
                inv * inv * current.x + 2.0 * inv * t * control.x + t * t * end.x,
                inv * inv * current.y + 2.0 * inv * t * control.y + t * t * end.y,
            ));
        }
        current = end;
    }
    out.push(points[points.len() - 1]);
    out
}
