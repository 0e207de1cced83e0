use glam::DVec2;

use crate::types::Aabb;

/// Per-axis overlap extents between two boxes. `None` when the boxes are
/// separated on either axis; degenerate (zero-extent) touches still count,
/// which is what lets a perfectly horizontal bullet sweep (a zero-height
/// box) register against its targets.
pub fn overlap_extents(a: &Aabb, b: &Aabb) -> Option<DVec2> {
    let width = a.max.x.min(b.max.x) - a.min.x.max(b.min.x);
    let height = a.max.y.min(b.max.y) - a.min.y.max(b.min.y);
    if width < 0.0 || height < 0.0 {
        return None;
    }
    Some(DVec2::new(width, height))
}

/// Precomputed ratios of the line `a*x + b*y + c = 0` through a bullet's
/// flight path, with `a = -force.y`, `b = force.x`,
/// `c = origin.x * force.y - origin.y * force.x`. Each edge probe then costs
/// one multiply and one add.
///
/// Axis-aligned paths make one ratio pair non-finite; the corresponding
/// probes are skipped, so such bullets can only cross the edge pair
/// perpendicular to their travel.
#[derive(Copy, Clone, Debug)]
pub struct LineCoefs {
    pub ab: f64,
    pub ba: f64,
    pub ca: f64,
    pub cb: f64,
}

impl LineCoefs {
    pub fn for_ray(origin: DVec2, force: DVec2) -> Self {
        let a = -force.y;
        let b = force.x;
        let c = origin.x * force.y - origin.y * force.x;
        Self {
            ab: a / b,
            ba: b / a,
            ca: c / a,
            cb: c / b,
        }
    }

    /// Y at a vertical edge `x = k`.
    fn y_at(&self, k: f64) -> f64 {
        -self.ab * k - self.cb
    }

    /// X at a horizontal edge `y = k`.
    fn x_at(&self, k: f64) -> f64 {
        -self.ba * k - self.ca
    }
}

/// Nearest crossing of the line through `coefs` with the four edges of
/// `target`, ranked by Manhattan distance from `from` (monotone in the swept
/// parameter, no square root). Crossings must fall strictly inside the edge's
/// interval; grazing a corner misses. Ties keep the earliest probe in
/// min-x, max-x, min-y, max-y order.
pub fn nearest_edge_crossing(coefs: &LineCoefs, from: DVec2, target: &Aabb) -> Option<(DVec2, f64)> {
    let mut best: Option<(DVec2, f64)> = None;
    let mut consider = |p: DVec2| {
        let dist = (p.x - from.x).abs() + (p.y - from.y).abs();
        if best.map_or(true, |(_, d)| dist < d) {
            best = Some((p, dist));
        }
    };
    if coefs.ab.is_finite() && coefs.cb.is_finite() {
        for x in [target.min.x, target.max.x] {
            let y = coefs.y_at(x);
            if y > target.min.y && y < target.max.y {
                consider(DVec2::new(x, y));
            }
        }
    }
    if coefs.ba.is_finite() && coefs.ca.is_finite() {
        for y in [target.min.y, target.max.y] {
            let x = coefs.x_at(y);
            if x > target.min.x && x < target.max.x {
                consider(DVec2::new(x, y));
            }
        }
    }
    best
}
