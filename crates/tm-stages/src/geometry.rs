//! Planar polygon distance tests used by collision negotiation.
//!
//! Boundaries are open vertex rings in the x/y plane (z is handled
//! separately by the vertical-overlap filter).  Distance between two
//! polygons is zero when they intersect or one contains the other,
//! otherwise the minimum distance between their edges.

use tm_core::Vec3;

/// Minimum planar distance between two polygons; `0.0` when they overlap.
pub fn polygon_distance(a: &[Vec3], b: &[Vec3]) -> f32 {
    if a.is_empty() || b.is_empty() {
        return f32::INFINITY;
    }
    if polygons_overlap(a, b) {
        return 0.0;
    }
    let mut min = f32::INFINITY;
    for ea in edges(a) {
        for eb in edges(b) {
            let d = segment_distance(ea.0, ea.1, eb.0, eb.1);
            if d < min {
                min = d;
            }
        }
    }
    min
}

/// `true` when the polygons intersect or one lies inside the other.
pub fn polygons_overlap(a: &[Vec3], b: &[Vec3]) -> bool {
    for ea in edges(a) {
        for eb in edges(b) {
            if segments_intersect(ea.0, ea.1, eb.0, eb.1) {
                return true;
            }
        }
    }
    // No edge crossing: containment is the only remaining overlap case.
    point_in_polygon(a[0], b) || point_in_polygon(b[0], a)
}

fn edges(poly: &[Vec3]) -> impl Iterator<Item = (Vec3, Vec3)> + '_ {
    (0..poly.len()).map(|i| (poly[i], poly[(i + 1) % poly.len()]))
}

/// Even-odd ray cast along +x.
fn point_in_polygon(p: Vec3, poly: &[Vec3]) -> bool {
    let mut inside = false;
    for (a, b) in edges(poly) {
        if (a.y > p.y) != (b.y > p.y) {
            let t = (p.y - a.y) / (b.y - a.y);
            if p.x < a.x + t * (b.x - a.x) {
                inside = !inside;
            }
        }
    }
    inside
}

fn orient(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn on_segment(a: Vec3, b: Vec3, p: Vec3) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

fn segments_intersect(p1: Vec3, p2: Vec3, q1: Vec3, q2: Vec3) -> bool {
    let o1 = orient(p1, p2, q1);
    let o2 = orient(p1, p2, q2);
    let o3 = orient(q1, q2, p1);
    let o4 = orient(q1, q2, p2);

    if ((o1 > 0.0) != (o2 > 0.0)) && ((o3 > 0.0) != (o4 > 0.0)) {
        return true;
    }
    // Collinear endpoint touches.
    (o1 == 0.0 && on_segment(p1, p2, q1))
        || (o2 == 0.0 && on_segment(p1, p2, q2))
        || (o3 == 0.0 && on_segment(q1, q2, p1))
        || (o4 == 0.0 && on_segment(q1, q2, p2))
}

fn point_segment_distance(p: Vec3, a: Vec3, b: Vec3) -> f32 {
    let ab = Vec3::new(b.x - a.x, b.y - a.y, 0.0);
    let ap = Vec3::new(p.x - a.x, p.y - a.y, 0.0);
    let len2 = ab.x * ab.x + ab.y * ab.y;
    if len2 <= f32::EPSILON {
        return (ap.x * ap.x + ap.y * ap.y).sqrt();
    }
    let t = ((ap.x * ab.x + ap.y * ab.y) / len2).clamp(0.0, 1.0);
    let dx = p.x - (a.x + t * ab.x);
    let dy = p.y - (a.y + t * ab.y);
    (dx * dx + dy * dy).sqrt()
}

fn segment_distance(p1: Vec3, p2: Vec3, q1: Vec3, q2: Vec3) -> f32 {
    if segments_intersect(p1, p2, q1, q2) {
        return 0.0;
    }
    point_segment_distance(p1, q1, q2)
        .min(point_segment_distance(p2, q1, q2))
        .min(point_segment_distance(q1, p1, p2))
        .min(point_segment_distance(q2, p1, p2))
}
