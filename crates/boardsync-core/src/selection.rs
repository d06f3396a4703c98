//! Region and point hit-testing over the shape collection.

use crate::geometry::get_shape_bounds;
use crate::shapes::{Shape, ShapeId};
use kurbo::{Point, Rect, Vec2};
use std::sync::Arc;

/// Default pick tolerance in world units.
pub const HIT_TOLERANCE: f64 = 4.0;

/// Ids of all shapes that intersect `region`, in collection order.
///
/// Path-like shapes (freeform lines and connectors) match when one of their
/// segments crosses or lies inside the region; other shapes match on their
/// bounding box.
pub fn shapes_in_region(shapes: &[Arc<Shape>], region: Rect) -> Vec<ShapeId> {
    let region = region.abs();
    shapes
        .iter()
        .filter(|shape| intersects_region(shape, region))
        .map(|shape| shape.id)
        .collect()
}

/// Ids of shapes under `point`, topmost first.
pub fn shapes_at_point(shapes: &[Arc<Shape>], point: Point, tolerance: f64) -> Vec<ShapeId> {
    let mut hits: Vec<&Arc<Shape>> = shapes
        .iter()
        .filter(|shape| hit_test(shape, point, tolerance))
        .collect();
    hits.sort_by(|a, b| b.z_index.cmp(&a.z_index));
    hits.into_iter().map(|shape| shape.id).collect()
}

fn intersects_region(shape: &Shape, region: Rect) -> bool {
    match shape.world_points() {
        Some(points) if points.len() >= 2 => line_segments_intersect_rect(&points, region),
        _ => {
            let bounds = get_shape_bounds(shape);
            region.intersect(bounds.inflate(1.0, 1.0)).area() > 0.0
        }
    }
}

fn hit_test(shape: &Shape, point: Point, tolerance: f64) -> bool {
    match shape.world_points() {
        Some(points) if points.len() >= 2 => point_to_polyline_dist(point, &points) <= tolerance,
        _ => get_shape_bounds(shape).inflate(tolerance, tolerance).contains(point),
    }
}

/// Distance from a point to a line segment (a to b).
pub fn point_to_segment_dist(point: Point, a: Point, b: Point) -> f64 {
    let seg = b - a;
    let pv = point - a;
    let len_sq = seg.hypot2();
    if len_sq < f64::EPSILON {
        return pv.hypot();
    }
    let t = (pv.dot(seg) / len_sq).clamp(0.0, 1.0);
    let proj = a + Vec2::new(t * seg.x, t * seg.y);
    (point - proj).hypot()
}

/// Minimum distance from a point to a polyline.
pub fn point_to_polyline_dist(point: Point, points: &[Point]) -> f64 {
    points
        .windows(2)
        .map(|w| point_to_segment_dist(point, w[0], w[1]))
        .fold(f64::INFINITY, f64::min)
}

/// Whether any segment of the polyline crosses or lies inside `rect`.
fn line_segments_intersect_rect(points: &[Point], rect: Rect) -> bool {
    if points.iter().any(|p| rect.contains(*p)) {
        return true;
    }
    let corners = [
        Point::new(rect.x0, rect.y0),
        Point::new(rect.x1, rect.y0),
        Point::new(rect.x1, rect.y1),
        Point::new(rect.x0, rect.y1),
    ];
    let edges = [
        (corners[0], corners[1]),
        (corners[1], corners[2]),
        (corners[2], corners[3]),
        (corners[3], corners[0]),
    ];
    points.windows(2).any(|w| {
        edges
            .iter()
            .any(|&(c, d)| segments_intersect(w[0], w[1], c, d))
    })
}

fn segments_intersect(a: Point, b: Point, c: Point, d: Point) -> bool {
    let cross = |o: Point, p: Point, q: Point| -> f64 {
        (p.x - o.x) * (q.y - o.y) - (p.y - o.y) * (q.x - o.x)
    };
    let d1 = cross(c, d, a);
    let d2 = cross(c, d, b);
    let d3 = cross(a, b, c);
    let d4 = cross(a, b, d);
    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }
    // Collinear: an endpoint lies on the other segment
    let on_segment = |p: Point, q: Point, r: Point| -> bool {
        r.x >= p.x.min(q.x) && r.x <= p.x.max(q.x) && r.y >= p.y.min(q.y) && r.y <= p.y.max(q.y)
    };
    (d1.abs() < 1e-10 && on_segment(c, d, a))
        || (d2.abs() < 1e-10 && on_segment(c, d, b))
        || (d3.abs() < 1e-10 && on_segment(a, b, c))
        || (d4.abs() < 1e-10 && on_segment(a, b, d))
}
