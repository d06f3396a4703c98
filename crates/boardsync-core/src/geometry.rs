//! Pure geometry over shapes: bounds, ray/edge intersection and connector routing.
//!
//! Nothing in here fails. A shape with unusable numbers degrades to a
//! zero-size box at its origin, and a connector whose endpoints cannot be
//! resolved keeps an empty point list (its bounds fall back to a unit segment).

use crate::shapes::{Connector, Endpoint, Shape, ShapeId};
use kurbo::{Point, Rect, Vec2};
use std::collections::HashMap;
use std::sync::Arc;

fn is_finite_rect(rect: Rect) -> bool {
    rect.x0.is_finite() && rect.y0.is_finite() && rect.x1.is_finite() && rect.y1.is_finite()
}

/// Axis-aligned bounding box of a shape in world coordinates.
pub fn get_shape_bounds(shape: &Shape) -> Rect {
    let bounds = shape.raw_bounds();
    if is_finite_rect(bounds) {
        return bounds.abs();
    }
    let origin = shape.position();
    if origin.x.is_finite() && origin.y.is_finite() {
        Rect::from_points(origin, origin)
    } else {
        Rect::ZERO
    }
}

/// Where a ray from `(center_x, center_y)` toward `(toward_x, toward_y)` leaves `bounds`.
///
/// The scale needed to reach the horizontal extent is compared with the scale
/// needed to reach the vertical extent and the smaller one wins. A zero-length
/// ray returns the center unchanged.
pub fn edge_intersection(
    bounds: Rect,
    center_x: f64,
    center_y: f64,
    toward_x: f64,
    toward_y: f64,
) -> Point {
    let dx = toward_x - center_x;
    let dy = toward_y - center_y;
    if dx.abs() < f64::EPSILON && dy.abs() < f64::EPSILON {
        return Point::new(center_x, center_y);
    }

    let half_w = bounds.width() / 2.0;
    let half_h = bounds.height() / 2.0;
    let scale_x = if dx.abs() > f64::EPSILON {
        half_w / dx.abs()
    } else {
        f64::INFINITY
    };
    let scale_y = if dy.abs() > f64::EPSILON {
        half_h / dy.abs()
    } else {
        f64::INFINITY
    };
    let scale = scale_x.min(scale_y);

    Point::new(center_x + dx * scale, center_y + dy * scale)
}

/// Canonical key for an unordered endpoint pair: `key(a, b) == key(b, a)`.
pub fn connector_pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}|{b}")
    } else {
        format!("{b}|{a}")
    }
}

/// Index shapes by id for endpoint resolution.
pub fn index_shapes(shapes: &[Arc<Shape>]) -> HashMap<ShapeId, &Shape> {
    shapes.iter().map(|s| (s.id, s.as_ref())).collect()
}

/// Reference point of an endpoint: the center of a tracked shape, or the free point.
pub fn endpoint_anchor(endpoint: &Endpoint, lookup: &HashMap<ShapeId, &Shape>) -> Option<Point> {
    match *endpoint {
        Endpoint::Shape { shape_id } => lookup
            .get(&shape_id)
            .map(|shape| get_shape_bounds(shape).center()),
        Endpoint::Point { x, y } if x.is_finite() && y.is_finite() => Some(Point::new(x, y)),
        Endpoint::Point { .. } => None,
    }
}

fn resolve_endpoint(
    endpoint: &Endpoint,
    anchor: Point,
    toward: Point,
    lookup: &HashMap<ShapeId, &Shape>,
) -> Point {
    match endpoint.tracked_id().and_then(|id| lookup.get(&id)) {
        Some(shape) => edge_intersection(get_shape_bounds(shape), anchor.x, anchor.y, toward.x, toward.y),
        None => anchor,
    }
}

/// Unit normal of the pair direction, oriented from the lower key to the higher
/// one so that `a -> b` and `b -> a` connectors fan out on the same side convention.
fn fanout_normal(from: &Endpoint, to: &Endpoint, from_anchor: Point, to_anchor: Point) -> Vec2 {
    let dir = if from.key() <= to.key() {
        to_anchor - from_anchor
    } else {
        from_anchor - to_anchor
    };
    let len = dir.hypot();
    if len < f64::EPSILON {
        Vec2::ZERO
    } else {
        Vec2::new(-dir.y / len, dir.x / len)
    }
}

/// Perpendicular offset per connector, spreading connectors that share an
/// endpoint pair evenly around the pair's midline. Offsets are assigned in id
/// order within each pair, so they do not depend on declaration order.
pub fn fanout_offsets(shapes: &[Arc<Shape>], spacing: f64) -> HashMap<ShapeId, f64> {
    let mut groups: HashMap<String, Vec<ShapeId>> = HashMap::new();
    for shape in shapes {
        if let Some(connector) = shape.as_connector() {
            let key = connector_pair_key(&connector.from.key(), &connector.to.key());
            groups.entry(key).or_default().push(shape.id);
        }
    }

    let mut offsets = HashMap::new();
    for mut ids in groups.into_values() {
        ids.sort();
        let middle = (ids.len() as f64 - 1.0) / 2.0;
        for (i, id) in ids.into_iter().enumerate() {
            offsets.insert(id, (i as f64 - middle) * spacing);
        }
    }
    offsets
}

/// Resolve a connector's two screen points.
///
/// Tracked endpoints land where the line toward the other endpoint crosses
/// the tracked shape's bounds; free endpoints are used literally. Both ends
/// are shifted by `offset` along the pair normal. Returns an empty list when
/// either endpoint cannot be resolved.
pub fn compute_connector_points(
    connector: &Connector,
    lookup: &HashMap<ShapeId, &Shape>,
    offset: f64,
) -> Vec<Point> {
    let (Some(from_anchor), Some(to_anchor)) = (
        endpoint_anchor(&connector.from, lookup),
        endpoint_anchor(&connector.to, lookup),
    ) else {
        return Vec::new();
    };

    let shift = fanout_normal(&connector.from, &connector.to, from_anchor, to_anchor) * offset;
    let from_anchor = from_anchor + shift;
    let to_anchor = to_anchor + shift;

    vec![
        resolve_endpoint(&connector.from, from_anchor, to_anchor, lookup),
        resolve_endpoint(&connector.to, to_anchor, from_anchor, lookup),
    ]
}

/// Derived points for every connector on the board.
pub fn compute_all_connector_points(
    shapes: &[Arc<Shape>],
    spacing: f64,
) -> HashMap<ShapeId, Vec<Point>> {
    let lookup = index_shapes(shapes);
    let offsets = fanout_offsets(shapes, spacing);
    shapes
        .iter()
        .filter_map(|shape| {
            let connector = shape.as_connector()?;
            let offset = offsets.get(&shape.id).copied().unwrap_or(0.0);
            Some((shape.id, compute_connector_points(connector, &lookup, offset)))
        })
        .collect()
}
