//! Connector shape: a line between two endpoints.

use super::freeform::padded_point_bounds;
use super::{SerializableColor, ShapeId};
use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Length of the placeholder segment drawn for an unresolvable connector.
pub const FALLBACK_SEGMENT_LENGTH: f64 = 1.0;

/// One end of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Endpoint {
    /// Attached to another shape; the position follows that shape's bounds.
    Shape {
        #[serde(rename = "shapeId")]
        shape_id: ShapeId,
    },
    /// A free-standing point in world coordinates.
    Point { x: f64, y: f64 },
}

impl Endpoint {
    /// The shape this endpoint is attached to, if tracked.
    pub fn tracked_id(&self) -> Option<ShapeId> {
        match self {
            Endpoint::Shape { shape_id } => Some(*shape_id),
            Endpoint::Point { .. } => None,
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, Endpoint::Point { .. })
    }

    /// Stable textual identity used to group connectors by endpoint pair.
    pub fn key(&self) -> String {
        match self {
            Endpoint::Shape { shape_id } => shape_id.to_string(),
            Endpoint::Point { x, y } => format!("@{x},{y}"),
        }
    }

    /// Free points move by `delta`; tracked endpoints are unchanged.
    pub fn translated(&self, delta: Vec2) -> Self {
        match *self {
            Endpoint::Point { x, y } => Endpoint::Point {
                x: x + delta.x,
                y: y + delta.y,
            },
            tracked => tracked,
        }
    }

    /// Re-target a tracked endpoint through an id mapping (used when copying).
    pub fn remapped(&self, ids: &HashMap<ShapeId, ShapeId>) -> Self {
        match *self {
            Endpoint::Shape { shape_id } => Endpoint::Shape {
                shape_id: ids.get(&shape_id).copied().unwrap_or(shape_id),
            },
            free => free,
        }
    }
}

fn default_stroke_width() -> f64 {
    2.0
}

/// A connector between two endpoints.
///
/// `points` is derived geometry: it is recomputed from the endpoints whenever
/// the board changes and is never written to records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    pub from: Endpoint,
    pub to: Endpoint,
    pub stroke: SerializableColor,
    #[serde(default = "default_stroke_width")]
    pub stroke_width: f64,
    /// Draw an arrowhead at the `to` end.
    #[serde(default)]
    pub arrow_head: bool,
    #[serde(skip)]
    pub points: Vec<Point>,
}

impl Connector {
    pub fn new(from: Endpoint, to: Endpoint) -> Self {
        Self {
            from,
            to,
            stroke: SerializableColor::black(),
            stroke_width: default_stroke_width(),
            arrow_head: true,
            points: Vec::new(),
        }
    }

    /// Whether either endpoint is attached to `id`.
    pub fn references(&self, id: ShapeId) -> bool {
        self.from.tracked_id() == Some(id) || self.to.tracked_id() == Some(id)
    }

    pub fn has_free_endpoint(&self) -> bool {
        self.from.is_free() || self.to.is_free()
    }

    pub(crate) fn translate_free_endpoints(&mut self, delta: Vec2) {
        self.from = self.from.translated(delta);
        self.to = self.to.translated(delta);
    }

    pub(crate) fn bounds_at(&self, origin: Point) -> Rect {
        padded_point_bounds(&self.points, self.stroke_width).unwrap_or_else(|| {
            let end = Point::new(origin.x + FALLBACK_SEGMENT_LENGTH, origin.y);
            let pad = self.stroke_width.max(0.0) / 2.0;
            Rect::from_points(origin, end).inflate(pad, pad)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_endpoint_serialization() {
        let id = Uuid::new_v4();
        let tracked = serde_json::to_value(Endpoint::Shape { shape_id: id }).unwrap();
        assert_eq!(tracked["kind"], "shape");
        assert_eq!(tracked["shapeId"], id.to_string());

        let free = serde_json::to_value(Endpoint::Point { x: 1.0, y: 2.0 }).unwrap();
        assert_eq!(free["kind"], "point");
    }

    #[test]
    fn test_derived_points_are_not_serialized() {
        let mut connector = Connector::new(Endpoint::Point { x: 0.0, y: 0.0 }, Endpoint::Point { x: 9.0, y: 9.0 });
        connector.points = vec![Point::ZERO, Point::new(9.0, 9.0)];
        let value = serde_json::to_value(&connector).unwrap();
        assert!(value.get("points").is_none());
    }

    #[test]
    fn test_unresolved_connector_bounds_fall_back_to_unit_segment() {
        let connector = Connector::new(
            Endpoint::Shape { shape_id: Uuid::new_v4() },
            Endpoint::Shape { shape_id: Uuid::new_v4() },
        );
        let bounds = connector.bounds_at(Point::new(10.0, 10.0));
        assert!((bounds.width() - (FALLBACK_SEGMENT_LENGTH + connector.stroke_width)).abs() < 1e-9);
        assert!(bounds.x0 <= 10.0 && bounds.x1 >= 11.0);
    }

    #[test]
    fn test_remap_only_touches_tracked_endpoints() {
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();
        let ids = HashMap::from([(old, new)]);

        assert_eq!(
            Endpoint::Shape { shape_id: old }.remapped(&ids),
            Endpoint::Shape { shape_id: new }
        );
        assert_eq!(
            Endpoint::Point { x: 1.0, y: 1.0 }.remapped(&ids),
            Endpoint::Point { x: 1.0, y: 1.0 }
        );
    }
}
