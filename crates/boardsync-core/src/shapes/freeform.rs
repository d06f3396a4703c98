//! Freeform line shape.

use super::SerializableColor;
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Bounds of a polyline padded by half the stroke width.
pub(crate) fn padded_point_bounds(points: &[Point], stroke_width: f64) -> Option<Rect> {
    let first = points.first()?;
    let mut bounds = Rect::from_points(*first, *first);
    for point in &points[1..] {
        bounds = bounds.union_pt(*point);
    }
    let pad = stroke_width.max(0.0) / 2.0;
    Some(bounds.inflate(pad, pad))
}

/// A hand-drawn or straight polyline. Points are relative to the shape's `x`/`y`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Freeform {
    #[serde(default)]
    pub points: Vec<Point>,
    pub stroke: SerializableColor,
    pub stroke_width: f64,
}

impl Freeform {
    pub fn new(points: Vec<Point>) -> Self {
        Self {
            points,
            stroke: SerializableColor::black(),
            stroke_width: 2.0,
        }
    }

    /// Points translated into world coordinates.
    pub fn world_points(&self, origin: Point) -> Vec<Point> {
        self.points
            .iter()
            .map(|p| Point::new(origin.x + p.x, origin.y + p.y))
            .collect()
    }

    pub(crate) fn bounds_at(&self, origin: Point) -> Rect {
        padded_point_bounds(&self.world_points(origin), self.stroke_width)
            .unwrap_or_else(|| Rect::from_points(origin, origin))
    }
}
