//! Ellipse shape.

use super::SerializableColor;
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// An ellipse. Positioned by its center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ellipse {
    /// Horizontal radius.
    pub radius_x: f64,
    /// Vertical radius.
    pub radius_y: f64,
    pub fill: SerializableColor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<SerializableColor>,
    #[serde(default)]
    pub stroke_width: f64,
}

impl Ellipse {
    /// Create a new ellipse.
    pub fn new(radius_x: f64, radius_y: f64) -> Self {
        Self {
            radius_x,
            radius_y,
            fill: SerializableColor::new(255, 210, 210, 255),
            stroke: None,
            stroke_width: 0.0,
        }
    }

    /// Create a circle.
    pub fn circle(radius: f64) -> Self {
        Self::new(radius, radius)
    }

    pub(crate) fn bounds_at(&self, center: Point) -> Rect {
        Rect::new(
            center.x - self.radius_x,
            center.y - self.radius_y,
            center.x + self.radius_x,
            center.y + self.radius_y,
        )
    }
}
