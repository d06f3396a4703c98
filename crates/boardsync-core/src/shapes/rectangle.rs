//! Rectangle shape.

use super::SerializableColor;
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// A rectangle with optional rounded corners. Positioned by its top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rectangle {
    pub width: f64,
    pub height: f64,
    pub fill: SerializableColor,
    /// Outline color (None = no outline).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<SerializableColor>,
    #[serde(default)]
    pub stroke_width: f64,
    /// Corner radius (0 = sharp corners).
    #[serde(default)]
    pub corner_radius: f64,
}

impl Rectangle {
    /// Create a new rectangle.
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            fill: SerializableColor::new(200, 220, 255, 255),
            stroke: None,
            stroke_width: 0.0,
            corner_radius: 0.0,
        }
    }

    pub(crate) fn bounds_at(&self, origin: Point) -> Rect {
        Rect::new(origin.x, origin.y, origin.x + self.width, origin.y + self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        let rect = Rectangle::new(100.0, 50.0);
        let bounds = rect.bounds_at(Point::new(10.0, 20.0));
        assert!((bounds.x0 - 10.0).abs() < f64::EPSILON);
        assert!((bounds.y0 - 20.0).abs() < f64::EPSILON);
        assert!((bounds.x1 - 110.0).abs() < f64::EPSILON);
        assert!((bounds.y1 - 70.0).abs() < f64::EPSILON);
    }
}
