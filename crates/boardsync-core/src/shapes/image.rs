//! Image shape.

use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// A raster image referenced by URL. Positioned by its top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub width: f64,
    pub height: f64,
    pub src: String,
}

impl Image {
    pub fn new(width: f64, height: f64, src: impl Into<String>) -> Self {
        Self {
            width,
            height,
            src: src.into(),
        }
    }

    pub(crate) fn bounds_at(&self, origin: Point) -> Rect {
        Rect::new(origin.x, origin.y, origin.x + self.width, origin.y + self.height)
    }
}
