//! Frame shape: a titled container other shapes can live inside.

use super::SerializableColor;
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// A container shape. Children point at it through their `parentId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub title: String,
    pub fill: SerializableColor,
}

impl Frame {
    pub fn new(width: f64, height: f64, title: impl Into<String>) -> Self {
        Self {
            width,
            height,
            title: title.into(),
            fill: SerializableColor::white(),
        }
    }

    pub(crate) fn bounds_at(&self, origin: Point) -> Rect {
        Rect::new(origin.x, origin.y, origin.x + self.width, origin.y + self.height)
    }
}
