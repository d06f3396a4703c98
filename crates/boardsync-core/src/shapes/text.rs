//! Text shape.

use super::SerializableColor;
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Line height as a multiple of the font size.
pub const LINE_HEIGHT: f64 = 1.2;

/// Average glyph advance as a multiple of the font size.
const CHAR_WIDTH_FACTOR: f64 = 0.55;

/// Minimum width of a text box, so empty text stays grabbable.
const MIN_WIDTH: f64 = 20.0;

fn default_font_size() -> f64 {
    16.0
}

/// A text block. Positioned by its top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Text {
    pub content: String,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
    /// Wrapping width. When absent the width is estimated from the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    pub fill: SerializableColor,
}

impl Text {
    /// Create a new text block.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            font_size: default_font_size(),
            width: None,
            fill: SerializableColor::black(),
        }
    }

    fn line_count(&self) -> usize {
        let count = self.content.lines().count().max(1);
        if self.content.ends_with('\n') {
            count + 1
        } else {
            count
        }
    }

    /// Estimated width of the widest line.
    pub fn approximate_width(&self) -> f64 {
        let widest = self
            .content
            .lines()
            .map(|line| line.chars().count())
            .max()
            .unwrap_or(0);
        (widest as f64 * self.font_size * CHAR_WIDTH_FACTOR).max(MIN_WIDTH)
    }

    /// Estimated height from the font size and line count.
    pub fn approximate_height(&self) -> f64 {
        self.line_count() as f64 * self.font_size * LINE_HEIGHT
    }

    pub(crate) fn bounds_at(&self, origin: Point) -> Rect {
        let width = self.width.unwrap_or_else(|| self.approximate_width());
        Rect::new(
            origin.x,
            origin.y,
            origin.x + width,
            origin.y + self.approximate_height(),
        )
    }
}
