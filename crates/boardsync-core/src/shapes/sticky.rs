//! Sticky note shape.

use super::SerializableColor;
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Default edge length of a new note.
pub const DEFAULT_NOTE_SIZE: f64 = 200.0;

/// A square-ish note with text on colored paper. Positioned by its top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickyNote {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub text: String,
    pub color: SerializableColor,
}

impl StickyNote {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            width: DEFAULT_NOTE_SIZE,
            height: DEFAULT_NOTE_SIZE,
            text: text.into(),
            color: SerializableColor::note_yellow(),
        }
    }

    pub(crate) fn bounds_at(&self, origin: Point) -> Rect {
        Rect::new(origin.x, origin.y, origin.x + self.width, origin.y + self.height)
    }
}
