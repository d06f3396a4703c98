//! Shape definitions for the board.
//!
//! Every placeable object is a [`Shape`]: a set of common fields (identity,
//! position, stacking, containment) plus a closed [`ShapeKind`] variant that
//! carries the type-specific payload. Shapes serialize to a flat JSON object
//! (`{"id": .., "x": .., "type": "rectangle", "width": .., ..}`), which is the
//! same field layout the durable store keeps per record.

mod connector;
mod ellipse;
mod frame;
mod freeform;
mod image;
mod patch;
mod rectangle;
mod sticky;
mod text;

pub use connector::{Connector, Endpoint};
pub use ellipse::Ellipse;
pub use frame::Frame;
pub use freeform::Freeform;
pub use image::Image;
pub use patch::{PatchError, ShapePatch, ShapeUpdate};
pub use rectangle::Rectangle;
pub use sticky::StickyNote;
pub use text::Text;

use kurbo::{Point, Rect, Vec2};
use peniko::Color;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for shapes.
pub type ShapeId = Uuid;

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }

    pub fn transparent() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Default sticky note yellow.
    pub fn note_yellow() -> Self {
        Self::new(255, 235, 130, 255)
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Which field carries the user-facing color of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorField {
    /// Area fill (boxes, ellipses, frames, text glyphs).
    Fill,
    /// Outline or path stroke (lines, connectors).
    Stroke,
    /// Paper color of a sticky note.
    Color,
}

impl ColorField {
    /// The record field name this color lives under.
    pub fn key(self) -> &'static str {
        match self {
            ColorField::Fill => "fill",
            ColorField::Stroke => "stroke",
            ColorField::Color => "color",
        }
    }
}

fn default_opacity() -> f64 {
    1.0
}

/// A board object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    pub id: ShapeId,
    /// Top-left for box shapes, center for ellipses, origin for freeform lines.
    pub x: f64,
    pub y: f64,
    /// Rotation in degrees.
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    /// Stacking order. Not required to be contiguous.
    #[serde(default)]
    pub z_index: i64,
    /// Enclosing frame, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ShapeId>,
    #[serde(flatten)]
    pub kind: ShapeKind,
}

/// Type-specific payload of a shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ShapeKind {
    Rectangle(Rectangle),
    Ellipse(Ellipse),
    Text(Text),
    Line(Freeform),
    Sticky(StickyNote),
    Frame(Frame),
    Image(Image),
    Connector(Connector),
}

impl ShapeKind {
    /// The `type` tag written to records.
    pub fn type_name(&self) -> &'static str {
        match self {
            ShapeKind::Rectangle(_) => "rectangle",
            ShapeKind::Ellipse(_) => "ellipse",
            ShapeKind::Text(_) => "text",
            ShapeKind::Line(_) => "line",
            ShapeKind::Sticky(_) => "sticky",
            ShapeKind::Frame(_) => "frame",
            ShapeKind::Image(_) => "image",
            ShapeKind::Connector(_) => "connector",
        }
    }
}

impl Shape {
    /// Create a shape with a fresh id and default common fields.
    pub fn new(kind: ShapeKind, x: f64, y: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            x,
            y,
            rotation: 0.0,
            opacity: 1.0,
            z_index: 0,
            parent_id: None,
            kind,
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn set_position(&mut self, position: Point) {
        self.x = position.x;
        self.y = position.y;
    }

    /// Translate the shape. Free connector endpoints move with it; tracked
    /// endpoints stay attached to their shapes.
    pub fn translate(&mut self, delta: Vec2) {
        self.x += delta.x;
        self.y += delta.y;
        if let ShapeKind::Connector(connector) = &mut self.kind {
            connector.translate_free_endpoints(delta);
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn is_frame(&self) -> bool {
        matches!(self.kind, ShapeKind::Frame(_))
    }

    pub fn is_connector(&self) -> bool {
        matches!(self.kind, ShapeKind::Connector(_))
    }

    pub fn as_connector(&self) -> Option<&Connector> {
        match &self.kind {
            ShapeKind::Connector(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_connector_mut(&mut self) -> Option<&mut Connector> {
        match &mut self.kind {
            ShapeKind::Connector(c) => Some(c),
            _ => None,
        }
    }

    /// Which field holds this shape's color, if it has one.
    pub fn color_field(&self) -> Option<ColorField> {
        match &self.kind {
            ShapeKind::Rectangle(_)
            | ShapeKind::Ellipse(_)
            | ShapeKind::Text(_)
            | ShapeKind::Frame(_) => Some(ColorField::Fill),
            ShapeKind::Line(_) | ShapeKind::Connector(_) => Some(ColorField::Stroke),
            ShapeKind::Sticky(_) => Some(ColorField::Color),
            ShapeKind::Image(_) => None,
        }
    }

    /// Current value of the color field.
    pub fn color(&self) -> Option<SerializableColor> {
        match &self.kind {
            ShapeKind::Rectangle(r) => Some(r.fill),
            ShapeKind::Ellipse(e) => Some(e.fill),
            ShapeKind::Text(t) => Some(t.fill),
            ShapeKind::Frame(f) => Some(f.fill),
            ShapeKind::Line(l) => Some(l.stroke),
            ShapeKind::Connector(c) => Some(c.stroke),
            ShapeKind::Sticky(s) => Some(s.color),
            ShapeKind::Image(_) => None,
        }
    }

    /// Axis-aligned bounds computed from the stored fields alone.
    ///
    /// Connectors use their derived `points`; see [`crate::geometry`] for the
    /// fallback rules.
    pub(crate) fn raw_bounds(&self) -> Rect {
        let origin = self.position();
        match &self.kind {
            ShapeKind::Rectangle(r) => r.bounds_at(origin),
            ShapeKind::Ellipse(e) => e.bounds_at(origin),
            ShapeKind::Text(t) => t.bounds_at(origin),
            ShapeKind::Line(l) => l.bounds_at(origin),
            ShapeKind::Sticky(s) => s.bounds_at(origin),
            ShapeKind::Frame(f) => f.bounds_at(origin),
            ShapeKind::Image(i) => i.bounds_at(origin),
            ShapeKind::Connector(c) => c.bounds_at(origin),
        }
    }

    /// Polyline of the shape in world coordinates, for path-like shapes.
    pub fn world_points(&self) -> Option<Vec<Point>> {
        match &self.kind {
            ShapeKind::Line(l) => Some(l.world_points(self.position())),
            ShapeKind::Connector(c) => Some(c.points.clone()),
            _ => None,
        }
    }

    /// Regenerate the shape's ID with a new unique identifier.
    pub fn regenerate_id(&mut self) {
        self.id = Uuid::new_v4();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_serializes_flat() {
        let mut shape = Shape::new(ShapeKind::Rectangle(Rectangle::new(100.0, 50.0)), 10.0, 20.0);
        shape.z_index = 3;
        let value = serde_json::to_value(&shape).unwrap();
        let fields = value.as_object().unwrap();

        assert_eq!(fields["type"], "rectangle");
        assert_eq!(fields["width"], 100.0);
        assert_eq!(fields["zIndex"], 3);
        assert!(!fields.contains_key("parentId"));
    }

    #[test]
    fn test_shape_roundtrip_with_parent() {
        let frame = Shape::new(ShapeKind::Frame(Frame::new(400.0, 300.0, "Ideas")), 0.0, 0.0);
        let mut note = Shape::new(ShapeKind::Sticky(StickyNote::new("hello")), 10.0, 10.0);
        note.parent_id = Some(frame.id);

        let json = serde_json::to_string(&note).unwrap();
        let back: Shape = serde_json::from_str(&json).unwrap();
        assert_eq!(back, note);
    }

    #[test]
    fn test_color_field_capability() {
        let rect = Shape::new(ShapeKind::Rectangle(Rectangle::new(1.0, 1.0)), 0.0, 0.0);
        let note = Shape::new(ShapeKind::Sticky(StickyNote::new("")), 0.0, 0.0);
        let line = Shape::new(ShapeKind::Line(Freeform::new(vec![])), 0.0, 0.0);
        let image = Shape::new(ShapeKind::Image(Image::new(1.0, 1.0, "a.png")), 0.0, 0.0);

        assert_eq!(rect.color_field(), Some(ColorField::Fill));
        assert_eq!(note.color_field().map(ColorField::key), Some("color"));
        assert_eq!(line.color_field(), Some(ColorField::Stroke));
        assert_eq!(image.color_field(), None);
    }

    #[test]
    fn test_translate_moves_free_connector_endpoints_only() {
        let anchor = Uuid::new_v4();
        let mut shape = Shape::new(
            ShapeKind::Connector(Connector::new(
                Endpoint::Shape { shape_id: anchor },
                Endpoint::Point { x: 5.0, y: 5.0 },
            )),
            0.0,
            0.0,
        );
        shape.translate(Vec2::new(10.0, -5.0));

        let connector = shape.as_connector().unwrap();
        assert_eq!(connector.from, Endpoint::Shape { shape_id: anchor });
        assert_eq!(connector.to, Endpoint::Point { x: 15.0, y: 0.0 });
    }
}
