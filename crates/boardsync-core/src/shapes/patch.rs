//! Shallow field patches.
//!
//! A patch is a map from record field name to the new JSON value. Applying a
//! patch merges those fields over the shape's serialized form; a `null` value
//! is the explicit "clear this field" marker, distinct from the field simply
//! being absent from the patch.

use super::{Endpoint, Shape, ShapeId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Fields a patch may never change.
const IMMUTABLE_FIELDS: &[&str] = &["id", "type"];

/// Errors from applying a patch.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("patch may not change field `{0}`")]
    Immutable(String),
    #[error("patch does not fit the shape schema: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("shape did not serialize to an object")]
    NotAnObject,
}

/// A set of field changes for one shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapePatch(Map<String, Value>);

impl ShapePatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch that moves a shape to `(x, y)`.
    pub fn position(x: f64, y: f64) -> Self {
        Self::new().with("x", Value::from(x)).with("y", Value::from(y))
    }

    /// Patch that sets or clears the enclosing frame.
    pub fn parent(parent: Option<ShapeId>) -> Self {
        match parent {
            Some(id) => Self::new().with("parentId", Value::String(id.to_string())),
            None => Self::new().cleared("parentId"),
        }
    }

    /// Patch that rewrites both connector endpoints.
    pub fn endpoints(from: &Endpoint, to: &Endpoint) -> Result<Self, PatchError> {
        Ok(Self::new()
            .with("from", serde_json::to_value(from)?)
            .with("to", serde_json::to_value(to)?))
    }

    /// Builder form of [`ShapePatch::insert`].
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.insert(field, value);
        self
    }

    /// Builder form of [`ShapePatch::clear`].
    pub fn cleared(mut self, field: impl Into<String>) -> Self {
        self.clear(field);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    /// Mark a field for removal.
    pub fn clear(&mut self, field: impl Into<String>) {
        self.0.insert(field.into(), Value::Null);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Whether the patch explicitly clears `field`.
    pub fn clears(&self, field: &str) -> bool {
        matches!(self.0.get(field), Some(Value::Null))
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Fold `other` into this patch; later values win.
    pub fn merge(&mut self, other: ShapePatch) {
        self.0.extend(other.0);
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Produce a new shape with this patch merged over `shape`.
    pub fn apply_to(&self, shape: &Shape) -> Result<Shape, PatchError> {
        let mut value = serde_json::to_value(shape)?;
        let Value::Object(fields) = &mut value else {
            return Err(PatchError::NotAnObject);
        };

        for (key, new_value) in &self.0 {
            if IMMUTABLE_FIELDS.contains(&key.as_str()) {
                if fields.get(key) != Some(new_value) {
                    return Err(PatchError::Immutable(key.clone()));
                }
                continue;
            }
            if new_value.is_null() {
                fields.remove(key);
            } else {
                fields.insert(key.clone(), new_value.clone());
            }
        }

        Ok(serde_json::from_value(value)?)
    }
}

impl From<Map<String, Value>> for ShapePatch {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// A patch addressed to one shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeUpdate {
    pub id: ShapeId,
    pub patch: ShapePatch,
}

impl ShapeUpdate {
    pub fn new(id: ShapeId, patch: ShapePatch) -> Self {
        Self { id, patch }
    }
}
