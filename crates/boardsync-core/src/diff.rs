//! Minimal write sets between two shape collections.

use crate::shapes::{Shape, ShapeId, ShapePatch, ShapeUpdate};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Shapes added, deleted and modified between two collections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapeDiff {
    pub added: Vec<Arc<Shape>>,
    pub deleted: Vec<ShapeId>,
    /// One entry per changed shape, carrying only the changed fields.
    pub modified: Vec<ShapeUpdate>,
}

impl ShapeDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.modified.is_empty()
    }

    /// Number of records this diff touches.
    pub fn len(&self) -> usize {
        self.added.len() + self.deleted.len() + self.modified.len()
    }
}

/// Record fields of a shape, without any null values.
///
/// Non-finite numbers serialize as null; those fields are dropped here since
/// the durable store has no way to represent them.
pub fn shape_fields(shape: &Shape) -> Map<String, Value> {
    match serde_json::to_value(shape) {
        Ok(Value::Object(mut fields)) => {
            fields.retain(|_, value| !value.is_null());
            fields
        }
        Ok(_) => Map::new(),
        Err(e) => {
            log::warn!("Failed to serialize shape {}: {}", shape.id, e);
            Map::new()
        }
    }
}

fn raw_fields(shape: &Shape) -> Map<String, Value> {
    match serde_json::to_value(shape) {
        Ok(Value::Object(fields)) => fields,
        _ => Map::new(),
    }
}

/// Field-level patch turning `prev` into `curr`.
///
/// Fields that disappeared are cleared with an explicit null. A field whose
/// new value cannot be represented is left out of the patch.
pub fn field_patch(prev: &Shape, curr: &Shape) -> ShapePatch {
    let before = raw_fields(prev);
    let after = raw_fields(curr);
    let mut patch = ShapePatch::new();

    for (key, value) in &after {
        if before.get(key) == Some(value) {
            continue;
        }
        if value.is_null() {
            log::warn!("Skipping unrepresentable value for `{}` on shape {}", key, curr.id);
            continue;
        }
        patch.insert(key.clone(), value.clone());
    }
    for key in before.keys() {
        if !after.contains_key(key) {
            patch.clear(key.clone());
        }
    }
    patch
}

/// Compute the writes that turn `prev` into `curr`.
///
/// The same slice on both sides is an empty diff without any per-shape work;
/// shapes shared by pointer between the two collections are skipped the same
/// way.
pub fn diff_shape_writes(prev: &[Arc<Shape>], curr: &[Arc<Shape>]) -> ShapeDiff {
    if std::ptr::eq(prev, curr) {
        return ShapeDiff::default();
    }

    let before: HashMap<ShapeId, &Arc<Shape>> = prev.iter().map(|s| (s.id, s)).collect();
    let mut diff = ShapeDiff::default();

    for shape in curr {
        match before.get(&shape.id) {
            None => diff.added.push(shape.clone()),
            Some(old) if Arc::ptr_eq(old, shape) || old.as_ref() == shape.as_ref() => {}
            Some(old) => {
                let patch = field_patch(old, shape);
                if !patch.is_empty() {
                    diff.modified.push(ShapeUpdate::new(shape.id, patch));
                }
            }
        }
    }

    let current: HashSet<ShapeId> = curr.iter().map(|s| s.id).collect();
    diff.deleted = prev
        .iter()
        .map(|s| s.id)
        .filter(|id| !current.contains(id))
        .collect();

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{Rectangle, ShapeKind};
    use uuid::Uuid;

    fn board() -> Vec<Arc<Shape>> {
        (0..3)
            .map(|i| {
                Arc::new(Shape::new(
                    ShapeKind::Rectangle(Rectangle::new(10.0, 10.0)),
                    i as f64 * 50.0,
                    0.0,
                ))
            })
            .collect()
    }

    #[test]
    fn test_identical_collection_is_empty() {
        let shapes = board();
        assert!(diff_shape_writes(&shapes, &shapes).is_empty());
        let cloned = shapes.clone();
        assert!(diff_shape_writes(&shapes, &cloned).is_empty());
    }

    #[test]
    fn test_single_field_change() {
        let prev = board();
        let mut curr = prev.clone();
        let mut moved = (*curr[1]).clone();
        moved.x += 5.0;
        curr[1] = Arc::new(moved);

        let diff = diff_shape_writes(&prev, &curr);
        assert!(diff.added.is_empty());
        assert!(diff.deleted.is_empty());
        assert_eq!(diff.modified.len(), 1);
        assert_eq!(diff.modified[0].id, prev[1].id);
        assert_eq!(diff.modified[0].patch.len(), 1);
        assert_eq!(diff.modified[0].patch.get("x"), Some(&Value::from(55.0)));
    }

    #[test]
    fn test_cleared_field_is_explicit_null() {
        let mut child = Shape::new(ShapeKind::Rectangle(Rectangle::new(10.0, 10.0)), 0.0, 0.0);
        child.parent_id = Some(Uuid::new_v4());
        let prev = vec![Arc::new(child.clone())];
        child.parent_id = None;
        let curr = vec![Arc::new(child)];

        let diff = diff_shape_writes(&prev, &curr);
        assert_eq!(diff.modified.len(), 1);
        assert!(diff.modified[0].patch.clears("parentId"));
    }

    #[test]
    fn test_added_and_deleted() {
        let prev = board();
        let mut curr = prev[1..].to_vec();
        let extra = Arc::new(Shape::new(ShapeKind::Rectangle(Rectangle::new(1.0, 1.0)), 0.0, 0.0));
        curr.push(extra.clone());

        let diff = diff_shape_writes(&prev, &curr);
        assert_eq!(diff.deleted, vec![prev[0].id]);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].id, extra.id);
        assert_eq!(diff.len(), 2);
    }

    #[test]
    fn test_non_finite_values_are_not_written() {
        let shape = Shape::new(ShapeKind::Rectangle(Rectangle::new(10.0, 10.0)), 0.0, 0.0);
        let mut broken = shape.clone();
        broken.x = f64::NAN;
        broken.y = 3.0;

        let patch = field_patch(&shape, &broken);
        assert!(!patch.contains("x"));
        assert_eq!(patch.get("y"), Some(&Value::from(3.0)));

        let fields = shape_fields(&broken);
        assert!(!fields.contains_key("x"));
        assert!(fields.values().all(|v| !v.is_null()));
    }
}
