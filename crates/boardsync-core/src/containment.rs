//! Frame containment: descendant walks, delete cascades and re-parenting.
//!
//! The containment graph is stored as `parentId` pointers on the children.
//! Walks here are iterative and carry a visited set, so a corrupted graph
//! with a cycle still terminates.

use crate::geometry::get_shape_bounds;
use crate::shapes::{Shape, ShapeId, ShapePatch, ShapeUpdate};
use kurbo::Rect;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Map from parent id to the ids of its direct children.
pub fn children_index(shapes: &[Arc<Shape>]) -> HashMap<ShapeId, Vec<ShapeId>> {
    let mut index: HashMap<ShapeId, Vec<ShapeId>> = HashMap::new();
    for shape in shapes {
        if let Some(parent) = shape.parent_id {
            index.entry(parent).or_default().push(shape.id);
        }
    }
    index
}

fn descendants_from(index: &HashMap<ShapeId, Vec<ShapeId>>, roots: &[ShapeId]) -> Vec<ShapeId> {
    let mut visited: HashSet<ShapeId> = roots.iter().copied().collect();
    let mut queue: VecDeque<ShapeId> = roots.iter().copied().collect();
    let mut found = Vec::new();

    while let Some(id) = queue.pop_front() {
        let Some(children) = index.get(&id) else {
            continue;
        };
        for &child in children {
            if visited.insert(child) {
                found.push(child);
                queue.push_back(child);
            }
        }
    }
    found
}

/// All transitive children of `roots`, excluding the roots themselves.
pub fn collect_descendants(shapes: &[Arc<Shape>], roots: &[ShapeId]) -> Vec<ShapeId> {
    descendants_from(&children_index(shapes), roots)
}

/// `roots` (deduplicated, order kept) followed by all their descendants.
pub fn with_descendants(shapes: &[Arc<Shape>], roots: &[ShapeId]) -> Vec<ShapeId> {
    let mut seen = HashSet::new();
    let mut ids: Vec<ShapeId> = roots.iter().copied().filter(|id| seen.insert(*id)).collect();
    ids.extend(collect_descendants(shapes, &ids));
    ids
}

/// Everything that goes away when `ids` are deleted: the existing shapes
/// named, plus every connector with a tracked endpoint on anything in the
/// set. Connectors attached to other connectors are followed to a fixpoint.
pub fn cascade_delete_targets(shapes: &[Arc<Shape>], ids: &[ShapeId]) -> HashSet<ShapeId> {
    let existing: HashSet<ShapeId> = shapes.iter().map(|s| s.id).collect();
    let mut targets: HashSet<ShapeId> = ids.iter().copied().filter(|id| existing.contains(id)).collect();

    loop {
        let before = targets.len();
        for shape in shapes {
            if targets.contains(&shape.id) {
                continue;
            }
            let Some(connector) = shape.as_connector() else {
                continue;
            };
            let attached = [connector.from.tracked_id(), connector.to.tracked_id()]
                .into_iter()
                .flatten()
                .any(|id| targets.contains(&id));
            if attached {
                targets.insert(shape.id);
            }
        }
        if targets.len() == before {
            return targets;
        }
    }
}

/// Whether `inner` lies fully inside `frame` (edges may touch).
pub fn frame_contains(frame: Rect, inner: Rect) -> bool {
    inner.x0 >= frame.x0 && inner.y0 >= frame.y0 && inner.x1 <= frame.x1 && inner.y1 <= frame.y1
}

/// Smallest enclosing frame first; on equal area the higher one wins.
fn compare_frames(a: &(&Shape, Rect), b: &(&Shape, Rect)) -> Ordering {
    a.1.area()
        .total_cmp(&b.1.area())
        .then_with(|| b.0.z_index.cmp(&a.0.z_index))
        .then_with(|| a.0.id.cmp(&b.0.id))
}

/// Recompute `parentId` for each candidate from geometry.
///
/// A candidate's new parent is the smallest frame whose bounds fully contain
/// the candidate's bounds, never the candidate itself or one of its own
/// descendants. Connectors are skipped. Only candidates whose parent actually
/// changes produce an update; a cleared parent is an explicit null.
pub fn compute_reparent_updates(shapes: &[Arc<Shape>], candidates: &[ShapeId]) -> Vec<ShapeUpdate> {
    let lookup: HashMap<ShapeId, &Shape> = shapes.iter().map(|s| (s.id, s.as_ref())).collect();
    let frames: Vec<(&Shape, Rect)> = shapes
        .iter()
        .filter(|s| s.is_frame())
        .map(|s| (s.as_ref(), get_shape_bounds(s)))
        .collect();
    let index = children_index(shapes);

    let mut seen = HashSet::new();
    let mut updates = Vec::new();
    for &id in candidates {
        if !seen.insert(id) {
            continue;
        }
        let Some(shape) = lookup.get(&id) else {
            continue;
        };
        if shape.is_connector() {
            continue;
        }

        let bounds = get_shape_bounds(shape);
        let own_descendants: HashSet<ShapeId> = if shape.is_frame() {
            descendants_from(&index, &[id]).into_iter().collect()
        } else {
            HashSet::new()
        };

        let new_parent = frames
            .iter()
            .filter(|(frame, frame_bounds)| {
                frame.id != id && !own_descendants.contains(&frame.id) && frame_contains(*frame_bounds, bounds)
            })
            .min_by(|a, b| compare_frames(a, b))
            .map(|(frame, _)| frame.id);

        if new_parent != shape.parent_id {
            updates.push(ShapeUpdate::new(id, ShapePatch::parent(new_parent)));
        }
    }
    updates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{Connector, Endpoint, Frame, Rectangle, ShapeKind};

    fn frame(x: f64, y: f64, w: f64, h: f64) -> Shape {
        Shape::new(ShapeKind::Frame(Frame::new(w, h, "frame")), x, y)
    }

    fn rect(x: f64, y: f64) -> Shape {
        Shape::new(ShapeKind::Rectangle(Rectangle::new(20.0, 20.0)), x, y)
    }

    fn link(a: ShapeId, b: ShapeId) -> Shape {
        Shape::new(
            ShapeKind::Connector(Connector::new(
                Endpoint::Shape { shape_id: a },
                Endpoint::Shape { shape_id: b },
            )),
            0.0,
            0.0,
        )
    }

    fn board(shapes: Vec<Shape>) -> Vec<Arc<Shape>> {
        shapes.into_iter().map(Arc::new).collect()
    }

    #[test]
    fn test_descendants_survive_cycles() {
        let mut a = frame(0.0, 0.0, 100.0, 100.0);
        let mut b = frame(0.0, 0.0, 50.0, 50.0);
        b.parent_id = Some(a.id);
        a.parent_id = Some(b.id);
        let mut c = rect(1.0, 1.0);
        c.parent_id = Some(b.id);
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);

        let shapes = board(vec![a, b, c]);
        let found: HashSet<ShapeId> = collect_descendants(&shapes, &[a_id]).into_iter().collect();
        assert_eq!(found, HashSet::from([b_id, c_id]));
    }

    #[test]
    fn test_cascade_follows_connector_chains() {
        let a = rect(0.0, 0.0);
        let b = rect(100.0, 0.0);
        let ab = link(a.id, b.id);
        let on_link = link(ab.id, b.id);
        let unrelated = rect(500.0, 500.0);
        let (a_id, ab_id, on_link_id) = (a.id, ab.id, on_link.id);

        let shapes = board(vec![a, b, ab, on_link, unrelated]);
        let targets = cascade_delete_targets(&shapes, &[a_id]);
        assert_eq!(targets, HashSet::from([a_id, ab_id, on_link_id]));
    }

    #[test]
    fn test_shape_dragged_out_loses_parent() {
        let f = frame(0.0, 0.0, 200.0, 200.0);
        let mut r = rect(500.0, 500.0);
        r.parent_id = Some(f.id);
        let r_id = r.id;

        let shapes = board(vec![f, r]);
        let updates = compute_reparent_updates(&shapes, &[r_id]);
        assert_eq!(updates.len(), 1);
        assert!(updates[0].patch.clears("parentId"));
    }

    #[test]
    fn test_free_shape_dragged_in_gains_parent() {
        let f = frame(0.0, 0.0, 200.0, 200.0);
        let r = rect(50.0, 50.0);
        let (f_id, r_id) = (f.id, r.id);

        let shapes = board(vec![f, r]);
        let updates = compute_reparent_updates(&shapes, &[r_id]);
        assert_eq!(updates, vec![ShapeUpdate::new(r_id, ShapePatch::parent(Some(f_id)))]);
    }

    #[test]
    fn test_smaller_overlapping_frame_wins() {
        let big = frame(0.0, 0.0, 400.0, 400.0);
        let small = frame(40.0, 40.0, 100.0, 100.0);
        let r = rect(60.0, 60.0);
        let (small_id, r_id) = (small.id, r.id);

        let shapes = board(vec![big, small, r]);
        let updates = compute_reparent_updates(&shapes, &[r_id]);
        assert_eq!(updates[0].patch, ShapePatch::parent(Some(small_id)));
    }

    #[test]
    fn test_frame_never_parented_to_descendant() {
        let outer = frame(0.0, 0.0, 100.0, 100.0);
        // Larger child frame geometrically contains its own parent
        let mut inner = frame(-50.0, -50.0, 300.0, 300.0);
        inner.parent_id = Some(outer.id);
        let outer_id = outer.id;

        let shapes = board(vec![outer, inner]);
        let updates = compute_reparent_updates(&shapes, &[outer_id]);
        assert!(updates.is_empty());
    }

    #[test]
    fn test_unchanged_parent_emits_nothing() {
        let f = frame(0.0, 0.0, 200.0, 200.0);
        let mut r = rect(10.0, 10.0);
        r.parent_id = Some(f.id);
        let r_id = r.id;

        let shapes = board(vec![f, r]);
        assert!(compute_reparent_updates(&shapes, &[r_id, r_id]).is_empty());
    }
}
