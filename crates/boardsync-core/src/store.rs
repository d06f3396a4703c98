//! The object store: shapes, selection, clipboard and undo history.
//!
//! Every local mutation records a pre-mutation snapshot before it changes
//! anything. The replication entry points ([`ObjectStore::set_shapes`],
//! [`ObjectStore::merge_remote_shapes`], [`ObjectStore::remove_remote_shapes`]
//! and [`ObjectStore::apply_remote_batch`]) never touch history, so remote
//! echoes cannot be undone locally.
//!
//! Shapes are held behind `Arc` so snapshots share unchanged shapes with the
//! live collection. `revision` moves exactly once per observable update.

use crate::config::SyncConfig;
use crate::containment::{cascade_delete_targets, with_descendants};
use crate::geometry::compute_all_connector_points;
use crate::history::History;
use crate::selection;
use crate::shapes::{
    Connector, Ellipse, Endpoint, Frame, Freeform, Image, Rectangle, SerializableColor, Shape,
    ShapeId, ShapeKind, ShapePatch, ShapeUpdate, StickyNote, Text,
};
use kurbo::{Point, Rect, Vec2};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Local authoritative state of one board.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    shapes: Vec<Arc<Shape>>,
    selected: Vec<ShapeId>,
    clipboard: Vec<Shape>,
    history: History<Vec<Arc<Shape>>>,
    config: SyncConfig,
    revision: u64,
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}

impl ObjectStore {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            shapes: Vec::new(),
            selected: Vec::new(),
            clipboard: Vec::new(),
            history: History::new(config.effective_history_limit()),
            config,
            revision: 0,
        }
    }

    // --- Reads ---

    /// Current collection in insertion order.
    pub fn shapes(&self) -> &[Arc<Shape>] {
        &self.shapes
    }

    /// Cheap copy of the current collection.
    pub fn snapshot(&self) -> Vec<Arc<Shape>> {
        self.shapes.clone()
    }

    pub fn get(&self, id: ShapeId) -> Option<&Shape> {
        self.shapes.iter().find(|s| s.id == id).map(|s| s.as_ref())
    }

    pub fn contains(&self, id: ShapeId) -> bool {
        self.shapes.iter().any(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Shapes in paint order, bottom first.
    pub fn shapes_by_z(&self) -> Vec<&Shape> {
        let mut ordered: Vec<&Shape> = self.shapes.iter().map(|s| s.as_ref()).collect();
        ordered.sort_by_key(|s| s.z_index);
        ordered
    }

    /// Ids under `point`, topmost first.
    pub fn shapes_at_point(&self, point: Point, tolerance: f64) -> Vec<ShapeId> {
        selection::shapes_at_point(&self.shapes, point, tolerance)
    }

    /// Ids intersecting `region`.
    pub fn shapes_in_region(&self, region: Rect) -> Vec<ShapeId> {
        selection::shapes_in_region(&self.shapes, region)
    }

    /// Derived screen points of a connector.
    pub fn connector_points(&self, id: ShapeId) -> Option<&[Point]> {
        self.get(id)
            .and_then(|s| s.as_connector())
            .map(|c| c.points.as_slice())
    }

    pub fn selected_ids(&self) -> &[ShapeId] {
        &self.selected
    }

    pub fn is_selected(&self, id: ShapeId) -> bool {
        self.selected.contains(&id)
    }

    pub fn clipboard(&self) -> &[Shape] {
        &self.clipboard
    }

    /// Incremented once per observable update.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Number of stored history snapshots.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    // --- Selection ---

    /// Replace the selection with a single shape.
    pub fn select(&mut self, id: ShapeId) {
        if !self.contains(id) {
            log::warn!("Cannot select missing shape {}", id);
            return;
        }
        self.selected = vec![id];
        self.touch();
    }

    pub fn add_to_selection(&mut self, id: ShapeId) {
        if !self.contains(id) {
            log::warn!("Cannot select missing shape {}", id);
            return;
        }
        if !self.selected.contains(&id) {
            self.selected.push(id);
            self.touch();
        }
    }

    /// Replace the selection; unknown ids are dropped.
    pub fn set_selection(&mut self, ids: &[ShapeId]) {
        let mut seen = HashSet::new();
        self.selected = ids
            .iter()
            .copied()
            .filter(|id| self.contains(*id) && seen.insert(*id))
            .collect();
        self.touch();
    }

    pub fn select_all(&mut self) {
        self.selected = self.shapes.iter().map(|s| s.id).collect();
        self.touch();
    }

    pub fn clear_selection(&mut self) {
        if !self.selected.is_empty() {
            self.selected.clear();
            self.touch();
        }
    }

    // --- Creation ---

    /// Add a shape on top of the stack and select it.
    pub fn add_shape(&mut self, mut shape: Shape) -> ShapeId {
        if self.contains(shape.id) {
            log::warn!("Shape id {} already present, assigning a new one", shape.id);
            shape.regenerate_id();
        }
        self.record();
        shape.z_index = self.next_z();
        let id = shape.id;
        self.shapes.push(Arc::new(shape));
        self.selected = vec![id];
        self.commit();
        id
    }

    pub fn add_rectangle(&mut self, x: f64, y: f64, width: f64, height: f64) -> ShapeId {
        self.add_shape(Shape::new(ShapeKind::Rectangle(Rectangle::new(width, height)), x, y))
    }

    /// Ellipse centered on `(cx, cy)`.
    pub fn add_ellipse(&mut self, cx: f64, cy: f64, radius_x: f64, radius_y: f64) -> ShapeId {
        self.add_shape(Shape::new(ShapeKind::Ellipse(Ellipse::new(radius_x, radius_y)), cx, cy))
    }

    pub fn add_text(&mut self, x: f64, y: f64, content: impl Into<String>) -> ShapeId {
        self.add_shape(Shape::new(ShapeKind::Text(Text::new(content)), x, y))
    }

    /// Freeform line; `points` are relative to `(x, y)`.
    pub fn add_line(&mut self, x: f64, y: f64, points: Vec<Point>) -> ShapeId {
        self.add_shape(Shape::new(ShapeKind::Line(Freeform::new(points)), x, y))
    }

    pub fn add_sticky_note(&mut self, x: f64, y: f64, text: impl Into<String>) -> ShapeId {
        self.add_shape(Shape::new(ShapeKind::Sticky(StickyNote::new(text)), x, y))
    }

    pub fn add_frame(&mut self, x: f64, y: f64, width: f64, height: f64, title: impl Into<String>) -> ShapeId {
        self.add_shape(Shape::new(ShapeKind::Frame(Frame::new(width, height, title)), x, y))
    }

    pub fn add_image(&mut self, x: f64, y: f64, width: f64, height: f64, src: impl Into<String>) -> ShapeId {
        self.add_shape(Shape::new(ShapeKind::Image(Image::new(width, height, src)), x, y))
    }

    pub fn add_connector(&mut self, from: Endpoint, to: Endpoint) -> ShapeId {
        let origin = match from {
            Endpoint::Point { x, y } => Point::new(x, y),
            Endpoint::Shape { .. } => Point::ZERO,
        };
        self.add_shape(Shape::new(ShapeKind::Connector(Connector::new(from, to)), origin.x, origin.y))
    }

    // --- Updates ---

    /// Apply a batch of patches as one update with one history entry.
    ///
    /// Updates naming missing shapes, and patches that do not fit the shape,
    /// are logged and skipped. Returns the number of updates applied; when
    /// none applies nothing is recorded.
    pub fn update_shapes(&mut self, updates: &[ShapeUpdate]) -> usize {
        let mut next = self.shapes.clone();
        let applied = apply_updates(&mut next, updates);
        if applied == 0 {
            return 0;
        }
        let prev = std::mem::replace(&mut self.shapes, next);
        self.history.push(prev);
        self.commit();
        applied
    }

    /// Translate shapes (and everything inside the frames among them).
    pub fn move_shapes(&mut self, ids: &[ShapeId], delta: Vec2) -> usize {
        let targets: HashSet<ShapeId> = with_descendants(&self.shapes, &self.existing(ids))
            .into_iter()
            .collect();
        if targets.is_empty() {
            log::warn!("Nothing to move among {} id(s)", ids.len());
            return 0;
        }
        self.record();
        for shape in &mut self.shapes {
            if targets.contains(&shape.id) {
                Arc::make_mut(shape).translate(delta);
            }
        }
        self.commit();
        targets.len()
    }

    /// Recolor shapes through their color-field capability.
    pub fn set_color(&mut self, ids: &[ShapeId], color: SerializableColor) -> usize {
        let Ok(value) = serde_json::to_value(color) else {
            return 0;
        };
        let updates: Vec<ShapeUpdate> = ids
            .iter()
            .filter_map(|&id| {
                let shape = self.get(id)?;
                let Some(field) = shape.color_field() else {
                    log::debug!("Shape {} ({}) has no color field", id, shape.type_name());
                    return None;
                };
                Some(ShapeUpdate::new(id, ShapePatch::new().with(field.key(), value.clone())))
            })
            .collect();
        self.update_shapes(&updates)
    }

    // --- Deletion ---

    /// Delete shapes, cascading to connectors attached to them and clearing
    /// `parentId` on surviving children. Returns every removed id.
    pub fn delete_shapes(&mut self, ids: &[ShapeId]) -> Vec<ShapeId> {
        let targets = cascade_delete_targets(&self.shapes, ids);
        if targets.is_empty() {
            log::warn!("No shapes to delete among {} id(s)", ids.len());
            return Vec::new();
        }
        self.record();
        let removed = remove_cascaded(&mut self.shapes, &targets);
        self.commit();
        removed
    }

    pub fn delete_selected(&mut self) -> Vec<ShapeId> {
        let ids = self.selected.clone();
        self.delete_shapes(&ids)
    }

    // --- Duplication and clipboard ---

    /// Copy shapes (with frame contents) in place, offset by the paste offset.
    /// The copies become the selection.
    pub fn duplicate_shapes(&mut self, ids: &[ShapeId]) -> Vec<ShapeId> {
        let source = self.collect_group(ids);
        if source.is_empty() {
            log::warn!("Nothing to duplicate among {} id(s)", ids.len());
            return Vec::new();
        }
        self.insert_copies(&source)
    }

    pub fn duplicate_selected(&mut self) -> Vec<ShapeId> {
        let ids = self.selected.clone();
        self.duplicate_shapes(&ids)
    }

    /// Copy the selection (with frame contents) to the clipboard.
    pub fn copy_selected(&mut self) -> usize {
        let ids = self.selected.clone();
        self.clipboard = self.collect_group(&ids);
        self.clipboard.len()
    }

    /// Insert the clipboard contents as new shapes and select them.
    ///
    /// The clipboard itself shifts by the paste offset so repeated pastes
    /// cascade instead of stacking.
    pub fn paste(&mut self) -> Vec<ShapeId> {
        if self.clipboard.is_empty() {
            return Vec::new();
        }
        let source = std::mem::take(&mut self.clipboard);
        let ids = self.insert_copies(&source);
        let offset = self.paste_delta();
        self.clipboard = source
            .into_iter()
            .map(|mut s| {
                s.translate(offset);
                s
            })
            .collect();
        ids
    }

    // --- Z-order ---

    /// Move shapes above everything else, keeping their relative order.
    pub fn bring_to_front(&mut self, ids: &[ShapeId]) {
        let top = self.shapes.iter().map(|s| s.z_index).max().unwrap_or(0);
        self.restack(ids, top + 1);
    }

    /// Move shapes below everything else, keeping their relative order.
    pub fn send_to_back(&mut self, ids: &[ShapeId]) {
        let bottom = self.shapes.iter().map(|s| s.z_index).min().unwrap_or(0);
        let count = self.existing(ids).len() as i64;
        self.restack(ids, bottom - count);
    }

    /// Move a shape one layer toward the front.
    /// Returns false if the shape is already on top or missing.
    pub fn bring_forward(&mut self, id: ShapeId) -> bool {
        self.step_z(id, true)
    }

    /// Move a shape one layer toward the back.
    pub fn send_backward(&mut self, id: ShapeId) -> bool {
        self.step_z(id, false)
    }

    // --- History ---

    /// Restore the previous snapshot. Clears the selection.
    pub fn undo(&mut self) -> bool {
        let Some(prev) = self.history.undo(&self.shapes) else {
            return false;
        };
        self.shapes = prev;
        self.selected.clear();
        self.commit();
        true
    }

    /// Re-apply an undone snapshot. Clears the selection.
    pub fn redo(&mut self) -> bool {
        let Some(next) = self.history.redo() else {
            return false;
        };
        self.shapes = next;
        self.selected.clear();
        self.commit();
        true
    }

    // --- Replication (no history) ---

    /// Replace the whole collection, e.g. from an initial remote snapshot.
    pub fn set_shapes(&mut self, shapes: Vec<Shape>) {
        self.shapes = shapes.into_iter().map(Arc::new).collect();
        self.commit();
    }

    /// Insert or replace shapes received from a remote writer.
    pub fn merge_remote_shapes(&mut self, shapes: Vec<Shape>) {
        self.apply_remote_batch(shapes, &[]);
    }

    /// Remove shapes deleted by a remote writer.
    pub fn remove_remote_shapes(&mut self, ids: &[ShapeId]) {
        self.apply_remote_batch(Vec::new(), ids);
    }

    /// Apply remote upserts and removals as a single update.
    pub fn apply_remote_batch(&mut self, upserts: Vec<Shape>, removals: &[ShapeId]) {
        if upserts.is_empty() && removals.is_empty() {
            return;
        }
        let mut positions: HashMap<ShapeId, usize> =
            self.shapes.iter().enumerate().map(|(i, s)| (s.id, i)).collect();
        for shape in upserts {
            match positions.get(&shape.id) {
                Some(&i) => self.shapes[i] = Arc::new(shape),
                None => {
                    positions.insert(shape.id, self.shapes.len());
                    self.shapes.push(Arc::new(shape));
                }
            }
        }
        if !removals.is_empty() {
            let targets = cascade_delete_targets(&self.shapes, removals);
            remove_cascaded(&mut self.shapes, &targets);
        }
        self.commit();
    }

    // --- Internals ---

    fn record(&mut self) {
        self.history.push(self.shapes.clone());
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    /// Finish an update: re-derive connector geometry, drop stale selection
    /// entries and bump the revision.
    fn commit(&mut self) {
        let derived = compute_all_connector_points(&self.shapes, self.config.fanout_spacing);
        for shape in &mut self.shapes {
            let Some(points) = derived.get(&shape.id) else {
                continue;
            };
            if !shape.as_connector().is_some_and(|c| &c.points != points) {
                continue;
            }
            if let Some(connector) = Arc::make_mut(shape).as_connector_mut() {
                connector.points = points.clone();
            }
        }

        let live: HashSet<ShapeId> = self.shapes.iter().map(|s| s.id).collect();
        self.selected.retain(|id| live.contains(id));
        self.touch();
    }

    fn next_z(&self) -> i64 {
        self.shapes.iter().map(|s| s.z_index).max().map_or(0, |z| z + 1)
    }

    fn existing(&self, ids: &[ShapeId]) -> Vec<ShapeId> {
        let mut seen = HashSet::new();
        ids.iter()
            .copied()
            .filter(|id| self.contains(*id) && seen.insert(*id))
            .collect()
    }

    fn paste_delta(&self) -> Vec2 {
        Vec2::new(self.config.paste_offset, self.config.paste_offset)
    }

    /// Shapes named by `ids` plus their frame contents, in collection order.
    fn collect_group(&self, ids: &[ShapeId]) -> Vec<Shape> {
        let members: HashSet<ShapeId> = with_descendants(&self.shapes, &self.existing(ids))
            .into_iter()
            .collect();
        self.shapes
            .iter()
            .filter(|s| members.contains(&s.id))
            .map(|s| s.as_ref().clone())
            .collect()
    }

    /// Insert offset copies of `source` with fresh ids, remapping parent and
    /// connector references inside the copied set.
    fn insert_copies(&mut self, source: &[Shape]) -> Vec<ShapeId> {
        let ids: HashMap<ShapeId, ShapeId> = source
            .iter()
            .map(|s| (s.id, ShapeId::new_v4()))
            .collect();
        let offset = self.paste_delta();

        self.record();
        let base_z = self.next_z();
        let mut ordered: Vec<&Shape> = source.iter().collect();
        ordered.sort_by_key(|s| s.z_index);

        let mut created = Vec::with_capacity(ordered.len());
        for (i, original) in ordered.into_iter().enumerate() {
            let mut copy = original.clone();
            copy.id = ids.get(&original.id).copied().unwrap_or_else(ShapeId::new_v4);
            copy.z_index = base_z + i as i64;
            copy.parent_id = copy.parent_id.map(|p| ids.get(&p).copied().unwrap_or(p));
            copy.translate(offset);
            if let Some(connector) = copy.as_connector_mut() {
                connector.from = connector.from.remapped(&ids);
                connector.to = connector.to.remapped(&ids);
            }
            created.push(copy.id);
            self.shapes.push(Arc::new(copy));
        }
        self.selected = created.clone();
        self.commit();
        created
    }

    /// Assign contiguous z values starting at `base` to `ids`, in their
    /// current stacking order.
    fn restack(&mut self, ids: &[ShapeId], base: i64) {
        let targets = self.existing(ids);
        if targets.is_empty() {
            log::warn!("No shapes to restack among {} id(s)", ids.len());
            return;
        }
        let mut ordered: Vec<(i64, ShapeId)> = targets
            .iter()
            .filter_map(|id| self.get(*id).map(|s| (s.z_index, *id)))
            .collect();
        ordered.sort();
        let new_z: HashMap<ShapeId, i64> = ordered
            .into_iter()
            .enumerate()
            .map(|(i, (_, id))| (id, base + i as i64))
            .collect();

        self.record();
        for shape in &mut self.shapes {
            if let Some(&z) = new_z.get(&shape.id) {
                Arc::make_mut(shape).z_index = z;
            }
        }
        self.commit();
    }

    fn step_z(&mut self, id: ShapeId, forward: bool) -> bool {
        let order: Vec<(ShapeId, i64)> = self.shapes_by_z().iter().map(|s| (s.id, s.z_index)).collect();
        let Some(pos) = order.iter().position(|(sid, _)| *sid == id) else {
            log::warn!("Cannot restack missing shape {}", id);
            return false;
        };
        let neighbor = if forward {
            order.get(pos + 1)
        } else {
            pos.checked_sub(1).and_then(|p| order.get(p))
        };
        let Some(&(other_id, other_z)) = neighbor else {
            return false;
        };
        let own_z = order[pos].1;
        let (own_new, other_new) = if own_z == other_z {
            (if forward { other_z + 1 } else { other_z - 1 }, other_z)
        } else {
            (other_z, own_z)
        };

        self.record();
        for shape in &mut self.shapes {
            if shape.id == id {
                Arc::make_mut(shape).z_index = own_new;
            } else if shape.id == other_id {
                Arc::make_mut(shape).z_index = other_new;
            }
        }
        self.commit();
        true
    }
}

/// Apply patches in place. Returns how many applied.
fn apply_updates(shapes: &mut [Arc<Shape>], updates: &[ShapeUpdate]) -> usize {
    let positions: HashMap<ShapeId, usize> = shapes.iter().enumerate().map(|(i, s)| (s.id, i)).collect();
    let mut applied = 0;
    for update in updates {
        let Some(&i) = positions.get(&update.id) else {
            log::warn!("Update for missing shape {} ignored", update.id);
            continue;
        };
        match update.patch.apply_to(&shapes[i]) {
            Ok(patched) => {
                shapes[i] = Arc::new(patched);
                applied += 1;
            }
            Err(e) => log::warn!("Rejected patch for shape {}: {}", update.id, e),
        }
    }
    applied
}

/// Remove `targets` and orphan survivors whose parent was removed.
fn remove_cascaded(shapes: &mut Vec<Arc<Shape>>, targets: &HashSet<ShapeId>) -> Vec<ShapeId> {
    let removed: Vec<ShapeId> = shapes
        .iter()
        .map(|s| s.id)
        .filter(|id| targets.contains(id))
        .collect();
    shapes.retain(|s| !targets.contains(&s.id));
    for shape in shapes.iter_mut() {
        if shape.parent_id.is_some_and(|p| targets.contains(&p)) {
            Arc::make_mut(shape).parent_id = None;
        }
    }
    removed
}
