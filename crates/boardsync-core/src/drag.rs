//! Interactive drag gestures.
//!
//! A gesture moves a rigid group: the grabbed shape (or the selection it
//! belongs to) plus everything inside any frame in it. While dragging, the
//! group's live positions live in a reusable buffer owned by the
//! coordinator and the store is left alone; redraws and ephemeral broadcasts
//! are throttled. Releasing commits one position batch to the store,
//! followed by a re-parenting batch when containment changed.

use crate::config::SyncConfig;
use crate::containment::{compute_reparent_updates, with_descendants};
use crate::live::{LiveDragEntry, LiveDragPayload};
use crate::lock::{LockGuard, LockRegistry};
use crate::shapes::{ShapeId, ShapePatch, ShapeUpdate};
use crate::store::ObjectStore;
use crate::throttle::{Scheduler, Throttle, TimerId};
use kurbo::{Point, Vec2};
use std::rc::Rc;

/// Effects a gesture asks of the outside world.
pub trait DragSink {
    /// Repaint with the coordinator's live positions.
    fn request_redraw(&mut self);
    /// Publish live positions on the ephemeral channel.
    fn broadcast(&mut self, payload: &LiveDragPayload);
    /// Retract previously published positions.
    fn clear_broadcast(&mut self, ids: &[ShapeId]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragPhase {
    Idle,
    Dragging,
}

/// What a finished gesture committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DragOutcome {
    /// Shapes whose position was written.
    pub moved: usize,
    /// Shapes whose `parentId` changed afterwards.
    pub reparented: usize,
}

/// State of the gesture in progress.
struct ActiveDrag {
    anchor: ShapeId,
    anchor_origin: Point,
    /// Pre-drag position of every member.
    origins: Vec<(ShapeId, Point)>,
    /// Live positions, same order as `origins`.
    positions: Vec<(ShapeId, Point)>,
    payload: LiveDragPayload,
    delta: Vec2,
    _guard: LockGuard,
}

/// Drives one drag gesture at a time.
pub struct DragCoordinator {
    author_id: String,
    locks: LockRegistry,
    scheduler: Rc<dyn Scheduler>,
    redraw: Throttle,
    broadcast: Throttle,
    active: Option<ActiveDrag>,
    last_timestamp: u64,
}

impl DragCoordinator {
    pub fn new(
        author_id: impl Into<String>,
        locks: LockRegistry,
        scheduler: Rc<dyn Scheduler>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            author_id: author_id.into(),
            locks,
            redraw: Throttle::new(scheduler.clone(), config.redraw_interval_ms),
            broadcast: Throttle::new(scheduler.clone(), config.broadcast_interval_ms),
            scheduler,
            active: None,
            last_timestamp: 0,
        }
    }

    pub fn phase(&self) -> DragPhase {
        if self.active.is_some() {
            DragPhase::Dragging
        } else {
            DragPhase::Idle
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.active.is_some()
    }

    /// The shape the pointer grabbed.
    pub fn anchor(&self) -> Option<ShapeId> {
        self.active.as_ref().map(|a| a.anchor)
    }

    /// Ids moving with the gesture.
    pub fn members(&self) -> Vec<ShapeId> {
        self.active
            .as_ref()
            .map(|a| a.origins.iter().map(|(id, _)| *id).collect())
            .unwrap_or_default()
    }

    /// Current offset from the pre-drag positions.
    pub fn delta(&self) -> Vec2 {
        self.active.as_ref().map_or(Vec2::ZERO, |a| a.delta)
    }

    /// Live positions for rendering.
    pub fn live_positions(&self) -> &[(ShapeId, Point)] {
        self.active
            .as_ref()
            .map(|a| a.positions.as_slice())
            .unwrap_or(&[])
    }

    /// Start dragging `grabbed`.
    ///
    /// If it is part of the selection the whole selection moves, otherwise
    /// just the grabbed shape; frames bring their descendants. All members
    /// are locked until the gesture ends. A gesture already in progress is
    /// cancelled first.
    pub fn begin(&mut self, store: &ObjectStore, grabbed: ShapeId) -> bool {
        self.cancel();
        let Some(anchor) = store.get(grabbed) else {
            log::warn!("Cannot drag missing shape {}", grabbed);
            return false;
        };
        let anchor_origin = anchor.position();

        let roots = if store.is_selected(grabbed) {
            store.selected_ids().to_vec()
        } else {
            vec![grabbed]
        };
        let origins: Vec<(ShapeId, Point)> = with_descendants(store.shapes(), &roots)
            .into_iter()
            .filter_map(|id| store.get(id).map(|s| (id, s.position())))
            .collect();
        let ids: Vec<ShapeId> = origins.iter().map(|(id, _)| *id).collect();
        log::debug!("Drag started on {} with {} member(s)", grabbed, ids.len());

        self.active = Some(ActiveDrag {
            anchor: grabbed,
            anchor_origin,
            positions: origins.clone(),
            origins,
            payload: LiveDragPayload::new(),
            delta: Vec2::ZERO,
            _guard: self.locks.acquire(&ids),
        });
        true
    }

    /// Move the anchor shape to `position`; every other member follows rigidly.
    pub fn drag_to(&mut self, position: Point, sink: &mut dyn DragSink) -> bool {
        let Some(active) = self.active.as_ref() else {
            return false;
        };
        let delta = position - active.anchor_origin;
        self.drag_by(delta, sink)
    }

    /// Set the group's offset from its pre-drag positions.
    pub fn drag_by(&mut self, delta: Vec2, sink: &mut dyn DragSink) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        active.delta = delta;
        for (slot, (_, origin)) in active.positions.iter_mut().zip(&active.origins) {
            slot.1 = *origin + delta;
        }

        if self.redraw.request() {
            sink.request_redraw();
        }
        if self.broadcast.request() {
            self.send(sink);
        }
        true
    }

    /// Route a due timer. Returns false if neither throttle owns it.
    pub fn on_timer(&mut self, id: TimerId, sink: &mut dyn DragSink) -> bool {
        if self.redraw.on_timer(id) {
            sink.request_redraw();
            return true;
        }
        if self.broadcast.on_timer(id) {
            self.send(sink);
            return true;
        }
        false
    }

    /// Release the gesture and commit.
    ///
    /// Only members whose position changed are written, in one batch. Members
    /// that are connectors are written only when they have a free endpoint,
    /// since tracked endpoints are always re-derived. Re-parenting runs over
    /// the group afterwards as a second batch. Returns `None` when idle.
    pub fn end(&mut self, store: &mut ObjectStore, sink: &mut dyn DragSink) -> Option<DragOutcome> {
        let active = self.active.take()?;
        self.redraw.reset();
        self.broadcast.reset();

        let updates: Vec<ShapeUpdate> = active
            .origins
            .iter()
            .filter_map(|&(id, origin)| position_update(store, id, origin, active.delta))
            .collect();

        let mut outcome = DragOutcome::default();
        if !updates.is_empty() {
            outcome.moved = store.update_shapes(&updates);
        }
        if outcome.moved > 0 {
            let members: Vec<ShapeId> = active.origins.iter().map(|(id, _)| *id).collect();
            let reparent = compute_reparent_updates(store.shapes(), &members);
            if !reparent.is_empty() {
                outcome.reparented = store.update_shapes(&reparent);
            }
        }
        log::debug!(
            "Drag ended: {} moved, {} reparented",
            outcome.moved,
            outcome.reparented
        );

        let ids: Vec<ShapeId> = active.origins.iter().map(|(id, _)| *id).collect();
        drop(active);
        sink.clear_broadcast(&ids);
        sink.request_redraw();
        Some(outcome)
    }

    /// Abandon the gesture without committing. Safe to call when idle.
    pub fn cancel(&mut self) -> bool {
        self.redraw.reset();
        self.broadcast.reset();
        match self.active.take() {
            Some(active) => {
                log::debug!("Drag on {} cancelled", active.anchor);
                true
            }
            None => false,
        }
    }

    /// Monotonic broadcast clock.
    fn next_timestamp(&mut self) -> u64 {
        let ts = self.scheduler.now_ms().max(self.last_timestamp + 1);
        self.last_timestamp = ts;
        ts
    }

    fn send(&mut self, sink: &mut dyn DragSink) {
        if self.active.is_none() {
            return;
        }
        let timestamp = self.next_timestamp();
        let author = self.author_id.as_str();
        let Some(active) = self.active.as_mut() else {
            return;
        };
        for &(id, position) in &active.positions {
            match active.payload.get_mut(&id) {
                Some(entry) => {
                    entry.x = position.x;
                    entry.y = position.y;
                    entry.timestamp = timestamp;
                }
                None => {
                    active
                        .payload
                        .insert(id, LiveDragEntry::new(position, author, timestamp));
                }
            }
        }
        sink.broadcast(&active.payload);
    }
}

impl Drop for DragCoordinator {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Patch for one member at release, if it needs one.
fn position_update(store: &ObjectStore, id: ShapeId, origin: Point, delta: Vec2) -> Option<ShapeUpdate> {
    let shape = store.get(id)?;
    let target = origin + delta;
    if target == shape.position() {
        return None;
    }

    let mut patch = ShapePatch::position(target.x, target.y);
    if let Some(connector) = shape.as_connector() {
        if !connector.has_free_endpoint() {
            return None;
        }
        let shift = target - shape.position();
        match ShapePatch::endpoints(&connector.from.translated(shift), &connector.to.translated(shift)) {
            Ok(endpoints) => patch.merge(endpoints),
            Err(e) => {
                log::warn!("Cannot move connector {}: {}", id, e);
                return None;
            }
        }
    }
    Some(ShapeUpdate::new(id, patch))
}
