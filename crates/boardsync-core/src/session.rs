//! One client's live connection to a board.
//!
//! [`BoardSession`] owns the store, the sync bridge and the drag coordinator
//! and wires them together: local mutations are diffed and persisted, drag
//! gestures publish on the ephemeral channel, inbound events land in the
//! store or the overlay, and every path ends with a redraw request.

use crate::config::SyncConfig;
use crate::drag::{DragCoordinator, DragOutcome, DragSink};
use crate::live::{LiveDragOverlay, LiveDragPayload};
use crate::lock::LockRegistry;
use crate::shapes::ShapeId;
use crate::store::ObjectStore;
use crate::sync::{DurableEvent, DurableStore, EphemeralChannel, SyncBridge, SyncResult};
use crate::throttle::{Scheduler, TimerId};
use kurbo::{Point, Vec2};
use std::rc::Rc;

/// Routes drag effects to the bridge and the redraw callback.
struct Outbound<'a, D, E> {
    bridge: &'a mut SyncBridge<D, E>,
    redraw: &'a mut dyn FnMut(),
}

impl<D: DurableStore, E: EphemeralChannel> DragSink for Outbound<'_, D, E> {
    fn request_redraw(&mut self) {
        (self.redraw)();
    }

    fn broadcast(&mut self, payload: &LiveDragPayload) {
        if let Err(e) = self.bridge.publish_live(payload) {
            log::warn!("Failed to publish live drag: {}", e);
        }
    }

    fn clear_broadcast(&mut self, ids: &[ShapeId]) {
        if let Err(e) = self.bridge.retract_live(ids) {
            log::warn!("Failed to retract live drag: {}", e);
        }
    }
}

/// Store, replication and gestures for one author on one board.
pub struct BoardSession<D: DurableStore, E: EphemeralChannel> {
    store: ObjectStore,
    bridge: SyncBridge<D, E>,
    drag: DragCoordinator,
    redraw: Box<dyn FnMut()>,
    torn_down: bool,
}

impl<D: DurableStore, E: EphemeralChannel> BoardSession<D, E> {
    pub fn new(
        author_id: impl Into<String>,
        config: SyncConfig,
        durable: D,
        ephemeral: E,
        scheduler: Rc<dyn Scheduler>,
        redraw: impl FnMut() + 'static,
    ) -> Self {
        let author_id = author_id.into();
        let locks = LockRegistry::new();
        Self {
            drag: DragCoordinator::new(author_id.clone(), locks.clone(), scheduler.clone(), &config),
            bridge: SyncBridge::new(durable, ephemeral, author_id, locks, scheduler, config.clone()),
            store: ObjectStore::new(config),
            redraw: Box::new(redraw),
            torn_down: false,
        }
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn bridge(&self) -> &SyncBridge<D, E> {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut SyncBridge<D, E> {
        &mut self.bridge
    }

    pub fn drag(&self) -> &DragCoordinator {
        &self.drag
    }

    /// Remote drag positions to draw over the board.
    pub fn overlay(&self) -> &LiveDragOverlay {
        self.bridge.overlay()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Run a local mutation and persist whatever it changed.
    pub fn apply<R>(&mut self, op: impl FnOnce(&mut ObjectStore) -> R) -> SyncResult<R> {
        let prev = self.store.snapshot();
        let revision = self.store.revision();
        let result = op(&mut self.store);
        if self.store.revision() != revision {
            self.bridge.persist_changes(&prev, self.store.shapes())?;
            (self.redraw)();
        }
        Ok(result)
    }

    pub fn undo(&mut self) -> SyncResult<bool> {
        self.apply(ObjectStore::undo)
    }

    pub fn redo(&mut self) -> SyncResult<bool> {
        self.apply(ObjectStore::redo)
    }

    pub fn delete_shapes(&mut self, ids: &[ShapeId]) -> SyncResult<Vec<ShapeId>> {
        self.apply(|store| store.delete_shapes(ids))
    }

    // --- Gestures ---

    pub fn begin_drag(&mut self, grabbed: ShapeId) -> bool {
        self.drag.begin(&self.store, grabbed)
    }

    pub fn drag_to(&mut self, position: Point) -> bool {
        let mut out = Outbound {
            bridge: &mut self.bridge,
            redraw: &mut *self.redraw,
        };
        self.drag.drag_to(position, &mut out)
    }

    pub fn drag_by(&mut self, delta: Vec2) -> bool {
        let mut out = Outbound {
            bridge: &mut self.bridge,
            redraw: &mut *self.redraw,
        };
        self.drag.drag_by(delta, &mut out)
    }

    /// Finish the gesture, persist its commits and apply any remote changes
    /// that were held back while its shapes were locked.
    pub fn end_drag(&mut self) -> SyncResult<Option<DragOutcome>> {
        let prev = self.store.snapshot();
        let mut out = Outbound {
            bridge: &mut self.bridge,
            redraw: &mut *self.redraw,
        };
        let outcome = self.drag.end(&mut self.store, &mut out);
        self.bridge.persist_changes(&prev, self.store.shapes())?;
        if self.bridge.flush_deferred(&mut self.store) > 0 {
            (self.redraw)();
        }
        Ok(outcome)
    }

    /// Abandon the gesture without committing anything.
    pub fn cancel_drag(&mut self) -> bool {
        let members = self.drag.members();
        if !self.drag.cancel() {
            return false;
        }
        if let Err(e) = self.bridge.retract_live(&members) {
            log::warn!("Failed to retract live drag: {}", e);
        }
        self.bridge.flush_deferred(&mut self.store);
        (self.redraw)();
        true
    }

    /// Hand a due timer back. Returns false if nothing here owned it.
    pub fn fire_timer(&mut self, id: TimerId) -> bool {
        let mut out = Outbound {
            bridge: &mut self.bridge,
            redraw: &mut *self.redraw,
        };
        self.drag.on_timer(id, &mut out)
    }

    // --- Inbound ---

    pub fn handle_durable_event(&mut self, event: DurableEvent) -> usize {
        let revision = self.store.revision();
        let applied = self.bridge.handle_durable_event(&mut self.store, event);
        if self.store.revision() != revision {
            (self.redraw)();
        }
        applied
    }

    pub fn handle_live_payload(&mut self, payload: &LiveDragPayload) -> usize {
        let changed = self.bridge.receive_live(payload);
        if changed > 0 {
            (self.redraw)();
        }
        changed
    }

    /// Stop everything: cancel the gesture (releasing its locks and timers)
    /// and close both channels. Safe to call twice; also runs on drop.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        let members = self.drag.members();
        if self.drag.cancel() {
            if let Err(e) = self.bridge.retract_live(&members) {
                log::debug!("Retract during teardown failed: {}", e);
            }
        }
        self.bridge.teardown();
    }
}

impl<D: DurableStore, E: EphemeralChannel> Drop for BoardSession<D, E> {
    fn drop(&mut self) {
        self.teardown();
    }
}
