//! Glue between the object store and the remote channels.

use super::{
    DurableChange, DurableEvent, DurableRecord, DurableStore, DurableWrite, EphemeralChannel,
    SyncResult, TransportError,
};
use crate::config::SyncConfig;
use crate::diff::{ShapeDiff, diff_shape_writes, field_patch, shape_fields};
use crate::live::{LiveDragOverlay, LiveDragPayload};
use crate::lock::LockRegistry;
use crate::shapes::{Shape, ShapeId, ShapePatch};
use crate::store::ObjectStore;
use crate::throttle::Scheduler;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

/// A held-back change and the local shape as it was when it arrived.
struct Deferred {
    change: DurableChange,
    base: Option<Arc<Shape>>,
}

/// Translates store mutations into channel writes and channel events back
/// into store updates.
pub struct SyncBridge<D, E> {
    durable: D,
    ephemeral: E,
    author_id: String,
    locks: LockRegistry,
    scheduler: Rc<dyn Scheduler>,
    config: SyncConfig,
    /// Inbound changes held back while their shapes are locked.
    deferred: Vec<Deferred>,
    overlay: LiveDragOverlay,
    closing: bool,
}

impl<D: DurableStore, E: EphemeralChannel> SyncBridge<D, E> {
    pub fn new(
        durable: D,
        ephemeral: E,
        author_id: impl Into<String>,
        locks: LockRegistry,
        scheduler: Rc<dyn Scheduler>,
        config: SyncConfig,
    ) -> Self {
        let author_id = author_id.into();
        Self {
            overlay: LiveDragOverlay::new(author_id.clone(), config.stale_after_ms),
            durable,
            ephemeral,
            author_id,
            locks,
            scheduler,
            config,
            deferred: Vec::new(),
            closing: false,
        }
    }

    pub fn durable(&self) -> &D {
        &self.durable
    }

    pub fn durable_mut(&mut self) -> &mut D {
        &mut self.durable
    }

    pub fn ephemeral(&self) -> &E {
        &self.ephemeral
    }

    pub fn ephemeral_mut(&mut self) -> &mut E {
        &mut self.ephemeral
    }

    pub fn author_id(&self) -> &str {
        &self.author_id
    }

    /// Remote drag positions to draw over the board.
    pub fn overlay(&self) -> &LiveDragOverlay {
        &self.overlay
    }

    /// Number of inbound changes waiting on locks.
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    // --- Durable writes ---

    /// Durable writes for a diff, tagged with this author and the current time.
    pub fn build_writes(&self, diff: &ShapeDiff) -> Vec<DurableWrite> {
        let now = self.scheduler.now_ms();
        let mut writes = Vec::with_capacity(diff.len());

        for shape in &diff.added {
            let mut fields = shape_fields(shape);
            self.stamp(&mut fields, now);
            writes.push(DurableWrite::Set { id: shape.id, fields });
        }
        for update in &diff.modified {
            let mut fields = update.patch.as_map().clone();
            self.stamp(&mut fields, now);
            writes.push(DurableWrite::Update { id: update.id, fields });
        }
        for id in &diff.deleted {
            writes.push(DurableWrite::Delete { id: *id });
        }
        writes
    }

    /// Persist a diff. Returns the number of writes sent.
    pub fn persist_diff(&mut self, diff: &ShapeDiff) -> SyncResult<usize> {
        if diff.is_empty() {
            return Ok(0);
        }
        let writes = self.build_writes(diff);
        self.persist_writes(&writes)
    }

    /// Persist the difference between two collections.
    pub fn persist_changes(&mut self, prev: &[Arc<Shape>], curr: &[Arc<Shape>]) -> SyncResult<usize> {
        let diff = diff_shape_writes(prev, curr);
        self.persist_diff(&diff)
    }

    /// Send writes in sequential batches no larger than the write ceiling.
    pub fn persist_writes(&mut self, writes: &[DurableWrite]) -> SyncResult<usize> {
        let ceiling = self.config.effective_max_batch_writes();
        let batches = writes.len().div_ceil(ceiling);
        if batches > 1 {
            log::debug!("Splitting {} writes into {} batches", writes.len(), batches);
        }
        for chunk in writes.chunks(ceiling) {
            let result = self.durable.commit(chunk);
            self.check(result)?;
        }
        Ok(writes.len())
    }

    /// Delete shapes locally (with the usual cascade) and persist every
    /// resulting change, including orphaned children.
    pub fn delete_shapes(&mut self, store: &mut ObjectStore, ids: &[ShapeId]) -> SyncResult<Vec<ShapeId>> {
        let prev = store.snapshot();
        let removed = store.delete_shapes(ids);
        self.persist_changes(&prev, store.shapes())?;
        Ok(removed)
    }

    // --- Durable reads ---

    /// Apply an event from the durable subscription.
    ///
    /// A snapshot replaces the collection wholesale. A batch of changes is
    /// applied as one store update; changes for locked shapes are held back
    /// until [`SyncBridge::flush_deferred`]. Returns the number of changes
    /// applied now.
    pub fn handle_durable_event(&mut self, store: &mut ObjectStore, event: DurableEvent) -> usize {
        if self.closing {
            log::debug!("Ignoring durable event after teardown");
            return 0;
        }
        match event {
            DurableEvent::Snapshot(records) => {
                let count = records.len();
                log::info!("Loaded snapshot with {} shape(s)", count);
                self.deferred.clear();
                store.set_shapes(records.into_iter().map(|r| r.shape).collect());
                count
            }
            DurableEvent::Changes(changes) => {
                let mut ready = Vec::with_capacity(changes.len());
                for change in changes {
                    if self.locks.is_locked(change.id()) {
                        log::debug!("Deferring remote change for locked shape {}", change.id());
                        let base = store.shapes().iter().find(|s| s.id == change.id()).cloned();
                        self.deferred.push(Deferred { change, base });
                    } else {
                        ready.push(change);
                    }
                }
                apply_changes(store, ready)
            }
        }
    }

    /// Apply held-back changes whose shapes are no longer locked.
    pub fn flush_deferred(&mut self, store: &mut ObjectStore) -> usize {
        if self.deferred.is_empty() {
            return 0;
        }
        let (ready, still_locked): (Vec<_>, Vec<_>) = std::mem::take(&mut self.deferred)
            .into_iter()
            .partition(|held| !self.locks.is_locked(held.change.id()));
        self.deferred = still_locked;
        let ready = ready.into_iter().map(|held| rebase_change(store, held)).collect();
        apply_changes(store, ready)
    }

    // --- Ephemeral channel ---

    pub fn publish_live(&mut self, payload: &LiveDragPayload) -> SyncResult<()> {
        let result = self.ephemeral.publish(payload);
        self.check(result)
    }

    pub fn retract_live(&mut self, ids: &[ShapeId]) -> SyncResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let result = self.ephemeral.retract(ids);
        self.check(result)
    }

    /// Feed a received payload through the live-drag filter into the overlay.
    pub fn receive_live(&mut self, payload: &LiveDragPayload) -> usize {
        if self.closing {
            return 0;
        }
        self.overlay.apply(payload, self.scheduler.now_ms())
    }

    /// Expire overlay entries that went stale.
    pub fn expire_live(&mut self) {
        self.overlay.expire(self.scheduler.now_ms());
    }

    /// Close both subscriptions and drop pending state. Safe to call twice.
    pub fn teardown(&mut self) {
        if self.closing {
            return;
        }
        self.closing = true;
        self.deferred.clear();
        self.overlay.clear();
        self.ephemeral.close();
        self.durable.close();
        log::debug!("Sync bridge for {} torn down", self.author_id);
    }

    fn stamp(&self, fields: &mut Map<String, Value>, now: u64) {
        fields.insert("updatedAt".into(), Value::from(now));
        fields.insert("updatedBy".into(), Value::String(self.author_id.clone()));
    }

    /// Transport failures during teardown are expected and swallowed.
    fn check(&self, result: Result<(), TransportError>) -> SyncResult<()> {
        match result {
            Ok(()) => Ok(()),
            Err(e) if self.closing => {
                log::debug!("Suppressed transport error during teardown: {}", e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Replay a held-back change over local edits made while it waited.
///
/// Only the fields the remote writer changed relative to `base` are taken.
/// Fields the local user changed since `base` keep their local value.
fn rebase_change(store: &ObjectStore, held: Deferred) -> DurableChange {
    let Deferred { change, base } = held;
    let (DurableChange::Added(mut record) | DurableChange::Modified(mut record)) = change.clone() else {
        return change;
    };
    let (Some(base), Some(current)) = (base, store.get(record.id())) else {
        return change;
    };
    let local = field_patch(&base, current);
    let mut remote = field_patch(&base, &record.shape).into_map();
    remote.retain(|field, _| !local.contains(field));
    match ShapePatch::from(remote).apply_to(current) {
        Ok(merged) => {
            record.shape = merged;
            DurableChange::Modified(record)
        }
        Err(e) => {
            log::warn!("Dropping deferred change for {}: {}", record.id(), e);
            DurableChange::Modified(DurableRecord::new(current.clone(), record.updated_at, record.updated_by))
        }
    }
}

/// Coalesce changes (later ones win per id) and apply them as one update.
/// Records identical to the local shape are skipped.
fn apply_changes(store: &mut ObjectStore, changes: Vec<DurableChange>) -> usize {
    if changes.is_empty() {
        return 0;
    }
    let total = changes.len();
    let mut upserts: Vec<Shape> = Vec::new();
    let mut removals: Vec<ShapeId> = Vec::new();

    for change in changes {
        let id = change.id();
        upserts.retain(|s| s.id != id);
        removals.retain(|r| *r != id);
        match change {
            DurableChange::Added(record) | DurableChange::Modified(record) => upserts.push(record.shape),
            DurableChange::Removed(id) => removals.push(id),
        }
    }

    upserts.retain(|shape| {
        store
            .get(shape.id)
            .is_none_or(|local| !field_patch(local, shape).is_empty())
    });
    let known: HashSet<ShapeId> = store.shapes().iter().map(|s| s.id).collect();
    removals.retain(|id| known.contains(id));

    if upserts.is_empty() && removals.is_empty() {
        log::debug!("Remote batch of {} change(s) already reflected locally", total);
        return 0;
    }
    let applied = upserts.len() + removals.len();
    store.apply_remote_batch(upserts, &removals);
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{Rectangle, ShapeKind, ShapePatch, ShapeUpdate};
    use crate::sync::{DurableRecord, MemoryDurableStore, MemoryEphemeralChannel, SyncError};
    use crate::throttle::ManualScheduler;

    fn bridge(config: SyncConfig) -> (LockRegistry, SyncBridge<MemoryDurableStore, MemoryEphemeralChannel>) {
        let locks = LockRegistry::new();
        let scheduler = Rc::new(ManualScheduler::starting_at(5_000));
        let bridge = SyncBridge::new(
            MemoryDurableStore::new(),
            MemoryEphemeralChannel::new(),
            "me",
            locks.clone(),
            scheduler,
            config,
        );
        (locks, bridge)
    }

    fn remote_rect(x: f64) -> Shape {
        Shape::new(ShapeKind::Rectangle(Rectangle::new(10.0, 10.0)), x, 0.0)
    }

    #[test]
    fn test_local_edit_writes_single_field_update() {
        let (_locks, mut bridge) = bridge(SyncConfig::default());
        let mut store = ObjectStore::default();
        let prev = store.snapshot();
        let id = store.add_rectangle(0.0, 0.0, 10.0, 10.0);
        bridge.persist_changes(&prev, store.shapes()).unwrap();

        let prev = store.snapshot();
        store.update_shapes(&[ShapeUpdate::new(id, ShapePatch::position(0.0, 30.0))]);
        let sent = bridge.persist_changes(&prev, store.shapes()).unwrap();
        assert_eq!(sent, 1);

        let last = bridge.durable().batches().last().unwrap();
        let DurableWrite::Update { fields, .. } = &last[0] else {
            panic!("expected an update");
        };
        let mut keys: Vec<&str> = fields.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["updatedAt", "updatedBy", "y"]);
        assert_eq!(fields["updatedBy"], "me");
    }

    #[test]
    fn test_writes_are_chunked() {
        let config = SyncConfig {
            max_batch_writes: 3,
            ..SyncConfig::default()
        };
        let (_locks, mut bridge) = bridge(config);
        let mut store = ObjectStore::default();
        let prev = store.snapshot();
        for i in 0..7 {
            store.add_rectangle(i as f64 * 20.0, 0.0, 10.0, 10.0);
        }

        assert_eq!(bridge.persist_changes(&prev, store.shapes()).unwrap(), 7);
        let sizes: Vec<usize> = bridge.durable().batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(bridge.durable().len(), 7);
    }

    #[test]
    fn test_delete_persists_cascade_and_orphans() {
        let (_locks, mut bridge) = bridge(SyncConfig::default());
        let mut store = ObjectStore::default();
        let frame = store.add_frame(0.0, 0.0, 200.0, 200.0, "f");
        let child = store.add_rectangle(10.0, 10.0, 10.0, 10.0);
        store.update_shapes(&[ShapeUpdate::new(child, ShapePatch::parent(Some(frame)))]);
        bridge.persist_changes(&[], store.shapes()).unwrap();

        bridge.delete_shapes(&mut store, &[frame]).unwrap();
        let record = bridge.durable().record(child).unwrap();
        assert!(!record.contains_key("parentId"));
        assert!(bridge.durable().record(frame).is_none());
    }

    #[test]
    fn test_snapshot_replaces_collection_without_history() {
        let (_locks, mut bridge) = bridge(SyncConfig::default());
        let mut store = ObjectStore::default();
        store.add_rectangle(0.0, 0.0, 10.0, 10.0);
        let history = store.history_len();

        let records = vec![
            DurableRecord::new(remote_rect(1.0), 1, "them"),
            DurableRecord::new(remote_rect(2.0), 1, "them"),
        ];
        assert_eq!(bridge.handle_durable_event(&mut store, DurableEvent::Snapshot(records)), 2);
        assert_eq!(store.len(), 2);
        assert_eq!(store.history_len(), history);
    }

    #[test]
    fn test_change_batch_is_one_store_update() {
        let (_locks, mut bridge) = bridge(SyncConfig::default());
        let mut store = ObjectStore::default();
        let revision = store.revision();

        let a = remote_rect(1.0);
        let b = remote_rect(2.0);
        let mut b_moved = b.clone();
        b_moved.x = 50.0;
        let changes = vec![
            DurableChange::Added(DurableRecord::new(a.clone(), 1, "them")),
            DurableChange::Added(DurableRecord::new(b.clone(), 1, "them")),
            DurableChange::Modified(DurableRecord::new(b_moved, 2, "them")),
        ];
        bridge.handle_durable_event(&mut store, DurableEvent::Changes(changes));

        assert_eq!(store.revision(), revision + 1);
        assert!((store.get(b.id).unwrap().x - 50.0).abs() < f64::EPSILON);

        let removal = vec![DurableChange::Removed(a.id)];
        bridge.handle_durable_event(&mut store, DurableEvent::Changes(removal));
        assert!(!store.contains(a.id));
    }

    #[test]
    fn test_locked_changes_wait_for_release() {
        let (locks, mut bridge) = bridge(SyncConfig::default());
        let mut store = ObjectStore::default();
        let shape = remote_rect(0.0);
        store.set_shapes(vec![shape.clone()]);

        let guard = locks.acquire(&[shape.id]);
        let mut moved = shape.clone();
        moved.x = 99.0;
        let applied = bridge.handle_durable_event(
            &mut store,
            DurableEvent::Changes(vec![DurableChange::Modified(DurableRecord::new(moved, 2, "them"))]),
        );
        assert_eq!(applied, 0);
        assert_eq!(bridge.deferred_len(), 1);
        assert_eq!(bridge.flush_deferred(&mut store), 0);

        drop(guard);
        assert_eq!(bridge.flush_deferred(&mut store), 1);
        assert!((store.get(shape.id).unwrap().x - 99.0).abs() < f64::EPSILON);
        assert_eq!(bridge.deferred_len(), 0);
    }

    #[test]
    fn test_released_change_keeps_local_edits() {
        let (locks, mut bridge) = bridge(SyncConfig::default());
        let mut store = ObjectStore::default();
        let shape = remote_rect(0.0);
        store.set_shapes(vec![shape.clone()]);

        let guard = locks.acquire(&[shape.id]);
        let mut rotated = shape.clone();
        rotated.rotation = 45.0;
        bridge.handle_durable_event(
            &mut store,
            DurableEvent::Changes(vec![DurableChange::Modified(DurableRecord::new(rotated, 2, "them"))]),
        );
        store.update_shapes(&[ShapeUpdate::new(shape.id, ShapePatch::position(20.0, 5.0))]);
        drop(guard);

        assert_eq!(bridge.flush_deferred(&mut store), 1);
        let merged = store.get(shape.id).unwrap();
        assert!((merged.x - 20.0).abs() < f64::EPSILON);
        assert!((merged.y - 5.0).abs() < f64::EPSILON);
        assert!((merged.rotation - 45.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_own_echo_is_not_reapplied() {
        let (_locks, mut bridge) = bridge(SyncConfig::default());
        let mut store = ObjectStore::default();
        let id = store.add_rectangle(0.0, 0.0, 10.0, 10.0);
        let revision = store.revision();

        let echo = DurableRecord::new(store.get(id).unwrap().clone(), 5_000, "me");
        let applied = bridge.handle_durable_event(&mut store, DurableEvent::Changes(vec![DurableChange::Added(echo)]));
        assert_eq!(applied, 0);
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn test_transport_errors_surface_until_teardown() {
        let (_locks, mut bridge) = bridge(SyncConfig::default());
        let mut store = ObjectStore::default();
        store.add_rectangle(0.0, 0.0, 10.0, 10.0);

        bridge
            .durable_mut()
            .fail_with(TransportError::PermissionDenied("signed out".into()));
        let err = bridge.persist_changes(&[], store.shapes()).unwrap_err();
        assert!(matches!(err, SyncError::Transport(TransportError::PermissionDenied(_))));

        bridge.teardown();
        bridge.teardown();
        assert!(bridge.persist_changes(&[], store.shapes()).is_ok());
        assert!(bridge.ephemeral().is_closed());
        assert_eq!(bridge.durable().close_count(), 1);
    }

    #[test]
    fn test_receive_live_filters_into_overlay() {
        let (_locks, mut bridge) = bridge(SyncConfig::default());
        let theirs = ShapeId::new_v4();
        let mine = ShapeId::new_v4();
        let payload = LiveDragPayload::from([
            (theirs, crate::live::LiveDragEntry::new(kurbo::Point::new(3.0, 4.0), "them", 4_900)),
            (mine, crate::live::LiveDragEntry::new(kurbo::Point::new(1.0, 1.0), "me", 4_900)),
        ]);

        assert_eq!(bridge.receive_live(&payload), 1);
        assert_eq!(bridge.overlay().position(theirs), Some(kurbo::Point::new(3.0, 4.0)));
        assert!(bridge.overlay().position(mine).is_none());
    }
}
