//! In-memory channels for testing and single-process use.

use super::{DurableChange, DurableEvent, DurableRecord, DurableStore, DurableWrite, EphemeralChannel, TransportError};
use crate::live::LiveDragPayload;
use crate::shapes::ShapeId;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// In-memory durable store that records every committed batch.
#[derive(Debug, Default)]
pub struct MemoryDurableStore {
    records: BTreeMap<ShapeId, Map<String, Value>>,
    batches: Vec<Vec<DurableWrite>>,
    failure: Option<TransportError>,
    close_count: usize,
}

impl MemoryDurableStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every following commit with `error`.
    pub fn fail_with(&mut self, error: TransportError) {
        self.failure = Some(error);
    }

    /// Stop failing commits.
    pub fn recover(&mut self) {
        self.failure = None;
    }

    pub fn record(&self, id: ShapeId) -> Option<&Map<String, Value>> {
        self.records.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every batch committed so far, in order.
    pub fn batches(&self) -> &[Vec<DurableWrite>] {
        &self.batches
    }

    pub fn close_count(&self) -> usize {
        self.close_count
    }

    /// Stored records parsed back into shapes. Unparseable records are skipped.
    pub fn parsed_records(&self) -> Vec<DurableRecord> {
        self.records
            .values()
            .filter_map(|fields| match DurableRecord::from_fields(fields.clone()) {
                Ok(record) => Some(record),
                Err(e) => {
                    log::warn!("Skipping unreadable record: {}", e);
                    None
                }
            })
            .collect()
    }

    /// What a new subscriber would receive first.
    pub fn snapshot_event(&self) -> DurableEvent {
        DurableEvent::Snapshot(self.parsed_records())
    }

    /// The changes one committed batch produces for other subscribers.
    pub fn changes_for(&self, batch: &[DurableWrite]) -> DurableEvent {
        let changes = batch
            .iter()
            .filter_map(|write| match write {
                DurableWrite::Delete { id } => Some(DurableChange::Removed(*id)),
                DurableWrite::Set { id, .. } | DurableWrite::Update { id, .. } => {
                    let fields = self.records.get(id)?.clone();
                    let record = DurableRecord::from_fields(fields).ok()?;
                    Some(match write {
                        DurableWrite::Set { .. } => DurableChange::Added(record),
                        _ => DurableChange::Modified(record),
                    })
                }
            })
            .collect();
        DurableEvent::Changes(changes)
    }
}

impl DurableStore for MemoryDurableStore {
    fn commit(&mut self, writes: &[DurableWrite]) -> Result<(), TransportError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        for write in writes {
            match write {
                DurableWrite::Set { id, fields } => {
                    self.records.insert(*id, fields.clone());
                }
                DurableWrite::Update { id, fields } => {
                    let Some(record) = self.records.get_mut(id) else {
                        log::warn!("Update for missing record {} ignored", id);
                        continue;
                    };
                    for (key, value) in fields {
                        if value.is_null() {
                            record.remove(key);
                        } else {
                            record.insert(key.clone(), value.clone());
                        }
                    }
                }
                DurableWrite::Delete { id } => {
                    self.records.remove(id);
                }
            }
        }
        self.batches.push(writes.to_vec());
        Ok(())
    }

    fn close(&mut self) {
        self.close_count += 1;
    }
}

/// In-memory ephemeral channel holding this client's published positions.
#[derive(Debug, Default)]
pub struct MemoryEphemeralChannel {
    published: LiveDragPayload,
    publish_count: usize,
    failure: Option<TransportError>,
    closed: bool,
}

impl MemoryEphemeralChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current published positions, as a reader would receive them.
    pub fn payload(&self) -> &LiveDragPayload {
        &self.published
    }

    pub fn publish_count(&self) -> usize {
        self.publish_count
    }

    pub fn fail_with(&mut self, error: TransportError) {
        self.failure = Some(error);
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl EphemeralChannel for MemoryEphemeralChannel {
    fn publish(&mut self, payload: &LiveDragPayload) -> Result<(), TransportError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.published
            .extend(payload.iter().map(|(id, entry)| (*id, entry.clone())));
        self.publish_count += 1;
        Ok(())
    }

    fn retract(&mut self, ids: &[ShapeId]) -> Result<(), TransportError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        for id in ids {
            self.published.remove(id);
        }
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{Rectangle, Shape, ShapeKind};
    use crate::diff::shape_fields;

    #[test]
    fn test_update_merges_and_clears_fields() {
        let shape = Shape::new(ShapeKind::Rectangle(Rectangle::new(10.0, 10.0)), 0.0, 0.0);
        let mut store = MemoryDurableStore::new();
        store
            .commit(&[DurableWrite::Set { id: shape.id, fields: shape_fields(&shape) }])
            .unwrap();

        let mut fields = Map::new();
        fields.insert("x".into(), Value::from(5.0));
        fields.insert("rotation".into(), Value::Null);
        store.commit(&[DurableWrite::Update { id: shape.id, fields }]).unwrap();

        let record = store.record(shape.id).unwrap();
        assert_eq!(record["x"], 5.0);
        assert!(!record.contains_key("rotation"));

        // Missing rotation falls back to its default when read back
        let parsed = store.parsed_records();
        assert_eq!(parsed.len(), 1);
        assert!((parsed[0].shape.x - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_changes_for_reflects_batch() {
        let shape = Shape::new(ShapeKind::Rectangle(Rectangle::new(10.0, 10.0)), 0.0, 0.0);
        let mut store = MemoryDurableStore::new();
        let batch = vec![DurableWrite::Set { id: shape.id, fields: shape_fields(&shape) }];
        store.commit(&batch).unwrap();

        let DurableEvent::Changes(changes) = store.changes_for(&batch) else {
            panic!("expected changes");
        };
        assert_eq!(changes.len(), 1);
        assert!(matches!(&changes[0], DurableChange::Added(record) if record.id() == shape.id));
    }

    #[test]
    fn test_failure_injection() {
        let mut channel = MemoryEphemeralChannel::new();
        channel.fail_with(TransportError::Unavailable("offline".into()));
        assert!(channel.publish(&LiveDragPayload::new()).is_err());
        assert_eq!(channel.publish_count(), 0);
    }
}
