//! Replication between the object store and the two remote channels.
//!
//! The durable store keeps one record per shape and is the long-term source
//! of truth. The ephemeral channel carries live drag positions only. Both are
//! reached exclusively through [`SyncBridge`].

mod bridge;
mod memory;

pub use bridge::SyncBridge;
pub use memory::{MemoryDurableStore, MemoryEphemeralChannel};

use crate::live::LiveDragPayload;
use crate::shapes::{Shape, ShapeId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Failures reported by a remote channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("channel unavailable: {0}")]
    Unavailable(String),
}

/// Sync errors.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// A shape as stored durably, with replication metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurableRecord {
    #[serde(flatten)]
    pub shape: Shape,
    /// Writer's clock in milliseconds.
    #[serde(default)]
    pub updated_at: u64,
    #[serde(default)]
    pub updated_by: String,
}

impl DurableRecord {
    pub fn new(shape: Shape, updated_at: u64, updated_by: impl Into<String>) -> Self {
        Self {
            shape,
            updated_at,
            updated_by: updated_by.into(),
        }
    }

    pub fn id(&self) -> ShapeId {
        self.shape.id
    }

    /// Parse a stored field map.
    pub fn from_fields(fields: Map<String, Value>) -> SyncResult<Self> {
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}

/// One write in a durable batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum DurableWrite {
    /// Create or overwrite a whole record.
    Set { id: ShapeId, fields: Map<String, Value> },
    /// Merge fields into an existing record; a null value removes the field.
    Update { id: ShapeId, fields: Map<String, Value> },
    Delete { id: ShapeId },
}

impl DurableWrite {
    pub fn id(&self) -> ShapeId {
        match self {
            DurableWrite::Set { id, .. } | DurableWrite::Update { id, .. } | DurableWrite::Delete { id } => *id,
        }
    }
}

/// One incremental change observed on the durable store.
#[derive(Debug, Clone, PartialEq)]
pub enum DurableChange {
    Added(DurableRecord),
    Modified(DurableRecord),
    Removed(ShapeId),
}

impl DurableChange {
    pub fn id(&self) -> ShapeId {
        match self {
            DurableChange::Added(record) | DurableChange::Modified(record) => record.id(),
            DurableChange::Removed(id) => *id,
        }
    }
}

/// What a durable subscription delivers.
#[derive(Debug, Clone, PartialEq)]
pub enum DurableEvent {
    /// Full contents, delivered once on connection.
    Snapshot(Vec<DurableRecord>),
    /// One remote batch of changes, in delivery order.
    Changes(Vec<DurableChange>),
}

/// Write side of the durable store.
pub trait DurableStore {
    /// Commit one batch atomically. Batches never exceed the configured
    /// write ceiling.
    fn commit(&mut self, writes: &[DurableWrite]) -> Result<(), TransportError>;

    /// Stop the subscription. Must tolerate repeated calls.
    fn close(&mut self) {}
}

/// Write side of the ephemeral channel.
pub trait EphemeralChannel {
    /// Merge entries into this client's published positions.
    fn publish(&mut self, payload: &LiveDragPayload) -> Result<(), TransportError>;

    /// Withdraw published positions.
    fn retract(&mut self, ids: &[ShapeId]) -> Result<(), TransportError>;

    /// Stop the subscription. Must tolerate repeated calls.
    fn close(&mut self) {}
}
