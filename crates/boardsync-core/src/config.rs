//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Maximum number of undo states to keep.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Smallest usable history: one undoable state plus the live tip.
pub const MIN_HISTORY_LIMIT: usize = 2;

/// Offset applied to duplicated and pasted shapes, on both axes.
pub const DEFAULT_PASTE_OFFSET: f64 = 20.0;

/// Ephemeral entries older than this are ignored by readers.
pub const DEFAULT_STALE_AFTER_MS: u64 = 3000;

/// Throttle window for live-drag broadcasts.
pub const DEFAULT_BROADCAST_INTERVAL_MS: u64 = 50;

/// Throttle window for redraw requests (roughly one frame).
pub const DEFAULT_REDRAW_INTERVAL_MS: u64 = 16;

/// Per-request write ceiling of the durable store.
pub const DEFAULT_MAX_BATCH_WRITES: usize = 500;

/// Perpendicular distance between connectors that share an endpoint pair.
pub const DEFAULT_FANOUT_SPACING: f64 = 24.0;

/// Tunables for the store, the drag coordinator and the sync bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    pub history_limit: usize,
    pub paste_offset: f64,
    pub stale_after_ms: u64,
    pub broadcast_interval_ms: u64,
    pub redraw_interval_ms: u64,
    pub max_batch_writes: usize,
    pub fanout_spacing: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            paste_offset: DEFAULT_PASTE_OFFSET,
            stale_after_ms: DEFAULT_STALE_AFTER_MS,
            broadcast_interval_ms: DEFAULT_BROADCAST_INTERVAL_MS,
            redraw_interval_ms: DEFAULT_REDRAW_INTERVAL_MS,
            max_batch_writes: DEFAULT_MAX_BATCH_WRITES,
            fanout_spacing: DEFAULT_FANOUT_SPACING,
        }
    }
}

impl SyncConfig {
    /// Parse a configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// History limit with the floor applied.
    pub fn effective_history_limit(&self) -> usize {
        self.history_limit.max(MIN_HISTORY_LIMIT)
    }

    /// Batch ceiling with the floor applied.
    pub fn effective_max_batch_writes(&self) -> usize {
        self.max_batch_writes.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SyncConfig::from_json(r#"{ "historyLimit": 10 }"#).unwrap();
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.stale_after_ms, DEFAULT_STALE_AFTER_MS);
        assert_eq!(config.max_batch_writes, DEFAULT_MAX_BATCH_WRITES);
    }

    #[test]
    fn test_floors() {
        let config = SyncConfig {
            history_limit: 0,
            max_batch_writes: 0,
            ..SyncConfig::default()
        };
        assert_eq!(config.effective_history_limit(), MIN_HISTORY_LIMIT);
        assert_eq!(config.effective_max_batch_writes(), 1);
    }
}
