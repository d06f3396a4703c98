//! Ephemeral live-drag payloads and the reader-side filter.
//!
//! Remote drags arrive as a map from shape id to the latest position that
//! author broadcast. Positions are only ever shown as overlays; they never
//! enter the object store.

use crate::shapes::ShapeId;
use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One broadcast position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveDragEntry {
    pub x: f64,
    pub y: f64,
    pub author_id: String,
    /// Milliseconds on the author's clock.
    pub timestamp: u64,
}

impl LiveDragEntry {
    pub fn new(position: Point, author_id: impl Into<String>, timestamp: u64) -> Self {
        Self {
            x: position.x,
            y: position.y,
            author_id: author_id.into(),
            timestamp,
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Older than `stale_after_ms` at `now_ms`. Future timestamps are fresh.
    pub fn is_stale(&self, now_ms: u64, stale_after_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp) > stale_after_ms
    }
}

/// Channel record: shape id to its latest broadcast position.
pub type LiveDragPayload = BTreeMap<ShapeId, LiveDragEntry>;

/// Result of filtering one payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredDrags {
    /// Entries that are foreign, fresh and strictly newer than before.
    pub accepted: BTreeMap<ShapeId, LiveDragEntry>,
    /// Updated per-id high-water marks, pruned to ids present in the payload.
    pub last_seen: HashMap<ShapeId, u64>,
}

/// Reduce a raw payload to the entries worth rendering.
///
/// Rejects entries written by `local_author`, entries older than the
/// staleness window, and entries whose timestamp does not strictly exceed
/// the last one accepted for that id. Ids missing from `payload` are
/// forgotten.
pub fn filter_live_drags(
    payload: &LiveDragPayload,
    local_author: &str,
    now_ms: u64,
    stale_after_ms: u64,
    last_seen: &HashMap<ShapeId, u64>,
) -> FilteredDrags {
    let mut result = FilteredDrags::default();

    for (&id, entry) in payload {
        let previous = last_seen.get(&id).copied();
        if let Some(ts) = previous {
            result.last_seen.insert(id, ts);
        }

        if entry.author_id == local_author {
            continue;
        }
        if entry.is_stale(now_ms, stale_after_ms) {
            log::debug!("Dropping stale drag for {} ({} ms old)", id, now_ms.saturating_sub(entry.timestamp));
            continue;
        }
        if previous.is_some_and(|ts| entry.timestamp <= ts) {
            continue;
        }

        result.last_seen.insert(id, entry.timestamp);
        result.accepted.insert(id, entry.clone());
    }

    result
}

/// Remote drag positions currently shown on top of the board.
#[derive(Debug, Clone)]
pub struct LiveDragOverlay {
    local_author: String,
    stale_after_ms: u64,
    last_seen: HashMap<ShapeId, u64>,
    entries: HashMap<ShapeId, LiveDragEntry>,
}

impl LiveDragOverlay {
    pub fn new(local_author: impl Into<String>, stale_after_ms: u64) -> Self {
        Self {
            local_author: local_author.into(),
            stale_after_ms,
            last_seen: HashMap::new(),
            entries: HashMap::new(),
        }
    }

    /// Fold a newly received payload into the overlay.
    /// Returns the number of positions that changed.
    pub fn apply(&mut self, payload: &LiveDragPayload, now_ms: u64) -> usize {
        let filtered = filter_live_drags(
            payload,
            &self.local_author,
            now_ms,
            self.stale_after_ms,
            &self.last_seen,
        );
        self.last_seen = filtered.last_seen;

        let stale_after_ms = self.stale_after_ms;
        self.entries.retain(|id, shown| {
            payload.contains_key(id) && !shown.is_stale(now_ms, stale_after_ms)
        });

        let changed = filtered.accepted.len();
        self.entries.extend(filtered.accepted);
        changed
    }

    /// Drop overlays that went stale without a new payload.
    pub fn expire(&mut self, now_ms: u64) {
        let stale_after_ms = self.stale_after_ms;
        self.entries
            .retain(|_, shown| !shown.is_stale(now_ms, stale_after_ms));
    }

    pub fn position(&self, id: ShapeId) -> Option<Point> {
        self.entries.get(&id).map(LiveDragEntry::position)
    }

    pub fn positions(&self) -> impl Iterator<Item = (ShapeId, Point)> + '_ {
        self.entries.iter().map(|(id, e)| (*id, e.position()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_STALE_AFTER_MS;
    use uuid::Uuid;

    fn entry(author: &str, timestamp: u64) -> LiveDragEntry {
        LiveDragEntry::new(Point::new(1.0, 2.0), author, timestamp)
    }

    #[test]
    fn test_rejects_own_entries() {
        let id = Uuid::new_v4();
        let payload = LiveDragPayload::from([(id, entry("me", 10_000))]);
        let out = filter_live_drags(&payload, "me", 10_000, DEFAULT_STALE_AFTER_MS, &HashMap::new());
        assert!(out.accepted.is_empty());
    }

    #[test]
    fn test_rejects_stale_entries() {
        let id = Uuid::new_v4();
        let payload = LiveDragPayload::from([(id, entry("them", 10_000))]);

        let fresh = filter_live_drags(&payload, "me", 13_000, DEFAULT_STALE_AFTER_MS, &HashMap::new());
        assert_eq!(fresh.accepted.len(), 1);

        let stale = filter_live_drags(&payload, "me", 13_001, DEFAULT_STALE_AFTER_MS, &HashMap::new());
        assert!(stale.accepted.is_empty());
    }

    #[test]
    fn test_requires_strictly_newer_timestamp() {
        let id = Uuid::new_v4();
        let seen = HashMap::from([(id, 500)]);

        let same = LiveDragPayload::from([(id, entry("them", 500))]);
        assert!(filter_live_drags(&same, "me", 600, DEFAULT_STALE_AFTER_MS, &seen).accepted.is_empty());

        let newer = LiveDragPayload::from([(id, entry("them", 501))]);
        let out = filter_live_drags(&newer, "me", 600, DEFAULT_STALE_AFTER_MS, &seen);
        assert_eq!(out.accepted.len(), 1);
        assert_eq!(out.last_seen[&id], 501);
    }

    #[test]
    fn test_forgets_absent_ids() {
        let gone = Uuid::new_v4();
        let kept = Uuid::new_v4();
        let seen = HashMap::from([(gone, 900), (kept, 900)]);
        let payload = LiveDragPayload::from([(kept, entry("them", 800))]);

        let out = filter_live_drags(&payload, "me", 1000, DEFAULT_STALE_AFTER_MS, &seen);
        assert!(out.accepted.is_empty());
        assert!(!out.last_seen.contains_key(&gone));
        assert_eq!(out.last_seen[&kept], 900);

        // A returning id starts over
        let back = LiveDragPayload::from([(gone, entry("them", 100))]);
        let out = filter_live_drags(&back, "me", 1000, DEFAULT_STALE_AFTER_MS, &out.last_seen);
        assert_eq!(out.accepted.len(), 1);
    }

    #[test]
    fn test_overlay_tracks_and_expires() {
        let id = Uuid::new_v4();
        let mut overlay = LiveDragOverlay::new("me", DEFAULT_STALE_AFTER_MS);

        let payload = LiveDragPayload::from([(id, entry("them", 1000))]);
        assert_eq!(overlay.apply(&payload, 1000), 1);
        assert_eq!(overlay.position(id), Some(Point::new(1.0, 2.0)));

        // Replayed payload changes nothing
        assert_eq!(overlay.apply(&payload, 1100), 0);
        assert_eq!(overlay.len(), 1);

        overlay.expire(5000);
        assert!(overlay.is_empty());
    }

    #[test]
    fn test_overlay_drops_retracted_ids() {
        let id = Uuid::new_v4();
        let mut overlay = LiveDragOverlay::new("me", DEFAULT_STALE_AFTER_MS);
        overlay.apply(&LiveDragPayload::from([(id, entry("them", 1000))]), 1000);

        overlay.apply(&LiveDragPayload::new(), 1010);
        assert!(overlay.position(id).is_none());
    }
}
