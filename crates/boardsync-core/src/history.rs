//! Bounded undo/redo history with a cursor.
//!
//! Entries are full snapshots taken *before* each mutation. `index` points
//! one past the newest pre-mutation snapshot while at the live tip; undo and
//! redo move it back and forth over the retained branch.

use crate::config::MIN_HISTORY_LIMIT;
use std::collections::VecDeque;

/// Snapshot history.
#[derive(Debug, Clone)]
pub struct History<T> {
    entries: VecDeque<T>,
    index: usize,
    limit: usize,
}

impl<T: Clone> History<T> {
    /// Create an empty history holding at most `limit` entries.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            index: 0,
            limit: limit.max(MIN_HISTORY_LIMIT),
        }
    }

    /// Record the state about to be mutated.
    ///
    /// Anything past the cursor (the undone branch) is discarded; the oldest
    /// entries are evicted once the limit is exceeded.
    pub fn push(&mut self, state: T) {
        self.entries.truncate(self.index);
        self.entries.push_back(state);
        self.evict();
        self.index = self.entries.len();
    }

    /// Step back one state. `current` is recorded first when undoing from the
    /// live tip so that redo can return to it.
    pub fn undo(&mut self, current: &T) -> Option<T> {
        if !self.can_undo() {
            return None;
        }
        if self.index == self.entries.len() {
            self.entries.push_back(current.clone());
            self.evict();
            self.index = self.entries.len() - 1;
        }
        self.index -= 1;
        self.entries.get(self.index).cloned()
    }

    /// Step forward one state along the retained branch.
    pub fn redo(&mut self) -> Option<T> {
        if !self.can_redo() {
            return None;
        }
        self.index += 1;
        self.entries.get(self.index).cloned()
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    fn evict(&mut self) {
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Apply `n` mutations to a counter, recording history before each one.
    fn run(history: &mut History<u32>, n: u32) -> u32 {
        let mut state = 0;
        for _ in 0..n {
            history.push(state);
            state += 1;
        }
        state
    }

    #[test]
    fn test_undo_then_redo_roundtrip() {
        let mut history = History::new(50);
        let mut state = run(&mut history, 5);

        for expected in (0..5).rev() {
            state = history.undo(&state).unwrap();
            assert_eq!(state, expected);
        }
        assert!(!history.can_undo());
        assert!(history.undo(&state).is_none());

        for expected in 1..=5 {
            state = history.redo().unwrap();
            assert_eq!(state, expected);
        }
        assert!(!history.can_redo());
    }

    #[test]
    fn test_mutation_after_undo_discards_branch() {
        let mut history = History::new(50);
        let state = run(&mut history, 3);

        let state = history.undo(&state).unwrap();
        assert_eq!(state, 2);
        assert!(history.can_redo());

        history.push(state);
        assert!(!history.can_redo());
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_history_is_capped() {
        let mut history = History::new(4);
        let mut state = run(&mut history, 10);
        assert_eq!(history.len(), 4);

        let mut undone = 0;
        while let Some(prev) = history.undo(&state) {
            state = prev;
            undone += 1;
            assert!(history.len() <= 4);
        }
        // Oldest states are gone for good
        assert_eq!(undone, 3);
        assert_eq!(state, 7);
    }

    #[test]
    fn test_limit_has_a_floor() {
        let mut history = History::new(0);
        assert_eq!(history.limit(), MIN_HISTORY_LIMIT);

        let state = run(&mut history, 3);
        assert_eq!(history.undo(&state), Some(2));
        assert_eq!(history.redo(), Some(3));
    }
}
