//! Advisory locks on shapes under a local gesture.
//!
//! A lock does not block anything by itself. The sync bridge consults the
//! registry and defers inbound remote changes for locked ids until the last
//! guard on them is gone.

use crate::shapes::ShapeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Shared table of locked shape ids with per-id hold counts.
#[derive(Debug, Clone, Default)]
pub struct LockRegistry {
    held: Rc<RefCell<HashMap<ShapeId, usize>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `ids` until the returned guard is released or dropped.
    pub fn acquire(&self, ids: &[ShapeId]) -> LockGuard {
        let mut held = self.held.borrow_mut();
        for id in ids {
            *held.entry(*id).or_insert(0) += 1;
        }
        log::debug!("Locked {} shape(s)", ids.len());
        LockGuard {
            registry: self.clone(),
            ids: ids.to_vec(),
            released: false,
        }
    }

    pub fn is_locked(&self, id: ShapeId) -> bool {
        self.held.borrow().contains_key(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.held.borrow().is_empty()
    }

    fn release(&self, ids: &[ShapeId]) {
        let mut held = self.held.borrow_mut();
        for id in ids {
            if let Some(count) = held.get_mut(id) {
                *count -= 1;
                if *count == 0 {
                    held.remove(id);
                }
            }
        }
    }
}

/// Scoped hold on a set of locks.
#[derive(Debug)]
pub struct LockGuard {
    registry: LockRegistry,
    ids: Vec<ShapeId>,
    released: bool,
}

impl LockGuard {
    pub fn ids(&self) -> &[ShapeId] {
        &self.ids
    }

    /// Release now instead of at drop. Safe to call twice.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.registry.release(&self.ids);
        log::debug!("Released {} shape lock(s)", self.ids.len());
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}
