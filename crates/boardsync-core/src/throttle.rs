//! Timers and leading+trailing rate limiting.
//!
//! The engine never sleeps or spawns. It asks a [`Scheduler`] for a timer and
//! expects the embedder to hand the [`TimerId`] back when it is due. Tests
//! drive time with [`ManualScheduler`].

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Handle for a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Clock plus one-shot timers.
pub trait Scheduler {
    /// Current time in milliseconds.
    fn now_ms(&self) -> u64;
    /// Arrange for the returned timer to fire after `delay_ms`.
    fn schedule(&self, delay_ms: u64) -> TimerId;
    /// Cancel a timer. Cancelling an unknown or fired timer does nothing.
    fn cancel(&self, id: TimerId);
}

/// Deterministic scheduler with a manually advanced clock.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: Cell<u64>,
    next_id: Cell<u64>,
    pending: RefCell<BTreeMap<TimerId, u64>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the clock at `now_ms`.
    pub fn starting_at(now_ms: u64) -> Self {
        let scheduler = Self::default();
        scheduler.now.set(now_ms);
        scheduler
    }

    /// Move the clock forward and return the timers that came due, earliest
    /// first. Returned timers are no longer pending.
    pub fn advance(&self, ms: u64) -> Vec<TimerId> {
        let now = self.now.get().saturating_add(ms);
        self.now.set(now);

        let mut pending = self.pending.borrow_mut();
        let mut due: Vec<(u64, TimerId)> = pending
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, at)| (*at, *id))
            .collect();
        due.sort();
        for (_, id) in &due {
            pending.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.pending.borrow().contains_key(&id)
    }
}

impl Scheduler for ManualScheduler {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn schedule(&self, delay_ms: u64) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.pending
            .borrow_mut()
            .insert(id, self.now.get().saturating_add(delay_ms));
        id
    }

    fn cancel(&self, id: TimerId) {
        self.pending.borrow_mut().remove(&id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThrottleState {
    Idle,
    Pending(TimerId),
}

/// Leading+trailing throttle.
///
/// The first request in a window fires immediately. Requests inside the
/// window arm a single trailing timer; when it fires the caller runs the
/// action once more with the latest state, so the final state is never lost.
pub struct Throttle {
    scheduler: Rc<dyn Scheduler>,
    window_ms: u64,
    last_fired: Option<u64>,
    state: ThrottleState,
}

impl Throttle {
    pub fn new(scheduler: Rc<dyn Scheduler>, window_ms: u64) -> Self {
        Self {
            scheduler,
            window_ms,
            last_fired: None,
            state: ThrottleState::Idle,
        }
    }

    /// Ask to run the action. Returns true if it should run now; false if it
    /// was deferred to the trailing edge.
    pub fn request(&mut self) -> bool {
        if self.is_pending() {
            return false;
        }
        let now = self.scheduler.now_ms();
        let elapsed = self.last_fired.map(|at| now.saturating_sub(at));
        match elapsed {
            Some(elapsed) if elapsed < self.window_ms => {
                let id = self.scheduler.schedule(self.window_ms - elapsed);
                self.state = ThrottleState::Pending(id);
                false
            }
            _ => {
                self.last_fired = Some(now);
                true
            }
        }
    }

    /// Route a due timer. Returns true if it was this throttle's trailing
    /// edge and the action should run now.
    pub fn on_timer(&mut self, id: TimerId) -> bool {
        if !self.owns(id) {
            return false;
        }
        self.state = ThrottleState::Idle;
        self.last_fired = Some(self.scheduler.now_ms());
        true
    }

    pub fn owns(&self, id: TimerId) -> bool {
        self.state == ThrottleState::Pending(id)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, ThrottleState::Pending(_))
    }

    /// Drop any pending trailing edge. Safe to call repeatedly.
    pub fn cancel(&mut self) {
        if let ThrottleState::Pending(id) = self.state {
            self.scheduler.cancel(id);
            self.state = ThrottleState::Idle;
        }
    }

    /// Cancel and forget the last firing time.
    pub fn reset(&mut self) {
        self.cancel();
        self.last_fired = None;
    }
}

impl Drop for Throttle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(window: u64) -> (Rc<ManualScheduler>, Throttle) {
        let scheduler = Rc::new(ManualScheduler::starting_at(1_000));
        let throttle = Throttle::new(scheduler.clone(), window);
        (scheduler, throttle)
    }

    #[test]
    fn test_leading_edge_fires_immediately() {
        let (scheduler, mut throttle) = setup(50);
        assert!(throttle.request());
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_calls_in_window_coalesce_to_one_trailing_edge() {
        let (scheduler, mut throttle) = setup(50);
        assert!(throttle.request());
        scheduler.advance(10);
        assert!(!throttle.request());
        assert!(!throttle.request());
        assert_eq!(scheduler.pending_count(), 1);

        assert!(scheduler.advance(39).is_empty());
        let due = scheduler.advance(1);
        assert_eq!(due.len(), 1);
        assert!(throttle.on_timer(due[0]));
        assert!(!throttle.is_pending());

        // Window restarts from the trailing edge
        assert!(!throttle.request());
    }

    #[test]
    fn test_call_after_window_fires_again() {
        let (scheduler, mut throttle) = setup(50);
        assert!(throttle.request());
        scheduler.advance(50);
        assert!(throttle.request());
    }

    #[test]
    fn test_cancel_is_idempotent_and_clears_timer() {
        let (scheduler, mut throttle) = setup(50);
        throttle.request();
        throttle.request();
        assert_eq!(scheduler.pending_count(), 1);

        throttle.cancel();
        throttle.cancel();
        assert_eq!(scheduler.pending_count(), 0);
        assert!(scheduler.advance(100).is_empty());
    }

    #[test]
    fn test_drop_cancels_pending_timer() {
        let (scheduler, mut throttle) = setup(50);
        throttle.request();
        throttle.request();
        drop(throttle);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_foreign_timer_is_ignored() {
        let (scheduler, mut throttle) = setup(50);
        let other = scheduler.schedule(5);
        throttle.request();
        throttle.request();
        assert!(!throttle.on_timer(other));
        assert!(throttle.is_pending());
    }
}
