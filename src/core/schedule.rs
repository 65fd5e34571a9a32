//! Deferred actions for the controller
//!
//! The map has two places where work is intentionally postponed: the resize
//! after load (and after window resizes) and the popup dismissal debounce.
//! Each action remembers the map generation it was scheduled under so that it
//! can be dropped once that map is gone.
//!
//! Scheduling an action replaces a pending copy of the same action, and drops
//! whatever an older generation left behind, so the queue holds at most one
//! resize plus one dismissal per marker.

use std::time::Duration;

use tokio::time::Instant;

use crate::core::engine::MarkerHandle;

/// What to do when a deferred action comes due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredAction {
    Resize,
    DismissPopup(MarkerHandle),
}

/// An action waiting for its deadline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deferred {
    pub due: Instant,
    pub generation: u64,
    pub action: DeferredAction,
}

/// Pending actions kept in deadline order
#[derive(Debug, Default)]
pub struct DeferredQueue {
    // Sorted by `due`; equal deadlines keep scheduling order
    pending: Vec<Deferred>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `action` to run `delay` after `now`
    pub fn schedule(&mut self, now: Instant, delay: Duration, generation: u64, action: DeferredAction) {
        self.pending
            .retain(|d| d.generation == generation && d.action != action);

        let due = now + delay;
        let index = self.pending.partition_point(|d| d.due <= due);
        self.pending.insert(
            index,
            Deferred {
                due,
                generation,
                action,
            },
        );
    }

    /// Remove and return every action due at or before `now`, earliest first
    pub fn take_due(&mut self, now: Instant) -> Vec<Deferred> {
        let split = self.pending.partition_point(|d| d.due <= now);
        self.pending.drain(..split).collect()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.pending.first().map(|d| d.due)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
