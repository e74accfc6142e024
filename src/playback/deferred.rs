//! Deferred tasks with idempotent cancellation.
//!
//! A [`DeferredSlot`] holds at most one scheduled task. Scheduling replaces
//! (and thereby cancels) whatever was there; cancelling an empty slot is a
//! no-op. Tasks fire only through [`DeferredSlot::take_due`], so a cancelled
//! task can never run later.

use std::time::Instant;

/// A scheduled action. `token` distinguishes successive schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredTask {
    pub token: u64,
    pub due: Instant,
}

#[derive(Debug, Default)]
pub struct DeferredSlot {
    pending: Option<DeferredTask>,
    next_token: u64,
}

impl DeferredSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a task at `due`, replacing any pending one.
    pub fn schedule(&mut self, due: Instant) -> DeferredTask {
        if let Some(old) = self.pending.take() {
            log::debug!("Replacing deferred task {}", old.token);
        }

        self.next_token += 1;
        let task = DeferredTask {
            token: self.next_token,
            due,
        };
        self.pending = Some(task);
        task
    }

    /// Cancels the pending task, if any. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Removes and returns the pending task if it is due at `now`.
    pub fn take_due(&mut self, now: Instant) -> Option<DeferredTask> {
        match self.pending {
            Some(task) if task.due <= now => self.pending.take(),
            _ => None,
        }
    }

    pub fn pending(&self) -> Option<DeferredTask> {
        self.pending
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
