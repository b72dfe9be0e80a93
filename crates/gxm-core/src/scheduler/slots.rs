//! Worker slots shared by the dispatcher and running jobs.
//!
//! The maximum can change at runtime. Lowering it never revokes slots that
//! are already held; running jobs drain and no new job starts until
//! `in_use < max` again.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::config::clamp_parallel;

#[derive(Debug)]
pub struct WorkerSlots {
    max: AtomicUsize,
    in_use: AtomicUsize,
}

impl WorkerSlots {
    pub fn new(max: usize) -> Self {
        Self {
            max: AtomicUsize::new(clamp_parallel(max)),
            in_use: AtomicUsize::new(0),
        }
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::Acquire)
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Free slots right now. 0 while over capacity after a decrease.
    pub fn available(&self) -> usize {
        self.max().saturating_sub(self.in_use())
    }

    /// Change the maximum (clamped); returns the effective value.
    pub fn set_max(&self, max: usize) -> usize {
        let max = clamp_parallel(max);
        self.max.store(max, Ordering::Release);
        max
    }

    /// Take one slot if `in_use < max`.
    pub fn try_acquire(&self) -> bool {
        let mut current = self.in_use.load(Ordering::Acquire);
        loop {
            if current >= self.max() {
                return false;
            }
            match self.in_use.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Give back one slot taken with `try_acquire`.
    pub fn release(&self) {
        let _ = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)));
    }
}

/// A held slot. Dropping it frees the slot and wakes the dispatcher, including
/// when the job task unwinds.
pub(super) struct SlotGuard {
    slots: Arc<WorkerSlots>,
    wake: Arc<Notify>,
}

impl SlotGuard {
    /// Wrap a slot already taken with `try_acquire`.
    pub(super) fn new(slots: Arc<WorkerSlots>, wake: Arc<Notify>) -> Self {
        Self { slots, wake }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slots.release();
        self.wake.notify_one();
    }
}
