/*
 * Pending Signal State
 *
 * Per-task flag telling blocking kernel paths that the task has a signal
 * pending and should abandon the wait. Shared between a process and every
 * file it opens, so another thread (or an interrupt) can raise it while the
 * task is blocked on a device lock.
 */

use core::sync::atomic::{AtomicBool, Ordering};

/// Signal state of one task
#[derive(Debug, Default)]
pub struct SignalState {
    pending: AtomicBool,
}

impl SignalState {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    /// Mark a signal as pending; interruptible waits return early
    pub fn raise(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Clear the pending signal (after it has been delivered)
    pub fn clear(&self) {
        self.pending.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}
