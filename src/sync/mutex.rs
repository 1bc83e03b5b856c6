/*
 * Interruptible Mutex
 *
 * A spin lock whose blocking acquisition can be abandoned when the waiting
 * task has a signal pending, the equivalent of `mutex_lock_interruptible`.
 *
 * Behaviour:
 * - The fast path takes a free lock without looking at signals
 * - While contended, the waiter re-checks its signal state between attempts
 *   and returns `Interrupted` (holding nothing) as soon as one is pending
 * - Release is dropping the guard and cannot fail
 */

use super::signal::SignalState;
use spin::{Mutex, MutexGuard};

/// Lock wait abandoned because a signal is pending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

impl core::fmt::Display for Interrupted {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Interrupted while waiting for lock")
    }
}

/// Mutual exclusion with interruptible blocking acquisition
pub struct InterruptibleMutex<T> {
    inner: Mutex<T>,
}

impl<T> InterruptibleMutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Acquire the lock, giving up if `signals` becomes pending while blocked
    pub fn lock_interruptible(&self, signals: &SignalState) -> Result<MutexGuard<'_, T>, Interrupted> {
        loop {
            if let Some(guard) = self.inner.try_lock() {
                return Ok(guard);
            }
            if signals.is_pending() {
                return Err(Interrupted);
            }
            relax();
        }
    }

    /// Acquire the lock, ignoring signals (teardown paths)
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }

    /// Acquire the lock only if it is free right now
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.inner.try_lock()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

impl<T: Default> Default for InterruptibleMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Back off between lock attempts
#[inline]
fn relax() {
    // Under the host harness waiters are OS threads; let the holder run
    #[cfg(test)]
    std::thread::yield_now();
    #[cfg(not(test))]
    core::hint::spin_loop();
}
