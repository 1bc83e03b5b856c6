/*
 * Synchronization Primitives
 *
 * Locks and per-task signal state used by device code that may block on
 * behalf of a caller.
 */

pub mod mutex;
pub mod signal;

pub use mutex::{InterruptibleMutex, Interrupted};
pub use signal::SignalState;
