/*
 * CLUU scull Shared-Page Device
 *
 * A character device whose instances each hold one page of memory that is
 * shared by every task opening them. Tasks read a bounded range of the
 * page, replace it wholesale by writing, or map it into their address
 * space for zero-copy access.
 *
 * The crate carries the kernel plumbing the device needs around it:
 * - Physical frame pool, reference-counted pages, page tables and
 *   per-process address spaces with demand faulting (memory, shmem)
 * - Interruptible locking and per-task signal state (sync)
 * - Files, user memory access and fd tables (io), processes (process)
 * - Device number registry and the scull driver itself (devices)
 * - Driver parameters (config), syscall entry points (syscall)
 * - A buffered `log` backend (utils::logger)
 *
 * Built as `no_std` + `alloc` so it links into the kernel; the test
 * harness builds it against std to run multi-threaded scenarios.
 */

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod devices;
pub mod io;
pub mod memory;
pub mod process;
pub mod shmem;
pub mod sync;
pub mod syscall;
pub mod utils;

#[cfg(test)]
mod tests;

pub use config::ScullConfig;
pub use devices::scull::{ScullDevices, ScullError, ScullFile, ScullMapping};
pub use devices::{CharDeviceRegistry, DevNo};
pub use memory::{PAGE_SIZE, PhysicalMemory};
