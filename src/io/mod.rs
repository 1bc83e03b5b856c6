/*
 * Input/Output System
 *
 * The file abstraction the syscall layer talks to: the per-file operation
 * table, user memory access for read/write buffers, and the per-process
 * file descriptor table.
 */

pub mod device;
pub mod fd;
pub mod uaccess;

pub use device::{Errno, File, Stat, S_IFCHR, S_IFMT};
pub use fd::FileDescriptorTable;
pub use uaccess::{IoBufferReader, IoBufferWriter, TransferFault, UserSlice};
