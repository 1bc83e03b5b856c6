/*
 * Device Abstraction Layer
 *
 * The operation table every open file provides to the syscall layer:
 * read, write, seek, stat and mmap, with minimal POSIX semantics.
 */

use super::uaccess::{IoBufferReader, IoBufferWriter};
use crate::shmem::{MapRequest, VmOperations};
use alloc::boxed::Box;

/// An open file (one session on a device)
///
/// The file exclusively owns its cursor; the device behind it may be shared
/// by many files.
pub trait File: Send {
    /// Read up to `buf.len()` bytes into `buf`
    ///
    /// Returns the number of bytes read (0 at end of data), or an error.
    fn read(&mut self, buf: &mut dyn IoBufferWriter) -> Result<usize, Errno>;

    /// Write `buf.len()` bytes from `buf`
    ///
    /// Returns the number of bytes accepted, or an error.
    fn write(&mut self, buf: &mut dyn IoBufferReader) -> Result<usize, Errno>;

    /// Get file metadata
    fn stat(&self) -> Result<Stat, Errno>;

    /// Seek to position (default: not seekable)
    fn seek(&mut self, _offset: i64, _whence: i32) -> Result<i64, Errno> {
        Err(Errno::ESPIPE)
    }

    /// Prepare a mapping of this file (default: not mappable)
    ///
    /// Returns the fault handler the address space installs for the area.
    fn mmap(&mut self, _request: &MapRequest) -> Result<Box<dyn VmOperations>, Errno> {
        Err(Errno::ENODEV)
    }
}

/// POSIX errno values
///
/// Subset of standard POSIX error codes for syscall compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
    EINTR = 4,   // Interrupted system call
    ENXIO = 6,   // No such device or address
    EBADF = 9,   // Bad file descriptor
    ENOMEM = 12, // Out of memory
    EFAULT = 14, // Bad address
    EBUSY = 16,  // Device or resource busy
    EEXIST = 17, // File exists
    ENODEV = 19, // No such device
    EINVAL = 22, // Invalid argument
    ESPIPE = 29, // Illegal seek
    ENOSYS = 38, // Function not implemented
}

impl Errno {
    /// Negative value returned from a syscall
    pub fn as_ret(self) -> isize {
        -(self as i32 as isize)
    }
}

/// Minimal stat structure
///
/// Subset of POSIX struct stat, focusing on st_mode for type checking.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    pub st_mode: u32,    // File type and mode
    pub st_size: u64,    // File size in bytes
    pub st_blksize: u64, // Block size for I/O
    pub st_blocks: u64,  // Number of 512B blocks allocated
}

impl Stat {
    /// Size of the C layout (u32 + padding + 3 * u64)
    pub const SIZE: usize = 32;

    /// Serialize in the C layout for copying to userspace
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.st_mode.to_ne_bytes());
        out[8..16].copy_from_slice(&self.st_size.to_ne_bytes());
        out[16..24].copy_from_slice(&self.st_blksize.to_ne_bytes());
        out[24..32].copy_from_slice(&self.st_blocks.to_ne_bytes());
        out
    }
}

// File type constants (POSIX)
pub const S_IFMT: u32 = 0o170000; // File type mask
pub const S_IFCHR: u32 = 0o020000; // Character device

// Seek whence constants (POSIX)
pub const SEEK_SET: i32 = 0; // Seek from beginning
pub const SEEK_CUR: i32 = 1; // Seek from current position
pub const SEEK_END: i32 = 2; // Seek from end

/// Check if mode indicates a character device
#[inline]
#[allow(non_snake_case)]
pub fn S_ISCHR(mode: u32) -> bool {
    (mode & S_IFMT) == S_IFCHR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_return_values_are_negative() {
        assert_eq!(Errno::EINTR.as_ret(), -4);
        assert_eq!(Errno::EFAULT.as_ret(), -14);
        assert_eq!(Errno::ENODEV.as_ret(), -19);
    }

    #[test]
    fn stat_serializes_in_c_layout() {
        let stat = Stat {
            st_mode: S_IFCHR | 0o666,
            st_size: 5,
            st_blksize: 4096,
            st_blocks: 8,
        };
        let bytes = stat.to_bytes();
        assert_eq!(u32::from_ne_bytes(bytes[0..4].try_into().unwrap()), S_IFCHR | 0o666);
        assert_eq!(u64::from_ne_bytes(bytes[8..16].try_into().unwrap()), 5);
        assert!(S_ISCHR(stat.st_mode));
    }
}
