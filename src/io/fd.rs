/*
 * File Descriptor Table
 *
 * Per-process file descriptor table for managing open files.
 * Each entry maps an integer FD to the File it owns.
 *
 * FDs 0-2 are left to stdin/stdout/stderr; opened files start at 3.
 */

use super::device::{Errno, File};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;

/// Per-process file descriptor table
///
/// Each open file is owned by exactly one descriptor; closing the
/// descriptor drops the file and ends its session.
pub struct FileDescriptorTable {
    fds: BTreeMap<i32, Box<dyn File>>,
    next_fd: i32,
}

impl FileDescriptorTable {
    /// Create a new empty file descriptor table
    pub fn new() -> Self {
        Self {
            fds: BTreeMap::new(),
            next_fd: 3, // 0, 1, 2 reserved for stdin/stdout/stderr
        }
    }

    /// Get the file behind a descriptor, or EBADF
    pub fn get_mut(&mut self, fd: i32) -> Result<&mut (dyn File + 'static), Errno> {
        self.fds.get_mut(&fd).map(|f| f.as_mut()).ok_or(Errno::EBADF)
    }

    /// Allocate new file descriptor (auto-assign)
    ///
    /// Returns the lowest free FD >= 3.
    pub fn alloc(&mut self, file: Box<dyn File>) -> i32 {
        let mut fd = self.next_fd;
        while self.fds.contains_key(&fd) {
            fd += 1;
        }
        self.fds.insert(fd, file);
        fd
    }

    /// Close a file descriptor
    ///
    /// Removes the FD from the table. Returns EBADF if FD doesn't exist.
    pub fn close(&mut self, fd: i32) -> Result<(), Errno> {
        self.fds.remove(&fd).ok_or(Errno::EBADF)?;
        Ok(())
    }

    /// Close every descriptor (process exit)
    pub fn close_all(&mut self) {
        self.fds.clear();
    }

    /// Get number of open file descriptors
    pub fn count(&self) -> usize {
        self.fds.len()
    }

    /// Check if a file descriptor is valid
    pub fn is_valid(&self, fd: i32) -> bool {
        self.fds.contains_key(&fd)
    }
}

impl Default for FileDescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::device::Stat;
    use crate::io::uaccess::{IoBufferReader, IoBufferWriter};

    struct NullFile;

    impl File for NullFile {
        fn read(&mut self, _buf: &mut dyn IoBufferWriter) -> Result<usize, Errno> {
            Ok(0)
        }

        fn write(&mut self, buf: &mut dyn IoBufferReader) -> Result<usize, Errno> {
            Ok(buf.len())
        }

        fn stat(&self) -> Result<Stat, Errno> {
            Ok(Stat::default())
        }
    }

    #[test]
    fn alloc_reuses_lowest_closed_descriptor() {
        let mut table = FileDescriptorTable::new();
        let a = table.alloc(Box::new(NullFile));
        let b = table.alloc(Box::new(NullFile));
        assert_eq!((a, b), (3, 4));

        table.close(a).unwrap();
        assert!(!table.is_valid(a));
        assert_eq!(table.alloc(Box::new(NullFile)), 3);
        assert_eq!(table.count(), 2);
    }

    #[test]
    fn unknown_descriptor_is_ebadf() {
        let mut table = FileDescriptorTable::new();
        assert_eq!(table.close(7), Err(Errno::EBADF));
        assert!(matches!(table.get_mut(7), Err(Errno::EBADF)));
        assert_eq!(table.get_mut(7).err(), Some(Errno::EBADF));
    }
}
