/*
 * Scull Sessions
 *
 * One open of a scull instance: the shared instance plus a private cursor.
 */

use super::{ScullDev, ScullError};
use crate::io::device::{File, S_IFCHR, SEEK_CUR, SEEK_END, SEEK_SET, Stat};
use crate::io::uaccess::{IoBufferReader, IoBufferWriter};
use crate::io::Errno;
use crate::memory::{PAGE_SIZE, PageRef};
use crate::shmem::{MapRequest, VmOperations};
use crate::sync::SignalState;
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

/// An open scull instance
pub struct ScullFile {
    pub(super) dev: Arc<ScullDev>,
    offset: usize,
    pub(super) signals: Arc<SignalState>,
}

impl ScullFile {
    pub(super) fn new(dev: Arc<ScullDev>, signals: Arc<SignalState>) -> Self {
        Self {
            dev,
            offset: 0,
            signals,
        }
    }

    pub fn device(&self) -> &Arc<ScullDev> {
        &self.dev
    }

    /// Current cursor position
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Copy up to `buf.len()` bytes from the cursor into `buf`
    ///
    /// Returns 0 at or past the end of the valid data. On a failed copy the
    /// cursor does not move.
    pub fn read<W: IoBufferWriter + ?Sized>(&mut self, buf: &mut W) -> Result<usize, ScullError> {
        if buf.is_empty() {
            return Ok(0);
        }

        let buffer = self.dev.acquire(&self.signals)?;
        let page = match &buffer.page {
            Some(page) if self.offset < buffer.size => page,
            _ => return Ok(0),
        };

        let count = buf.len().min(buffer.size - self.offset);
        let mut bounce = [0u8; PAGE_SIZE];
        page.read(self.offset, &mut bounce[..count]);
        buf.write_slice(&bounce[..count])?;

        self.offset += count;
        Ok(count)
    }

    /// Read up to `len` bytes into a new vector
    pub fn read_to_vec(&mut self, len: usize) -> Result<Vec<u8>, ScullError> {
        let mut data = vec![0u8; len.min(PAGE_SIZE)];
        let count = self.read(&mut data.as_mut_slice())?;
        data.truncate(count);
        Ok(data)
    }

    /// Replace the instance content with `buf`
    ///
    /// The data is copied in from the caller first and then goes to a fresh
    /// page, published only once complete; on any error the previous content
    /// stays current. When the pool is empty, an old page that no mapping
    /// holds is rewritten in place instead. The cursor ends up at the new size.
    pub fn write<R: IoBufferReader + ?Sized>(&mut self, buf: &mut R) -> Result<usize, ScullError> {
        let len = buf.len();
        if len > PAGE_SIZE {
            return Err(ScullError::InvalidLength);
        }

        let mut buffer = self.dev.acquire(&self.signals)?;

        let mut bounce = [0u8; PAGE_SIZE];
        buf.read_slice(&mut bounce[..len])?;

        let page = match PageRef::alloc(self.dev.memory()) {
            Some(page) => page,
            // Pool exhausted: an old page nobody else holds can be rewritten in place
            None => match buffer.page.take_if(|old| old.ref_count() == 1) {
                Some(old) => {
                    log::debug!("scull{}: pool empty, reusing {}", self.dev.index(), old.frame());
                    old
                }
                None => {
                    log::warn!("scull{}: no page for a {} byte write", self.dev.index(), len);
                    return Err(ScullError::OutOfMemory);
                }
            },
        };
        // The tail of the bounce buffer is zero, clearing stale bytes of a reused page
        page.write(0, &bounce);

        if let Some(old) = buffer.page.replace(page) {
            if old.is_pinned() {
                log::debug!(
                    "scull{}: {} still mapped {} time(s), reclaim deferred",
                    self.dev.index(),
                    old.frame(),
                    old.map_count()
                );
            }
        }
        buffer.size = len;
        self.offset = len;

        log::debug!("scull{}: wrote {} bytes", self.dev.index(), len);
        Ok(len)
    }

    /// Write a kernel buffer
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<usize, ScullError> {
        let mut src = data;
        self.write(&mut src)
    }

    /// Move the cursor; SEEK_END is relative to the valid length
    pub fn seek(&mut self, offset: i64, whence: i32) -> Result<usize, ScullError> {
        let base = match whence {
            SEEK_SET => 0,
            SEEK_CUR => self.offset as i64,
            SEEK_END => self.dev.acquire(&self.signals)?.size as i64,
            _ => return Err(ScullError::InvalidSeek),
        };

        let target = base.checked_add(offset).ok_or(ScullError::InvalidSeek)?;
        self.offset = usize::try_from(target).map_err(|_| ScullError::InvalidSeek)?;
        Ok(self.offset)
    }

    /// Character device metadata; `st_size` is the valid length
    pub fn stat(&self) -> Result<Stat, ScullError> {
        let buffer = self.dev.acquire(&self.signals)?;
        let blocks = if buffer.page.is_some() { (PAGE_SIZE / 512) as u64 } else { 0 };
        Ok(Stat {
            st_mode: S_IFCHR | 0o666,
            st_size: buffer.size as u64,
            st_blksize: PAGE_SIZE as u64,
            st_blocks: blocks,
        })
    }
}

impl File for ScullFile {
    fn read(&mut self, buf: &mut dyn IoBufferWriter) -> Result<usize, Errno> {
        Ok(ScullFile::read(self, buf)?)
    }

    fn write(&mut self, buf: &mut dyn IoBufferReader) -> Result<usize, Errno> {
        Ok(ScullFile::write(self, buf)?)
    }

    fn stat(&self) -> Result<Stat, Errno> {
        Ok(ScullFile::stat(self)?)
    }

    fn seek(&mut self, offset: i64, whence: i32) -> Result<i64, Errno> {
        Ok(ScullFile::seek(self, offset, whence)? as i64)
    }

    fn mmap(&mut self, request: &MapRequest) -> Result<Box<dyn VmOperations>, Errno> {
        let mapping = ScullFile::mmap(self, request)?;
        Ok(Box::new(mapping))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScullConfig;
    use crate::devices::scull::ScullDevices;
    use crate::io::uaccess::TransferFault;
    use crate::memory::PhysicalMemory;

    fn devices(frames: usize) -> (ScullDevices, Arc<PhysicalMemory>) {
        let memory = Arc::new(PhysicalMemory::new(frames));
        (ScullDevices::new(&ScullConfig::default(), Arc::clone(&memory)), memory)
    }

    /// Source that always faults
    struct BadSource(usize);

    impl IoBufferReader for BadSource {
        fn len(&self) -> usize {
            self.0
        }

        fn read_slice(&mut self, _data: &mut [u8]) -> Result<(), TransferFault> {
            Err(TransferFault)
        }
    }

    /// Destination that always faults
    struct BadDest(usize);

    impl IoBufferWriter for BadDest {
        fn len(&self) -> usize {
            self.0
        }

        fn write_slice(&mut self, _data: &[u8]) -> Result<(), TransferFault> {
            Err(TransferFault)
        }
    }

    #[test]
    fn write_then_read_reproduces_data() {
        let (devices, _) = devices(4);
        let mut file = devices.open(0).unwrap();
        assert_eq!(file.write_bytes(b"hello world").unwrap(), 11);
        assert_eq!(file.offset(), 11);
        assert_eq!(file.stat().unwrap().st_size, 11);

        assert_eq!(file.seek(0, SEEK_SET).unwrap(), 0);
        assert_eq!(file.read_to_vec(64).unwrap(), b"hello world");
        assert_eq!(file.offset(), 11);
    }

    #[test]
    fn read_is_bounded_by_size_and_cursor() {
        let (devices, _) = devices(4);
        let mut writer = devices.open(0).unwrap();
        writer.write_bytes(b"abcdef").unwrap();

        let mut reader = devices.open(0).unwrap();
        assert_eq!(reader.read_to_vec(4).unwrap(), b"abcd");
        assert_eq!(reader.read_to_vec(4).unwrap(), b"ef");
        assert_eq!(reader.read_to_vec(4).unwrap(), b"");

        // Past the end is not an error
        reader.seek(100, SEEK_SET).unwrap();
        assert_eq!(reader.read_to_vec(4).unwrap(), b"");
    }

    #[test]
    fn read_of_never_written_instance_is_empty() {
        let (devices, _) = devices(1);
        let mut file = devices.open(1).unwrap();
        assert_eq!(file.read_to_vec(16).unwrap(), b"");
        assert_eq!(file.stat().unwrap().st_blocks, 0);
    }

    #[test]
    fn oversized_write_is_rejected_without_changes() {
        let (devices, memory) = devices(4);
        let mut file = devices.open(0).unwrap();
        file.write_bytes(b"keep").unwrap();

        let big = vec![0x55u8; PAGE_SIZE + 1];
        assert_eq!(file.write_bytes(&big), Err(ScullError::InvalidLength));
        assert_eq!(file.offset(), 4);
        assert_eq!(memory.get_stats().0, 1);

        file.seek(0, SEEK_SET).unwrap();
        assert_eq!(file.read_to_vec(16).unwrap(), b"keep");
    }

    #[test]
    fn full_page_write_is_accepted() {
        let (devices, _) = devices(2);
        let mut file = devices.open(0).unwrap();
        let page = vec![0xabu8; PAGE_SIZE];
        assert_eq!(file.write_bytes(&page).unwrap(), PAGE_SIZE);
        file.seek(0, SEEK_SET).unwrap();
        assert_eq!(file.read_to_vec(PAGE_SIZE).unwrap(), page);
    }

    #[test]
    fn each_write_replaces_the_page() {
        let (devices, memory) = devices(4);
        let mut file = devices.open(0).unwrap();
        file.write_bytes(b"first write").unwrap();
        file.write_bytes(b"2nd").unwrap();

        // The unpinned old page went straight back to the pool
        assert_eq!(memory.get_stats().0, 1);
        file.seek(0, SEEK_SET).unwrap();
        assert_eq!(file.read_to_vec(64).unwrap(), b"2nd");
    }

    #[test]
    fn faulting_source_leaves_buffer_unchanged() {
        let (devices, memory) = devices(4);
        let mut file = devices.open(0).unwrap();
        file.write_bytes(b"stable").unwrap();

        assert_eq!(file.write(&mut BadSource(3)), Err(ScullError::TransferFault));
        assert_eq!(memory.get_stats().0, 1);
        assert!(!file.device().is_locked());

        file.seek(0, SEEK_SET).unwrap();
        assert_eq!(file.read_to_vec(16).unwrap(), b"stable");
    }

    #[test]
    fn faulting_destination_keeps_cursor() {
        let (devices, _) = devices(4);
        let mut file = devices.open(0).unwrap();
        file.write_bytes(b"data").unwrap();
        file.seek(1, SEEK_SET).unwrap();

        assert_eq!(file.read(&mut BadDest(8)), Err(ScullError::TransferFault));
        assert_eq!(file.offset(), 1);
        assert!(!file.device().is_locked());
    }

    #[test]
    fn exhausted_pool_is_out_of_memory() {
        let (devices, _) = devices(1);
        let mut a = devices.open(0).unwrap();
        let mut b = devices.open(1).unwrap();
        a.write_bytes(b"takes the only frame").unwrap();

        assert_eq!(b.write_bytes(b"x"), Err(ScullError::OutOfMemory));
        assert_eq!(b.stat().unwrap().st_size, 0);
    }

    #[test]
    fn rewrite_fits_in_a_single_frame() {
        let (devices, memory) = devices(1);
        let mut file = devices.open(0).unwrap();
        file.write_bytes(b"a longer first write").unwrap();

        assert_eq!(file.write_bytes(b"b").unwrap(), 1);
        assert_eq!(memory.get_stats().0, 1);
        file.seek(0, SEEK_SET).unwrap();
        assert_eq!(file.read_to_vec(32).unwrap(), b"b");

        // Stale bytes past the new size are cleared
        let mapping = file.mmap(&MapRequest::shared(PAGE_SIZE)).unwrap();
        let mut tail = [0xFFu8; 4];
        mapping.page().read(1, &mut tail);
        assert_eq!(tail, [0u8; 4]);
    }

    #[test]
    fn pinned_page_is_not_reused_when_pool_is_empty() {
        let (devices, memory) = devices(1);
        let mut file = devices.open(0).unwrap();
        file.write_bytes(b"mapped").unwrap();
        let mapping = file.mmap(&MapRequest::shared(PAGE_SIZE)).unwrap();

        assert_eq!(file.write_bytes(b"other"), Err(ScullError::OutOfMemory));
        assert_eq!(memory.get_stats().0, 1);
        file.seek(0, SEEK_SET).unwrap();
        assert_eq!(file.read_to_vec(16).unwrap(), b"mapped");

        drop(mapping);
        assert_eq!(file.write_bytes(b"other").unwrap(), 5);
    }

    #[test]
    fn seek_rules() {
        let (devices, _) = devices(2);
        let mut file = devices.open(0).unwrap();
        file.write_bytes(b"0123456789").unwrap();

        assert_eq!(file.seek(-3, SEEK_END).unwrap(), 7);
        assert_eq!(file.seek(2, SEEK_CUR).unwrap(), 9);
        assert_eq!(file.seek(-10, SEEK_CUR), Err(ScullError::InvalidSeek));
        assert_eq!(file.seek(0, 7), Err(ScullError::InvalidSeek));
        assert_eq!(file.offset(), 9);
    }

    #[test]
    fn stat_reports_character_device() {
        let (devices, _) = devices(2);
        let mut file = devices.open(0).unwrap();
        file.write_bytes(b"abc").unwrap();
        let stat = File::stat(&file).unwrap();
        assert!(crate::io::device::S_ISCHR(stat.st_mode));
        assert_eq!(stat.st_blksize, PAGE_SIZE as u64);
        assert_eq!(stat.st_blocks, 8);
    }
}
