/*
 * Scull Memory Mapping
 *
 * mmap resolves the instance's current page under the instance lock and
 * pins it. The resulting `ScullMapping` becomes the fault handler of the VM
 * area; every fault in the area is answered with that same page, so a
 * mapping keeps showing the content that was current when it was created
 * even after later writes replace the instance's page.
 *
 * Faults never take the instance lock. A read or write whose user buffer
 * is itself a scull mapping therefore cannot deadlock against the lock the
 * read or write already holds.
 */

use super::session::ScullFile;
use super::ScullError;
use crate::memory::{PAGE_SIZE, PageRef, PinnedPage, VirtAddr, VmError};
use crate::shmem::{MapFlags, MapRequest, VmOperations};

/// A live mapping of one scull page
pub struct ScullMapping {
    pinned: PinnedPage,
    index: usize,
}

impl ScullMapping {
    /// The page this mapping pins
    pub fn page(&self) -> &PageRef {
        self.pinned.page()
    }

    /// Instance the page was taken from
    pub fn index(&self) -> usize {
        self.index
    }
}

impl VmOperations for ScullMapping {
    fn fault(&self, area_start: VirtAddr, addr: VirtAddr) -> Result<PageRef, VmError> {
        let offset = addr.as_u64().checked_sub(area_start.as_u64()).ok_or(VmError::Fault)?;
        if offset >= PAGE_SIZE as u64 {
            return Err(VmError::Fault);
        }
        Ok(self.pinned.page().clone())
    }

    fn name(&self) -> &str {
        "[scull]"
    }
}

impl Drop for ScullMapping {
    fn drop(&mut self) {
        log::debug!("scull{}: unmapped {}", self.index, self.pinned.page().frame());
    }
}

impl ScullFile {
    /// Pin the instance's current page for a shared mapping
    ///
    /// An instance that was never written gets an empty page, so later
    /// writes through the mapping and reads through the mapping agree.
    pub fn mmap(&mut self, request: &MapRequest) -> Result<ScullMapping, ScullError> {
        if request.len == 0 || request.len > PAGE_SIZE {
            return Err(ScullError::InvalidLength);
        }
        if request.offset != 0
            || !request.flags.contains(MapFlags::SHARED)
            || request.flags.intersects(MapFlags::PRIVATE | MapFlags::ANONYMOUS)
        {
            return Err(ScullError::InvalidMapping);
        }

        let mut buffer = self.dev.acquire(&self.signals)?;
        let page = match &buffer.page {
            Some(page) => page.clone(),
            None => {
                let page = PageRef::alloc(self.dev.memory()).ok_or(ScullError::OutOfMemory)?;
                buffer.page = Some(page.clone());
                buffer.size = 0;
                page
            }
        };
        let pinned = page.pin();
        drop(buffer);

        log::debug!(
            "scull{}: mapped {} ({} mapping(s))",
            self.dev.index(),
            page.frame(),
            page.map_count()
        );
        Ok(ScullMapping {
            pinned,
            index: self.dev.index(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScullConfig;
    use crate::devices::scull::ScullDevices;
    use crate::memory::PhysicalMemory;
    use crate::sync::SignalState;
    use alloc::sync::Arc;

    fn devices(frames: usize) -> (ScullDevices, Arc<PhysicalMemory>) {
        let memory = Arc::new(PhysicalMemory::new(frames));
        (ScullDevices::new(&ScullConfig::default(), Arc::clone(&memory)), memory)
    }

    #[test]
    fn mapping_pins_current_page() {
        let (devices, _) = devices(4);
        let mut file = devices.open(0).unwrap();
        file.write_bytes(b"HELLO").unwrap();

        let mapping = file.mmap(&MapRequest::shared(PAGE_SIZE)).unwrap();
        assert_eq!(mapping.page().map_count(), 1);
        assert_eq!(mapping.index(), 0);

        let mut head = [0u8; 5];
        mapping.page().read(0, &mut head);
        assert_eq!(&head, b"HELLO");

        drop(mapping);
        let buffer = file.device().acquire(&SignalState::new()).unwrap();
        assert!(!buffer.page.as_ref().unwrap().is_pinned());
    }

    #[test]
    fn fault_returns_pinned_page_after_replacement() {
        let (devices, memory) = devices(4);
        let mut file = devices.open(0).unwrap();
        file.write_bytes(b"old").unwrap();
        let mapping = file.mmap(&MapRequest::shared(16)).unwrap();
        let pinned_frame = mapping.page().frame();

        file.write_bytes(b"new").unwrap();
        assert_eq!(memory.get_stats().0, 2);

        let start = VirtAddr::new(0x4_0000_0000);
        let page = mapping.fault(start, start + 8u64).unwrap();
        assert_eq!(page.frame(), pinned_frame);
        assert_eq!(mapping.fault(start, start + PAGE_SIZE as u64).err(), Some(VmError::Fault));

        drop(page);
        drop(mapping);
        assert_eq!(memory.get_stats().0, 1);
    }

    #[test]
    fn never_written_instance_gets_empty_page() {
        let (devices, memory) = devices(2);
        let mut file = devices.open(1).unwrap();
        let mapping = file.mmap(&MapRequest::shared(100)).unwrap();
        assert_eq!(memory.get_stats().0, 1);
        assert_eq!(file.stat().unwrap().st_size, 0);
        assert_eq!(file.read_to_vec(10).unwrap(), b"");
        drop(mapping);
    }

    #[test]
    fn invalid_requests_are_rejected() {
        let (devices, memory) = devices(2);
        let mut file = devices.open(0).unwrap();

        assert_eq!(file.mmap(&MapRequest::shared(0)).err(), Some(ScullError::InvalidLength));
        assert_eq!(
            file.mmap(&MapRequest::shared(PAGE_SIZE + 1)).err(),
            Some(ScullError::InvalidLength)
        );
        assert_eq!(
            file.mmap(&MapRequest::shared(64).with_offset(4096)).err(),
            Some(ScullError::InvalidMapping)
        );
        assert_eq!(
            file.mmap(&MapRequest::shared(64).with_flags(MapFlags::PRIVATE)).err(),
            Some(ScullError::InvalidMapping)
        );
        assert_eq!(memory.get_stats().0, 0);
    }
}
