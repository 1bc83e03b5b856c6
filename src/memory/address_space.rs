/*
 * Address Space Management
 *
 * This module implements per-process address spaces: a page table plus the
 * list of virtual memory areas that describe what may be mapped where.
 *
 * Memory Layout:
 * ==============
 *
 * USERSPACE:
 * 0x00000000 - 0x00400000     Reserved (NULL pointer protection)
 * 0x00400000 - 0x400000000    Fixed mappings (MAP_FIXED)
 * 0x400000000 - 0x500000000   Kernel-chosen mmap range
 * 0x500000000 - 0x800000000000  Fixed mappings (MAP_FIXED)
 *
 * Key Concepts:
 * =============
 *
 * 1. LAZY ALLOCATION: Pages are installed on first access (page fault)
 *    unless the mapping asked for MAP_POPULATE
 * 2. DEVICE AREAS: Faults inside device-backed areas are resolved by the
 *    area's `VmOperations`
 * 3. USER COPIES: `copy_to_user` / `copy_from_user` walk the page table and
 *    fault pages in exactly like a user access would; an access outside any
 *    area (or against its permissions) is a fault
 */

use super::page::PageRef;
use super::paging::PageTable;
use super::phys::PhysicalMemory;
use crate::io::Errno;
use crate::memory::types::{PAGE_SIZE, PageTableFlags, PhysAddr, VirtAddr, page_align_up};
use crate::shmem::{Backing, MapFlags, MapProt, VmArea, VmOperations};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;

/// Memory layout constants
pub mod layout {
    /// Lowest address userspace may map (NULL pointer protection below)
    pub const USER_MIN: u64 = 0x0040_0000;
    /// Start of the range the kernel picks mmap addresses from
    pub const USER_MMAP_BASE: u64 = 0x4_0000_0000;
    /// End (exclusive) of the kernel-chosen mmap range
    pub const USER_MMAP_END: u64 = 0x5_0000_0000;
    /// End (exclusive) of userspace
    pub const USER_END: u64 = 0x0000_8000_0000_0000;
}

/// Address space errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// Address or length not page aligned / not in userspace
    Unaligned,
    /// Requested range intersects an existing area
    Overlap,
    /// No area at the given address
    NotMapped,
    /// No free virtual range large enough
    NoSpace,
    /// Access outside any area or against its permissions
    Fault,
    /// Zero-length or otherwise unusable length
    InvalidLength,
    /// Physical pool exhausted
    OutOfMemory,
}

impl core::fmt::Display for VmError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            VmError::Unaligned => write!(f, "Unaligned or non-user address"),
            VmError::Overlap => write!(f, "Range overlaps an existing mapping"),
            VmError::NotMapped => write!(f, "Not mapped"),
            VmError::NoSpace => write!(f, "No free virtual address range"),
            VmError::Fault => write!(f, "Bad address"),
            VmError::InvalidLength => write!(f, "Invalid length"),
            VmError::OutOfMemory => write!(f, "Out of memory"),
        }
    }
}

impl From<VmError> for Errno {
    fn from(err: VmError) -> Self {
        match err {
            VmError::Unaligned | VmError::InvalidLength | VmError::NotMapped => Errno::EINVAL,
            VmError::Overlap => Errno::EEXIST,
            VmError::NoSpace | VmError::OutOfMemory => Errno::ENOMEM,
            VmError::Fault => Errno::EFAULT,
        }
    }
}

/// Kind of memory access that triggered a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// Address space for a process
pub struct AddressSpace {
    /// Physical pool that anonymous pages come from
    memory: Arc<PhysicalMemory>,
    page_table: PageTable,
    /// Areas keyed by start address
    areas: BTreeMap<u64, VmArea>,
}

impl AddressSpace {
    /// Create an empty userspace address space
    pub fn new(memory: Arc<PhysicalMemory>) -> Self {
        Self {
            memory,
            page_table: PageTable::new(),
            areas: BTreeMap::new(),
        }
    }

    /// Map zero-filled anonymous memory
    pub fn map_anonymous(
        &mut self,
        addr: Option<VirtAddr>,
        len: usize,
        prot: MapProt,
    ) -> Result<VirtAddr, VmError> {
        self.insert_area(
            addr,
            len,
            prot,
            MapFlags::PRIVATE | MapFlags::ANONYMOUS,
            Backing::Anonymous,
        )
    }

    /// Map a device-backed area
    ///
    /// With `MapFlags::POPULATE` every page is faulted in immediately;
    /// otherwise pages are installed on first access.
    pub fn map_device(
        &mut self,
        addr: Option<VirtAddr>,
        len: usize,
        prot: MapProt,
        flags: MapFlags,
        ops: Box<dyn VmOperations>,
    ) -> Result<VirtAddr, VmError> {
        let start = self.insert_area(addr, len, prot, flags, Backing::Device(ops))?;

        if flags.contains(MapFlags::POPULATE) {
            if let Err(e) = self.populate(start, len) {
                // Roll back so the device's pin is released
                if let Err(undo) = self.munmap(start, len) {
                    log::warn!("mmap: rollback of {:?} failed: {}", start, undo);
                }
                return Err(e);
            }
        }

        Ok(start)
    }

    fn insert_area(
        &mut self,
        addr: Option<VirtAddr>,
        len: usize,
        prot: MapProt,
        flags: MapFlags,
        backing: Backing,
    ) -> Result<VirtAddr, VmError> {
        if len == 0 {
            return Err(VmError::InvalidLength);
        }
        let size = page_align_up(len);

        let start = match addr {
            Some(start) => {
                check_user_range(start, size)?;
                if self.areas.values().any(|a| a.overlaps(start, size)) {
                    return Err(VmError::Overlap);
                }
                start
            }
            None => self.find_free_range(size).ok_or(VmError::NoSpace)?,
        };

        let area = VmArea {
            start,
            size,
            prot,
            flags,
            backing,
        };
        log::debug!("insert_area: {:?}", area);
        self.areas.insert(start.as_u64(), area);

        Ok(start)
    }

    /// First-fit search in the kernel-chosen mmap range
    fn find_free_range(&self, size: usize) -> Option<VirtAddr> {
        let mut candidate = layout::USER_MMAP_BASE;
        for area in self.areas.values() {
            let (a_start, a_end) = (area.start.as_u64(), area.end().as_u64());
            if a_end <= candidate {
                continue;
            }
            if a_start >= candidate + size as u64 {
                break;
            }
            candidate = a_end;
        }

        (candidate + size as u64 <= layout::USER_MMAP_END).then(|| VirtAddr::new(candidate))
    }

    /// Remove the area starting at `addr`
    ///
    /// Only whole areas can be unmapped. Page table entries are dropped and
    /// the area's backing is released.
    pub fn munmap(&mut self, addr: VirtAddr, len: usize) -> Result<(), VmError> {
        let area = self.areas.get(&addr.as_u64()).ok_or(VmError::NotMapped)?;
        if page_align_up(len) != area.size {
            return Err(VmError::InvalidLength);
        }

        let size = area.size;
        let removed = self.page_table.unmap_range(addr, size);
        if let Some(area) = self.areas.remove(&addr.as_u64()) {
            log::debug!("munmap: {:?} ({} pages were present)", area, removed);
        }
        Ok(())
    }

    /// Fault in every page of `[start, start + len)`
    pub fn populate(&mut self, start: VirtAddr, len: usize) -> Result<(), VmError> {
        let pages = len.div_ceil(PAGE_SIZE) as u64;
        for i in 0..pages {
            let addr = start + i * PAGE_SIZE as u64;
            if self.page_table.entry(addr).is_none() {
                self.handle_page_fault(addr, Access::Read)?;
            }
        }
        Ok(())
    }

    /// Resolve a page fault at `addr`
    ///
    /// Finds the area, checks permissions, obtains the page from the backing
    /// and installs it.
    pub fn handle_page_fault(&mut self, addr: VirtAddr, access: Access) -> Result<(), VmError> {
        let area = self
            .areas
            .range(..=addr.as_u64())
            .next_back()
            .map(|(_, area)| area)
            .filter(|area| area.contains(addr))
            .ok_or(VmError::Fault)?;

        let allowed = match access {
            Access::Read => area.prot.contains(MapProt::READ),
            Access::Write => area.prot.contains(MapProt::WRITE),
        };
        if !allowed {
            log::debug!("Page fault at 0x{:x}: {:?} not permitted by {:?}", addr.as_u64(), access, area);
            return Err(VmError::Fault);
        }

        let page = match &area.backing {
            Backing::Anonymous => PageRef::alloc(&self.memory).ok_or(VmError::OutOfMemory)?,
            Backing::Device(ops) => ops.fault(area.start, addr)?,
        };
        let flags = area.prot.to_page_flags();

        self.page_table
            .map_page(addr, page, flags)
            .map_err(|_| VmError::Fault)
    }

    /// Page backing `addr` for an access, faulting it in if needed
    fn resolve(&mut self, addr: VirtAddr, access: Access) -> Result<PageRef, VmError> {
        if self.page_table.entry(addr).is_none() {
            self.handle_page_fault(addr, access)?;
        }

        let entry = self.page_table.entry(addr).ok_or(VmError::Fault)?;
        if access == Access::Write && !entry.flags().contains(PageTableFlags::WRITABLE) {
            return Err(VmError::Fault);
        }
        Ok(entry.page().clone())
    }

    /// Copy kernel bytes into user memory at `dest`
    pub fn copy_to_user(&mut self, dest: VirtAddr, src: &[u8]) -> Result<(), VmError> {
        check_user_access(dest, src.len())?;

        let mut done = 0;
        while done < src.len() {
            let addr = dest + done as u64;
            let offset = (addr.as_u64() % PAGE_SIZE as u64) as usize;
            let chunk = (PAGE_SIZE - offset).min(src.len() - done);

            let page = self.resolve(addr, Access::Write)?;
            page.write(offset, &src[done..done + chunk]);
            done += chunk;
        }
        Ok(())
    }

    /// Copy user memory at `src` into kernel bytes
    pub fn copy_from_user(&mut self, src: VirtAddr, dest: &mut [u8]) -> Result<(), VmError> {
        check_user_access(src, dest.len())?;

        let mut done = 0;
        while done < dest.len() {
            let addr = src + done as u64;
            let offset = (addr.as_u64() % PAGE_SIZE as u64) as usize;
            let chunk = (PAGE_SIZE - offset).min(dest.len() - done);

            let page = self.resolve(addr, Access::Read)?;
            page.read(offset, &mut dest[done..done + chunk]);
            done += chunk;
        }
        Ok(())
    }

    /// Translate a virtual address without faulting
    pub fn translate(&self, addr: VirtAddr) -> Option<PhysAddr> {
        self.page_table.translate(addr)
    }

    pub fn area_count(&self) -> usize {
        self.areas.len()
    }

    pub fn mapped_pages(&self) -> usize {
        self.page_table.mapped_pages()
    }

    /// Tear down every mapping (process exit)
    pub fn clear(&mut self) {
        self.page_table.clear();
        self.areas.clear();
    }
}

/// Validate an area placement: page aligned, inside userspace
fn check_user_range(start: VirtAddr, size: usize) -> Result<(), VmError> {
    let start = start.as_u64();
    if start % PAGE_SIZE as u64 != 0 || start < layout::USER_MIN {
        return Err(VmError::Unaligned);
    }
    match start.checked_add(size as u64) {
        Some(end) if end <= layout::USER_END => Ok(()),
        _ => Err(VmError::Unaligned),
    }
}

/// Validate a user access range: no wrap, inside userspace
fn check_user_access(addr: VirtAddr, len: usize) -> Result<(), VmError> {
    match addr.as_u64().checked_add(len as u64) {
        Some(end) if end <= layout::USER_END => Ok(()),
        _ => Err(VmError::Fault),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space(frames: usize) -> (Arc<PhysicalMemory>, AddressSpace) {
        let memory = Arc::new(PhysicalMemory::new(frames));
        let space = AddressSpace::new(Arc::clone(&memory));
        (memory, space)
    }

    #[test]
    fn anonymous_pages_are_allocated_on_first_touch() {
        let (memory, mut space) = space(8);
        let addr = space.map_anonymous(None, 2 * PAGE_SIZE, MapProt::READ_WRITE).unwrap();
        assert_eq!(addr.as_u64(), layout::USER_MMAP_BASE);
        assert_eq!(space.mapped_pages(), 0);

        space.copy_to_user(addr + 4090u64, b"straddle").unwrap();
        assert_eq!(space.mapped_pages(), 2);
        assert_eq!(memory.get_stats().0, 2);

        let mut out = [0u8; 8];
        space.copy_from_user(addr + 4090u64, &mut out).unwrap();
        assert_eq!(&out, b"straddle");
    }

    #[test]
    fn access_outside_any_area_faults() {
        let (_memory, mut space) = space(4);
        let mut out = [0u8; 4];
        assert_eq!(
            space.copy_from_user(VirtAddr::new(0x1000_0000), &mut out),
            Err(VmError::Fault)
        );
        assert_eq!(space.copy_to_user(VirtAddr::new(0x1000_0000), b"x"), Err(VmError::Fault));
    }

    #[test]
    fn write_to_read_only_area_faults() {
        let (_memory, mut space) = space(4);
        let addr = space.map_anonymous(None, PAGE_SIZE, MapProt::READ).unwrap();

        let mut out = [0xFFu8; 4];
        space.copy_from_user(addr, &mut out).unwrap();
        assert_eq!(out, [0u8; 4]);
        assert_eq!(space.copy_to_user(addr, b"nope"), Err(VmError::Fault));
    }

    #[test]
    fn fixed_mappings_must_not_overlap() {
        let (_memory, mut space) = space(4);
        let at = VirtAddr::new(0x1000_0000);
        space.map_anonymous(Some(at), PAGE_SIZE, MapProt::READ).unwrap();
        assert_eq!(
            space.map_anonymous(Some(at), PAGE_SIZE, MapProt::READ),
            Err(VmError::Overlap)
        );
        assert_eq!(
            space.map_anonymous(Some(VirtAddr::new(0x1000_0010)), PAGE_SIZE, MapProt::READ),
            Err(VmError::Unaligned)
        );
    }

    #[test]
    fn munmap_releases_frames() {
        let (memory, mut space) = space(4);
        let addr = space.map_anonymous(None, PAGE_SIZE, MapProt::READ_WRITE).unwrap();
        space.copy_to_user(addr, b"gone soon").unwrap();
        assert_eq!(memory.get_stats().0, 1);

        assert_eq!(space.munmap(addr, 2 * PAGE_SIZE), Err(VmError::InvalidLength));
        space.munmap(addr, PAGE_SIZE).unwrap();
        assert_eq!(memory.get_stats().0, 0);
        assert_eq!(space.area_count(), 0);
        assert_eq!(space.munmap(addr, PAGE_SIZE), Err(VmError::NotMapped));
    }

    #[test]
    fn kernel_chosen_addresses_skip_existing_areas() {
        let (_memory, mut space) = space(4);
        let first = space.map_anonymous(None, PAGE_SIZE, MapProt::READ).unwrap();
        let second = space.map_anonymous(None, PAGE_SIZE, MapProt::READ).unwrap();
        assert_eq!(second, first + PAGE_SIZE as u64);

        space.munmap(first, PAGE_SIZE).unwrap();
        let third = space.map_anonymous(None, PAGE_SIZE, MapProt::READ).unwrap();
        assert_eq!(third, first);
    }

    #[test]
    fn anonymous_fault_reports_out_of_memory() {
        let (_memory, mut space) = space(0);
        let addr = space.map_anonymous(None, PAGE_SIZE, MapProt::READ_WRITE).unwrap();
        assert_eq!(space.copy_to_user(addr, b"x"), Err(VmError::OutOfMemory));
    }

    /// Serves the first page and fails past it
    struct OnePage(PageRef);

    impl VmOperations for OnePage {
        fn fault(&self, area_start: VirtAddr, addr: VirtAddr) -> Result<PageRef, VmError> {
            if addr - area_start < PAGE_SIZE as u64 {
                Ok(self.0.clone())
            } else {
                Err(VmError::Fault)
            }
        }
    }

    #[test]
    fn failed_populate_removes_the_area() {
        let (memory, mut space) = space(2);
        let page = PageRef::alloc(&memory).unwrap();
        let ops = Box::new(OnePage(page.clone()));

        let flags = MapFlags::SHARED | MapFlags::POPULATE;
        assert_eq!(
            space.map_device(None, 2 * PAGE_SIZE, MapProt::READ_WRITE, flags, ops),
            Err(VmError::Fault)
        );
        assert_eq!(space.area_count(), 0);
        assert_eq!(space.mapped_pages(), 0);
        // Only our handle is left once the area and its entries are gone
        assert_eq!(page.ref_count(), 1);
    }
}
