/*
 * Paging
 *
 * Per-address-space page table: maps 4 KiB virtual pages onto counted page
 * references with x86_64 page table flags. Every entry holds its own page
 * reference, so a frame stays allocated for as long as any table maps it.
 */

use super::page::PageRef;
use crate::memory::types::{PAGE_SIZE, PageTableFlags, PhysAddr, VirtAddr, VirtPage};
use alloc::collections::BTreeMap;

/// A single page table entry
pub struct PageTableEntry {
    page: PageRef,
    flags: PageTableFlags,
}

impl PageTableEntry {
    pub fn page(&self) -> &PageRef {
        &self.page
    }

    pub fn flags(&self) -> PageTableFlags {
        self.flags
    }
}

/// Errors returned by `map_page`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapToError {
    /// The virtual page already has an entry
    PageAlreadyMapped,
}

/// Software page table of one address space
#[derive(Default)]
pub struct PageTable {
    entries: BTreeMap<VirtPage, PageTableEntry>,
}

impl PageTable {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Map the virtual page containing `virt` to `page`
    pub fn map_page(
        &mut self,
        virt: VirtAddr,
        page: PageRef,
        flags: PageTableFlags,
    ) -> Result<(), MapToError> {
        let vpage = VirtPage::containing_address(virt);
        if self.entries.contains_key(&vpage) {
            return Err(MapToError::PageAlreadyMapped);
        }

        log::debug!(
            "map_page: 0x{:x} -> {} ({:?})",
            vpage.start_address().as_u64(),
            page.frame(),
            flags
        );
        self.entries.insert(vpage, PageTableEntry { page, flags: flags | PageTableFlags::PRESENT });
        Ok(())
    }

    /// Unmap the virtual page containing `virt`
    ///
    /// Returns the page reference the entry held; dropping it puts the page.
    pub fn unmap_page(&mut self, virt: VirtAddr) -> Option<PageRef> {
        let vpage = VirtPage::containing_address(virt);
        self.entries.remove(&vpage).map(|entry| entry.page)
    }

    /// Unmap every page in `[start, start + size)`
    ///
    /// Returns the number of entries removed.
    pub fn unmap_range(&mut self, start: VirtAddr, size: usize) -> usize {
        let page_count = size.div_ceil(PAGE_SIZE) as u64;
        (0..page_count)
            .filter(|i| self.unmap_page(start + i * PAGE_SIZE as u64).is_some())
            .count()
    }

    /// Look up the entry mapping `virt`
    pub fn entry(&self, virt: VirtAddr) -> Option<&PageTableEntry> {
        self.entries.get(&VirtPage::containing_address(virt))
    }

    /// Translate a virtual address to the physical address it maps to
    pub fn translate(&self, virt: VirtAddr) -> Option<PhysAddr> {
        let entry = self.entry(virt)?;
        let offset = virt.as_u64() % PAGE_SIZE as u64;
        Some(entry.page.phys_addr() + offset)
    }

    /// Number of pages currently mapped
    pub fn mapped_pages(&self) -> usize {
        self.entries.len()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
