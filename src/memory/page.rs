/*
 * Page Store
 *
 * Reference-counted ownership of single physical pages.
 *
 * Design:
 * - A `PageRef` is one counted reference to a page: cloning it is "get",
 *   dropping it is "put"
 * - The frame goes back to the allocator when the last reference drops,
 *   whoever held it (a device buffer, a page table entry, a mapping)
 * - Mappings additionally pin the page: a `PinnedPage` holds a reference
 *   and one unit of the map count until it is dropped
 *
 * A page that is replaced while pinned therefore stays valid for every
 * mapping that still points at it, and is reclaimed when the last mapping
 * is torn down.
 */

use super::phys::PhysicalMemory;
use crate::memory::types::{PAGE_SIZE, PhysAddr, PhysFrame};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

/// One physical page owned by the page store
pub struct Page {
    frame: PhysFrame,
    memory: Arc<PhysicalMemory>,
    mapcount: AtomicUsize,
}

impl Drop for Page {
    fn drop(&mut self) {
        self.memory.free_frame(self.frame);
        log::debug!("Released {} back to the frame allocator", self.frame);
    }
}

/// Counted reference to a page
#[derive(Clone)]
pub struct PageRef(Arc<Page>);

impl PageRef {
    /// Allocate a fresh zeroed page
    ///
    /// Returns None if the physical pool is exhausted.
    pub fn alloc(memory: &Arc<PhysicalMemory>) -> Option<Self> {
        let frame = memory.alloc_frame()?;
        Some(Self(Arc::new(Page {
            frame,
            memory: Arc::clone(memory),
            mapcount: AtomicUsize::new(0),
        })))
    }

    pub fn frame(&self) -> PhysFrame {
        self.0.frame
    }

    pub fn phys_addr(&self) -> PhysAddr {
        self.0.frame.phys_addr()
    }

    /// Number of live references (owner, mappings, page table entries)
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Number of live mappings pinning this page
    pub fn map_count(&self) -> usize {
        self.0.mapcount.load(Ordering::Acquire)
    }

    pub fn is_pinned(&self) -> bool {
        self.map_count() > 0
    }

    /// Pin the page for a mapping
    pub fn pin(&self) -> PinnedPage {
        self.0.mapcount.fetch_add(1, Ordering::AcqRel);
        PinnedPage(self.clone())
    }

    /// Whether two references point at the same page
    pub fn ptr_eq(&self, other: &PageRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Copy `dest.len()` bytes out of the page starting at `offset`
    pub fn read(&self, offset: usize, dest: &mut [u8]) {
        assert!(offset + dest.len() <= PAGE_SIZE);
        let phys = PhysAddr::new(self.0.frame.start_address() + offset as u64);
        self.0.memory.read_phys(phys, dest);
    }

    /// Copy `src` into the page starting at `offset`
    pub fn write(&self, offset: usize, src: &[u8]) {
        assert!(offset + src.len() <= PAGE_SIZE);
        let phys = PhysAddr::new(self.0.frame.start_address() + offset as u64);
        self.0.memory.write_phys(phys, src);
    }
}

impl core::fmt::Debug for PageRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PageRef")
            .field("frame", &self.0.frame)
            .field("refs", &self.ref_count())
            .field("mapcount", &self.map_count())
            .finish()
    }
}

/// A page pinned by a live mapping
///
/// Unpins on drop; the underlying reference is released with it.
pub struct PinnedPage(PageRef);

impl PinnedPage {
    pub fn page(&self) -> &PageRef {
        &self.0
    }
}

impl Drop for PinnedPage {
    fn drop(&mut self) {
        (self.0).0.mapcount.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_returns_to_pool_on_last_drop() {
        let memory = Arc::new(PhysicalMemory::new(4));
        let page = PageRef::alloc(&memory).unwrap();
        let extra = page.clone();
        assert_eq!(page.ref_count(), 2);
        assert_eq!(memory.get_stats().0, 1);

        drop(page);
        assert_eq!(memory.get_stats().0, 1);
        drop(extra);
        assert_eq!(memory.get_stats().0, 0);
    }

    #[test]
    fn pin_keeps_page_alive_and_counts_mappings() {
        let memory = Arc::new(PhysicalMemory::new(4));
        let page = PageRef::alloc(&memory).unwrap();
        page.write(0, b"pinned");

        let pin = page.pin();
        assert!(page.is_pinned());
        assert_eq!(page.map_count(), 1);

        // Owner lets go; the pin still holds the frame
        drop(page);
        assert_eq!(memory.get_stats().0, 1);

        let mut out = [0u8; 6];
        pin.page().read(0, &mut out);
        assert_eq!(&out, b"pinned");

        drop(pin);
        assert_eq!(memory.get_stats().0, 0);
    }

    #[test]
    fn alloc_fails_when_pool_exhausted() {
        let memory = Arc::new(PhysicalMemory::new(1));
        let _only = PageRef::alloc(&memory).unwrap();
        assert!(PageRef::alloc(&memory).is_none());
    }
}
