/*
 * Memory Types
 *
 * This module defines core memory types used throughout the memory subsystem.
 * We re-export x86_64 crate types where appropriate and provide our own wrappers
 * for cleaner abstractions.
 */

// Re-export x86_64 types for convenience
pub use x86_64::{PhysAddr, VirtAddr};
pub use x86_64::structures::paging::{
    Page as X86Page, PageSize, PageTableFlags, PhysFrame as X86PhysFrame, Size4KiB,
};

/// Size of a page / frame in bytes (4 KiB)
pub const PAGE_SIZE: usize = Size4KiB::SIZE as usize;

/// A 4 KiB virtual page, the unit of page table entries
pub type VirtPage = X86Page<Size4KiB>;

/// Physical frame representation (4 KiB)
///
/// Represents a single 4 KiB aligned physical memory frame.
/// This is our internal type that wraps around addresses.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysFrame(u64);

impl PhysFrame {
    /// Size of a physical frame in bytes (4 KiB)
    pub const SIZE: u64 = Size4KiB::SIZE;

    /// Create a PhysFrame containing the given physical address
    /// Address is rounded down to 4 KiB boundary
    pub fn containing_address(addr: u64) -> Self {
        Self(addr & !(Self::SIZE - 1))
    }

    /// Get the starting physical address of this frame
    pub fn start_address(&self) -> u64 {
        self.0
    }

    /// Get the ending physical address of this frame (inclusive)
    pub fn end_address(&self) -> u64 {
        self.0 + Self::SIZE - 1
    }

    /// Starting address as a typed physical address
    pub fn phys_addr(&self) -> PhysAddr {
        PhysAddr::new(self.0)
    }

    /// Convert to x86_64 crate's PhysFrame type
    pub fn to_x86(&self) -> X86PhysFrame {
        X86PhysFrame::containing_address(self.phys_addr())
    }

    /// Create from x86_64 crate's PhysFrame type
    pub fn from_x86(frame: X86PhysFrame) -> Self {
        Self(frame.start_address().as_u64())
    }
}

impl core::fmt::Display for PhysFrame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "frame@{:#x}", self.0)
    }
}

/// Round a byte length up to whole pages
#[inline]
pub fn page_align_up(len: usize) -> usize {
    len.div_ceil(PAGE_SIZE) * PAGE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rounds_down_to_page_boundary() {
        let frame = PhysFrame::containing_address(0x12_3456);
        assert_eq!(frame.start_address(), 0x12_3000);
        assert_eq!(frame.end_address(), 0x12_3fff);
        assert_eq!(PhysFrame::from_x86(frame.to_x86()), frame);
    }

    #[test]
    fn page_align_up_rounds_to_whole_pages() {
        assert_eq!(page_align_up(0), 0);
        assert_eq!(page_align_up(1), PAGE_SIZE);
        assert_eq!(page_align_up(PAGE_SIZE), PAGE_SIZE);
        assert_eq!(page_align_up(PAGE_SIZE + 1), 2 * PAGE_SIZE);
    }
}
