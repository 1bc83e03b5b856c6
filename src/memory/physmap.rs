/*
 * Physical Memory Direct Map (Physmap)
 *
 * Gives the kernel byte-level access to any frame of the physical pool
 * without going through a process page table.
 *
 * DESIGN:
 * - Physical [base..base+frames*4K) maps linearly onto the pool storage
 * - Every byte is an AtomicU8, so a page may be read and written through
 *   several mappings at once without a data race
 * - Accessors never cross the end of a frame; callers split at page
 *   boundaries
 */

use super::phys::PhysicalMemory;
use crate::memory::types::{PAGE_SIZE, PhysAddr, PhysFrame};
use core::sync::atomic::{AtomicU8, Ordering};

impl PhysicalMemory {
    /// Convert a physical range to its bytes in the direct map
    ///
    /// # Panics
    /// Panics if the range is outside the pool or crosses a frame boundary
    /// (indicates a caller bug, not a user error)
    #[inline]
    pub fn phys_to_virt(&self, phys: PhysAddr, len: usize) -> &[AtomicU8] {
        let frame = PhysFrame::containing_address(phys.as_u64());
        let offset = (phys.as_u64() - frame.start_address()) as usize;

        let Some(frame_num) = self.frame_number(frame) else {
            panic!("phys_to_virt: physical address 0x{:x} is outside the pool", phys.as_u64());
        };
        assert!(
            offset + len <= PAGE_SIZE,
            "phys_to_virt: range 0x{:x}+{} crosses a frame boundary",
            phys.as_u64(),
            len
        );

        let start = frame_num * PAGE_SIZE + offset;
        &self.storage[start..start + len]
    }

    /// Copy bytes out of physical memory
    pub fn read_phys(&self, phys: PhysAddr, dest: &mut [u8]) {
        let src = self.phys_to_virt(phys, dest.len());
        for (d, s) in dest.iter_mut().zip(src) {
            *d = s.load(Ordering::Relaxed);
        }
    }

    /// Copy bytes into physical memory
    pub fn write_phys(&self, phys: PhysAddr, src: &[u8]) {
        let dest = self.phys_to_virt(phys, src.len());
        for (d, s) in dest.iter().zip(src) {
            d.store(*s, Ordering::Relaxed);
        }
    }

    /// Fill a whole frame with zeroes
    pub fn zero_frame(&self, frame: PhysFrame) {
        for byte in self.phys_to_virt(frame.phys_addr(), PAGE_SIZE) {
            byte.store(0, Ordering::Relaxed);
        }
    }
}
