/*
 * Physical Frame Allocator
 *
 * Bitmap-based allocator for 4 KiB frames.
 * Manages a fixed pool of physical memory handed over at construction time
 * (by the boot code inside the kernel, by the harness on the host).
 */

use crate::memory::types::{PAGE_SIZE, PhysFrame};
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::AtomicU8;
use spin::Mutex;

/// Physical address of the first frame of the pool (1 MiB, above legacy areas)
pub const POOL_PHYS_BASE: u64 = 0x0010_0000;

/// A pool of physical frames plus its allocation bitmap
///
/// The frame contents live in `storage`, which `physmap` exposes as the
/// direct map. Bytes are atomics so that pages shared between a device and
/// several mappings can be accessed concurrently without a lock.
pub struct PhysicalMemory {
    /// Physical address of frame 0
    base: u64,
    /// Number of frames in the pool
    frames: usize,
    /// Backing bytes of every frame, frame N at `N * PAGE_SIZE`
    pub(super) storage: Box<[AtomicU8]>,
    /// Frame bitmap - each bit represents one 4 KiB frame
    /// 0 = free, 1 = used
    bitmap: Mutex<Vec<u64>>,
}

impl PhysicalMemory {
    /// Create a pool of `frames` free frames starting at `POOL_PHYS_BASE`
    pub fn new(frames: usize) -> Self {
        let words = frames.div_ceil(64);
        let mut bitmap = vec![0u64; words];

        // Bits past the end of the pool stay permanently used
        let tail = frames % 64;
        if tail != 0 {
            bitmap[words - 1] = u64::MAX << tail;
        }

        let storage: Box<[AtomicU8]> = (0..frames * PAGE_SIZE).map(|_| AtomicU8::new(0)).collect();

        log::info!(
            "Physical memory pool: {} frames at 0x{:x}-0x{:x}",
            frames,
            POOL_PHYS_BASE,
            POOL_PHYS_BASE + (frames * PAGE_SIZE) as u64
        );

        Self {
            base: POOL_PHYS_BASE,
            frames,
            storage,
            bitmap: Mutex::new(bitmap),
        }
    }

    /// Allocate a zeroed physical frame
    ///
    /// Returns None when the pool is exhausted.
    pub fn alloc_frame(&self) -> Option<PhysFrame> {
        let frame_num = {
            let mut bitmap = self.bitmap.lock();
            let (word_idx, word) = bitmap
                .iter_mut()
                .enumerate()
                .find(|(_, word)| **word != u64::MAX)?;

            let bit_idx = (!*word).trailing_zeros() as usize;
            *word |= 1u64 << bit_idx;
            word_idx * 64 + bit_idx
        };

        let frame = self.frame_at(frame_num);
        // The frame is ours now; clear stale contents outside the bitmap lock
        self.zero_frame(frame);
        Some(frame)
    }

    /// Free a physical frame
    pub fn free_frame(&self, frame: PhysFrame) {
        let Some(frame_num) = self.frame_number(frame) else {
            log::error!("free_frame: {} is outside the pool", frame);
            return;
        };

        let mask = 1u64 << (frame_num % 64);
        let mut bitmap = self.bitmap.lock();
        let word = &mut bitmap[frame_num / 64];
        if *word & mask == 0 {
            log::warn!("free_frame: double free of {}", frame);
        }
        *word &= !mask;
    }

    /// Get statistics about frame usage: (used frames, total frames)
    pub fn get_stats(&self) -> (usize, usize) {
        let bitmap = self.bitmap.lock();
        let marked: usize = bitmap.iter().map(|w| w.count_ones() as usize).sum();
        let padding = bitmap.len() * 64 - self.frames;
        (marked - padding, self.frames)
    }

    /// Number of frames currently free
    pub fn free_frames(&self) -> usize {
        let (used, total) = self.get_stats();
        total - used
    }

    /// Check whether a frame belongs to this pool
    pub fn contains(&self, frame: PhysFrame) -> bool {
        self.frame_number(frame).is_some()
    }

    /// Index of a frame within the pool
    pub(super) fn frame_number(&self, frame: PhysFrame) -> Option<usize> {
        let addr = frame.start_address().checked_sub(self.base)?;
        let num = (addr / PhysFrame::SIZE) as usize;
        (num < self.frames).then_some(num)
    }

    fn frame_at(&self, frame_num: usize) -> PhysFrame {
        PhysFrame::containing_address(self.base + (frame_num as u64) * PhysFrame::SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_until_exhausted_then_reuse() {
        let pool = PhysicalMemory::new(3);
        let a = pool.alloc_frame().unwrap();
        let b = pool.alloc_frame().unwrap();
        let c = pool.alloc_frame().unwrap();
        assert!(pool.alloc_frame().is_none());
        assert_eq!(pool.get_stats(), (3, 3));

        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(a.start_address(), POOL_PHYS_BASE);

        pool.free_frame(b);
        assert_eq!(pool.free_frames(), 1);
        assert_eq!(pool.alloc_frame(), Some(b));
    }

    #[test]
    fn frames_outside_pool_are_rejected() {
        let pool = PhysicalMemory::new(2);
        let foreign = PhysFrame::containing_address(0x1000);
        assert!(!pool.contains(foreign));
        pool.free_frame(foreign);
        assert_eq!(pool.get_stats(), (0, 2));
    }

    #[test]
    fn empty_pool_never_allocates() {
        let pool = PhysicalMemory::new(0);
        assert!(pool.alloc_frame().is_none());
        assert_eq!(pool.get_stats(), (0, 0));
    }
}
