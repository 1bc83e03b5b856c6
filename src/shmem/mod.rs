/*
 * Shared Memory Mappings
 *
 * This module defines the vocabulary shared by address spaces and the
 * devices that can be mapped into them: protection and mapping flags,
 * mapping requests, virtual memory areas, and the operations a device
 * supplies to resolve page faults inside its areas.
 *
 * Design:
 * - A mapping is backed either by anonymous zero pages or by a device
 * - Device-backed areas own a `VmOperations` object for their whole
 *   lifetime; dropping the area (munmap, process exit) drops it, which is
 *   where the device releases its pins
 * - Permissions are enforced per-area and translated to page table flags
 */

use crate::memory::address_space::VmError;
use crate::memory::page::PageRef;
use crate::memory::types::{PageTableFlags, VirtAddr};
use alloc::boxed::Box;
use bitflags::bitflags;

bitflags! {
    /// Mapping protection (PROT_*)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapProt: u32 {
        const READ = 0x1;
        const WRITE = 0x2;
        const EXEC = 0x4;
    }
}

bitflags! {
    /// Mapping flags (MAP_*), Linux x86_64 values
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapFlags: u32 {
        const SHARED = 0x01;
        const PRIVATE = 0x02;
        const FIXED = 0x10;
        const ANONYMOUS = 0x20;
        const POPULATE = 0x8000;
    }
}

impl MapProt {
    pub const READ_WRITE: Self = Self::READ.union(Self::WRITE);

    pub fn to_page_flags(self) -> PageTableFlags {
        let mut flags = PageTableFlags::PRESENT | PageTableFlags::USER_ACCESSIBLE;
        if self.contains(Self::WRITE) {
            flags |= PageTableFlags::WRITABLE;
        }
        if !self.contains(Self::EXEC) {
            flags |= PageTableFlags::NO_EXECUTE;
        }
        flags
    }
}

/// A request to map something into an address space
#[derive(Debug, Clone, Copy)]
pub struct MapRequest {
    /// Desired address (None = kernel chooses)
    pub addr: Option<VirtAddr>,
    /// Length in bytes
    pub len: usize,
    pub prot: MapProt,
    pub flags: MapFlags,
    /// Offset into the mapped object
    pub offset: u64,
}

impl MapRequest {
    /// Shared read/write mapping of `len` bytes at a kernel-chosen address
    pub fn shared(len: usize) -> Self {
        Self {
            addr: None,
            len,
            prot: MapProt::READ_WRITE,
            flags: MapFlags::SHARED,
            offset: 0,
        }
    }

    pub fn with_flags(mut self, flags: MapFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }
}

/// Page fault resolution for a device-backed area
pub trait VmOperations: Send + Sync {
    /// Resolve a fault at `addr` inside the area starting at `area_start`
    ///
    /// Returns a reference to the page to install; the page table entry owns
    /// that reference.
    fn fault(&self, area_start: VirtAddr, addr: VirtAddr) -> Result<PageRef, VmError>;

    /// Short name for diagnostics
    fn name(&self) -> &str {
        "[shared]"
    }
}

/// What backs a virtual memory area
pub enum Backing {
    /// Zero-filled pages allocated on first touch
    Anonymous,
    /// Pages supplied by a device
    Device(Box<dyn VmOperations>),
}

/// A contiguous range of virtual memory with uniform permissions
pub struct VmArea {
    /// Start virtual address (inclusive, page aligned)
    pub start: VirtAddr,
    /// Size in bytes (whole pages)
    pub size: usize,
    pub prot: MapProt,
    pub flags: MapFlags,
    pub backing: Backing,
}

impl VmArea {
    /// Get the end address (exclusive)
    pub fn end(&self) -> VirtAddr {
        self.start + self.size as u64
    }

    /// Check if an address is within this area
    pub fn contains(&self, addr: VirtAddr) -> bool {
        addr >= self.start && addr < self.end()
    }

    /// Check if `[start, start + size)` intersects this area
    pub fn overlaps(&self, start: VirtAddr, size: usize) -> bool {
        start < self.end() && self.start < start + size as u64
    }

    pub fn name(&self) -> &str {
        match &self.backing {
            Backing::Anonymous => "[anon]",
            Backing::Device(ops) => ops.name(),
        }
    }
}

impl core::fmt::Debug for VmArea {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:#x}-{:#x} {:?} {}",
            self.start.as_u64(),
            self.end().as_u64(),
            self.prot,
            self.name()
        )
    }
}
