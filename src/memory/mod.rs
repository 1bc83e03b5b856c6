/*
 * Memory Management
 *
 * High-level module that ties together:
 *  - Physical frame allocator (phys) and its direct map (physmap)
 *  - Reference-counted page store (page)
 *  - Per-process page tables (paging) and address spaces (address_space)
 */

pub mod address_space;
pub mod page;
pub mod paging;
pub mod phys;
pub mod physmap;
pub mod types;

pub use address_space::{Access, AddressSpace, VmError};
pub use page::{PageRef, PinnedPage};
pub use phys::PhysicalMemory;
pub use types::{PAGE_SIZE, PhysAddr, PhysFrame, VirtAddr};
