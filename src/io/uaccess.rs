/*
 * User Memory Access
 *
 * Buffers that device code copies into (read) or out of (write). A buffer is
 * either plain kernel memory, which never faults, or a range of a process
 * address space, which faults like a user access would.
 *
 * Every copy either succeeds completely or reports `TransferFault`.
 */

use crate::memory::{AddressSpace, VirtAddr};

/// A copy to or from caller memory failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferFault;

/// Destination of a read (copy_to_user)
pub trait IoBufferWriter {
    /// Number of bytes the caller asked for
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `data` to the start of the buffer
    fn write_slice(&mut self, data: &[u8]) -> Result<(), TransferFault>;
}

/// Source of a write (copy_from_user)
pub trait IoBufferReader {
    /// Number of bytes the caller supplied
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `data` from the start of the buffer
    fn read_slice(&mut self, data: &mut [u8]) -> Result<(), TransferFault>;
}

impl IoBufferWriter for &mut [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn write_slice(&mut self, data: &[u8]) -> Result<(), TransferFault> {
        self.get_mut(..data.len())
            .ok_or(TransferFault)?
            .copy_from_slice(data);
        Ok(())
    }
}

impl IoBufferReader for &[u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn read_slice(&mut self, data: &mut [u8]) -> Result<(), TransferFault> {
        data.copy_from_slice(self.get(..data.len()).ok_or(TransferFault)?);
        Ok(())
    }
}

/// A byte range of a process address space
pub struct UserSlice<'a> {
    space: &'a mut AddressSpace,
    addr: VirtAddr,
    len: usize,
}

impl<'a> UserSlice<'a> {
    pub fn new(space: &'a mut AddressSpace, addr: VirtAddr, len: usize) -> Self {
        Self { space, addr, len }
    }
}

impl IoBufferWriter for UserSlice<'_> {
    fn len(&self) -> usize {
        self.len
    }

    fn write_slice(&mut self, data: &[u8]) -> Result<(), TransferFault> {
        if data.len() > self.len {
            return Err(TransferFault);
        }
        self.space.copy_to_user(self.addr, data).map_err(|e| {
            log::debug!("copy_to_user 0x{:x}+{}: {}", self.addr.as_u64(), data.len(), e);
            TransferFault
        })
    }
}

impl IoBufferReader for UserSlice<'_> {
    fn len(&self) -> usize {
        self.len
    }

    fn read_slice(&mut self, data: &mut [u8]) -> Result<(), TransferFault> {
        if data.len() > self.len {
            return Err(TransferFault);
        }
        self.space.copy_from_user(self.addr, data).map_err(|e| {
            log::debug!("copy_from_user 0x{:x}+{}: {}", self.addr.as_u64(), data.len(), e);
            TransferFault
        })
    }
}
