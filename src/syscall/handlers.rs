/*
 * System Call Handlers
 *
 * Each handler:
 * - Validates arguments from userspace (pointers, file descriptors, flags)
 * - Performs the requested operation on the calling process
 * - Returns result or error code (negative for errors)
 *
 * User buffers are never dereferenced directly: they are wrapped in a
 * `UserSlice` and copied through the caller's address space, so a bad
 * pointer inside userspace surfaces as EFAULT from the copy.
 */

use crate::devices::{CharDeviceRegistry, DevNo};
use crate::io::{Errno, Stat, UserSlice};
use crate::memory::address_space::layout;
use crate::memory::VirtAddr;
use crate::process::Process;
use crate::shmem::{MapFlags, MapProt, MapRequest};
use alloc::sync::Arc;

/// Validate a user pointer
///
/// Checks that a pointer from userspace is:
/// - Not NULL
/// - Within userspace address range (< 0x0000_8000_0000_0000)
/// - Does not overflow when adding count
fn validate_user_ptr(addr: u64, count: usize) -> Result<VirtAddr, Errno> {
    if addr == 0 {
        return Err(Errno::EFAULT);
    }

    match addr.checked_add(count as u64) {
        Some(end) if end <= layout::USER_END => {}
        _ => return Err(Errno::EFAULT),
    }

    VirtAddr::try_new(addr).map_err(|_| Errno::EFAULT)
}

/// Fold a handler result into the syscall return value
fn ret(result: Result<usize, Errno>) -> isize {
    match result {
        Ok(value) => value as isize,
        Err(errno) => errno.as_ret(),
    }
}

pub fn sys_open(registry: &CharDeviceRegistry, process: &mut Process, devno: u32) -> isize {
    ret(registry
        .open(DevNo::from_raw(devno), Arc::clone(&process.signals))
        .map(|file| process.fd_table.alloc(file) as usize))
}

pub fn sys_read(process: &mut Process, fd: i32, buf: u64, count: usize) -> isize {
    ret(do_read(process, fd, buf, count))
}

fn do_read(process: &mut Process, fd: i32, buf: u64, count: usize) -> Result<usize, Errno> {
    let file = process.fd_table.get_mut(fd)?;
    if count == 0 {
        return Ok(0);
    }
    let addr = validate_user_ptr(buf, count)?;
    let mut user = UserSlice::new(&mut process.address_space, addr, count);
    file.read(&mut user)
}

pub fn sys_write(process: &mut Process, fd: i32, buf: u64, count: usize) -> isize {
    ret(do_write(process, fd, buf, count))
}

fn do_write(process: &mut Process, fd: i32, buf: u64, count: usize) -> Result<usize, Errno> {
    let file = process.fd_table.get_mut(fd)?;
    let addr = match count {
        // Still a write: replaces the content with nothing
        0 => VirtAddr::new(0),
        _ => validate_user_ptr(buf, count)?,
    };
    let mut user = UserSlice::new(&mut process.address_space, addr, count);
    file.write(&mut user)
}

pub fn sys_close(process: &mut Process, fd: i32) -> isize {
    ret(process.fd_table.close(fd).map(|()| 0))
}

pub fn sys_lseek(process: &mut Process, fd: i32, offset: i64, whence: i32) -> isize {
    match process.fd_table.get_mut(fd).and_then(|file| file.seek(offset, whence)) {
        Ok(position) => position as isize,
        Err(errno) => errno.as_ret(),
    }
}

pub fn sys_fstat(process: &mut Process, fd: i32, statbuf: u64) -> isize {
    ret(do_fstat(process, fd, statbuf))
}

fn do_fstat(process: &mut Process, fd: i32, statbuf: u64) -> Result<usize, Errno> {
    let stat = process.fd_table.get_mut(fd)?.stat()?;
    let addr = validate_user_ptr(statbuf, Stat::SIZE)?;
    process.address_space.copy_to_user(addr, &stat.to_bytes())?;
    Ok(0)
}

pub fn sys_mmap(
    process: &mut Process,
    addr: u64,
    len: usize,
    prot: u32,
    flags: u32,
    fd: i32,
    offset: u64,
) -> isize {
    ret(do_mmap(process, addr, len, prot, flags, fd, offset))
}

fn do_mmap(
    process: &mut Process,
    addr: u64,
    len: usize,
    prot: u32,
    flags: u32,
    fd: i32,
    offset: u64,
) -> Result<usize, Errno> {
    let prot = MapProt::from_bits(prot).ok_or(Errno::EINVAL)?;
    let flags = MapFlags::from_bits(flags).ok_or(Errno::EINVAL)?;

    // Without MAP_FIXED the address is only a hint, and hints are ignored
    let fixed = if flags.contains(MapFlags::FIXED) {
        Some(VirtAddr::try_new(addr).map_err(|_| Errno::EINVAL)?)
    } else {
        None
    };

    let start = if flags.contains(MapFlags::ANONYMOUS) {
        process.address_space.map_anonymous(fixed, len, prot)?
    } else {
        let request = MapRequest {
            addr: fixed,
            len,
            prot,
            flags,
            offset,
        };
        let ops = process.fd_table.get_mut(fd)?.mmap(&request)?;
        process.address_space.map_device(fixed, len, prot, flags, ops)?
    };

    Ok(start.as_u64() as usize)
}

pub fn sys_munmap(process: &mut Process, addr: u64, len: usize) -> isize {
    ret(VirtAddr::try_new(addr)
        .map_err(|_| Errno::EINVAL)
        .and_then(|addr| process.address_space.munmap(addr, len).map_err(Errno::from))
        .map(|()| 0))
}
