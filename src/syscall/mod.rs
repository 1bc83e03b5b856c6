/*
 * System Call Dispatch
 *
 * Routes a raw syscall (number plus six register arguments) to its
 * handler. The architecture entry stub saves the registers and calls
 * `syscall_dispatch` with the current process.
 *
 * System V ABI Calling Convention:
 * =================================
 *
 * Arguments:
 * - RAX: Syscall number
 * - RDI: Arg 1
 * - RSI: Arg 2
 * - RDX: Arg 3
 * - R10: Arg 4 (RCX used by SYSCALL, so use R10 instead)
 * - R8:  Arg 5
 * - R9:  Arg 6
 *
 * Return:
 * - RAX: Return value (negative = error code)
 */

pub mod handlers;
pub mod numbers;

use crate::devices::CharDeviceRegistry;
use crate::io::Errno;
use crate::process::Process;
use handlers::*;
use numbers::*;

/// Rust syscall dispatcher
///
/// # Arguments (System V ABI):
/// - nr: RAX (syscall number)
/// - args: RDI, RSI, RDX, R10, R8, R9
///
/// # Returns
/// - RAX: Return value (negative = error)
pub fn syscall_dispatch(
    registry: &CharDeviceRegistry,
    process: &mut Process,
    nr: usize,
    args: [u64; 6],
) -> isize {
    log::debug!(
        "Syscall {} called with args: {:#x}, {:#x}, {:#x}",
        nr,
        args[0],
        args[1],
        args[2]
    );

    let ret = match nr {
        SYS_READ => sys_read(process, args[0] as i32, args[1], args[2] as usize),
        SYS_WRITE => sys_write(process, args[0] as i32, args[1], args[2] as usize),
        SYS_OPEN => sys_open(registry, process, args[0] as u32),
        SYS_CLOSE => sys_close(process, args[0] as i32),
        SYS_FSTAT => sys_fstat(process, args[0] as i32, args[1]),
        SYS_LSEEK => sys_lseek(process, args[0] as i32, args[1] as i64, args[2] as i32),
        SYS_MMAP => sys_mmap(
            process,
            args[0],
            args[1] as usize,
            args[2] as u32,
            args[3] as u32,
            args[4] as i32,
            args[5],
        ),
        SYS_MUNMAP => sys_munmap(process, args[0], args[1] as usize),
        _ => {
            log::warn!("Unknown syscall number: {}", nr);
            Errno::ENOSYS.as_ret()
        }
    };

    log::debug!("Syscall {} returning: {}", nr, ret);
    ret
}
