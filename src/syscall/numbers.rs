/*
 * System Call Numbers
 *
 * Linux x86_64 numbers for the file and memory-mapping syscalls the scull
 * device is reached through.
 *
 * Syscall Mechanism:
 * - RAX register contains syscall number
 * - Arguments in RDI, RSI, RDX, R10, R8, R9 (6 args max)
 * - Return value in RAX (signed: negative = error code)
 */

/// Read from file descriptor
///
/// Arguments: (fd: i32, buf: *mut u8, count: usize) -> isize
/// Returns: number of bytes read, or negative error code
pub const SYS_READ: usize = 0;

/// Write to file descriptor
///
/// Arguments: (fd: i32, buf: *const u8, count: usize) -> isize
/// Returns: number of bytes written, or negative error code
pub const SYS_WRITE: usize = 1;

/// Open a character device by device number
///
/// Arguments: (devno: u32) -> isize
/// Returns: new file descriptor, or negative error code
///
/// There is no filesystem; the "path" is the packed major/minor number.
pub const SYS_OPEN: usize = 2;

/// Close file descriptor
///
/// Arguments: (fd: i32) -> isize
/// Returns: 0 on success, or negative error code
pub const SYS_CLOSE: usize = 3;

/// Get file status
///
/// Arguments: (fd: i32, statbuf: *mut Stat) -> isize
/// Returns: 0 on success, or negative error code
pub const SYS_FSTAT: usize = 5;

/// Seek to position in file
///
/// Arguments: (fd: i32, offset: i64, whence: i32) -> isize
/// Returns: new file position, or negative error code
pub const SYS_LSEEK: usize = 8;

/// Map a file (or anonymous memory) into the address space
///
/// Arguments: (addr, len, prot, flags, fd, offset) -> isize
/// Returns: start address of the mapping, or negative error code
///
/// Note: Pages are installed lazily on first access unless MAP_POPULATE
pub const SYS_MMAP: usize = 9;

/// Remove a mapping
///
/// Arguments: (addr, len) -> isize
/// Returns: 0 on success, or negative error code
pub const SYS_MUNMAP: usize = 11;
