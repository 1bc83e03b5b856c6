/*
 * Process Abstraction
 *
 * The caller side of every device operation. A Process is a container for:
 * - Address space (user mappings, including device mappings)
 * - File descriptor table
 * - Pending-signal state, shared with every file it opens
 *
 * Exit tears the resources down in the order a kernel would: files first,
 * then the address space, whose device areas release their pins as they
 * are dropped.
 */

use crate::io::FileDescriptorTable;
use crate::memory::{AddressSpace, PhysicalMemory};
use crate::sync::SignalState;
use alloc::string::String;
use alloc::sync::Arc;

/// Unique identifier for a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub usize);

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Exited; every resource has been released
    Zombie,
}

pub struct Process {
    pub id: ProcessId,

    /// Human-readable process name (for debugging)
    pub name: String,

    pub state: ProcessState,

    pub fd_table: FileDescriptorTable,

    pub address_space: AddressSpace,

    /// Raised to interrupt blocking operations of this process
    pub signals: Arc<SignalState>,

    /// Exit code (valid only in Zombie state)
    pub exit_code: Option<i32>,
}

impl Process {
    /// Create a process with an empty address space over `memory`
    pub fn new(id: ProcessId, name: &str, memory: Arc<PhysicalMemory>) -> Self {
        Process {
            id,
            name: String::from(name),
            state: ProcessState::Running,
            fd_table: FileDescriptorTable::new(),
            address_space: AddressSpace::new(memory),
            signals: Arc::new(SignalState::new()),
            exit_code: None,
        }
    }

    /// Deliver a signal: interrupts the process's current lock wait
    pub fn signal(&self) {
        self.signals.raise();
    }

    /// Terminate the process and release its resources
    pub fn exit(&mut self, code: i32) {
        if self.state == ProcessState::Zombie {
            return;
        }

        let files = self.fd_table.count();
        let areas = self.address_space.area_count();
        self.fd_table.close_all();
        self.address_space.clear();

        self.state = ProcessState::Zombie;
        self.exit_code = Some(code);
        log::debug!(
            "Process {} ({}) exited with {}: closed {} files, dropped {} areas",
            self.id.0,
            self.name,
            code,
            files,
            areas
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::PAGE_SIZE;
    use crate::shmem::MapProt;

    #[test]
    fn exit_releases_memory_once() {
        let memory = Arc::new(PhysicalMemory::new(4));
        let mut process = Process::new(ProcessId(1), "test", Arc::clone(&memory));
        let addr = process
            .address_space
            .map_anonymous(None, 2 * PAGE_SIZE, MapProt::READ_WRITE)
            .unwrap();
        process.address_space.copy_to_user(addr, b"touch").unwrap();
        assert_eq!(memory.get_stats().0, 1);

        process.exit(3);
        assert_eq!(process.state, ProcessState::Zombie);
        assert_eq!(process.exit_code, Some(3));
        assert_eq!(memory.get_stats().0, 0);

        process.exit(4);
        assert_eq!(process.exit_code, Some(3));
    }
}
