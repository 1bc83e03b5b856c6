/*
 * Scull Scenario Tests
 *
 * End-to-end tests that drive the device the way tasks would: through
 * sessions, mappings installed in process address spaces, several threads
 * at once, and the syscall surface.
 *
 * - `scenarios` - buffer replacement and mapping lifecycle
 * - `concurrency` - lock exclusion, instance independence, interruption
 * - `syscall_tests` - fd table and syscall handlers, negative errnos
 */


use crate::config::ScullConfig;
use crate::devices::{CharDeviceRegistry, ScullDevices};
use crate::memory::PhysicalMemory;
use crate::process::{Process, ProcessId};
use alloc::sync::Arc;

/// A loaded driver with its registry and frame pool
pub(crate) struct Fixture {
    pub memory: Arc<PhysicalMemory>,
    pub registry: CharDeviceRegistry,
    pub devices: Arc<ScullDevices>,
}

impl Fixture {
    pub fn new(frames: usize) -> Self {
        Self::with_config(frames, ScullConfig::default())
    }

    pub fn with_config(frames: usize, config: ScullConfig) -> Self {
        crate::utils::logger::init(log::LevelFilter::Debug);
        let memory = Arc::new(PhysicalMemory::new(frames));
        let registry = CharDeviceRegistry::new();
        let devices = ScullDevices::init(&config, Arc::clone(&memory), &registry).unwrap();
        Self {
            memory,
            registry,
            devices,
        }
    }

    pub fn process(&self, pid: usize) -> Process {
        Process::new(ProcessId(pid), "test", Arc::clone(&self.memory))
    }

    /// Frames currently allocated from the pool
    pub fn used_frames(&self) -> usize {
        self.memory.get_stats().0
    }
}
