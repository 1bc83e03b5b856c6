/*
 * Scull Shared-Page Device
 *
 * A character device whose instances each hold one page of memory shared
 * by every task that opens them:
 *
 * - read copies a bounded range of the page out to the caller
 * - write replaces the whole content with a freshly allocated page
 * - mmap maps the page that is current at mmap time into the caller's
 *   address space for zero-copy access
 *
 * Locking:
 * ========
 *
 * Each instance has one interruptible mutex guarding its page and size.
 * Read, write and the page lookup done by mmap all hold it; accesses
 * through an established mapping do not, they go straight to the pinned
 * page. Instances never share locks.
 *
 * Page lifetime:
 * ==============
 *
 * Pages are reference counted. A write drops the instance's reference to
 * the old page; if a mapping still pins that page it lives on, unchanged,
 * until the last mapping is torn down.
 */

pub mod mmap;
pub mod session;

pub use mmap::ScullMapping;
pub use session::ScullFile;

use crate::config::ScullConfig;
use crate::devices::chrdev::{CharDevice, CharDeviceRegistry, DevNo};
use crate::io::uaccess::TransferFault;
use crate::io::{Errno, File};
use crate::memory::{PageRef, PhysicalMemory};
use crate::sync::{InterruptibleMutex, Interrupted, SignalState};
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::MutexGuard;

/// Device name used for the number region
pub const SCULL_NAME: &str = "scull";

/// Scull operation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScullError {
    /// Lock wait cancelled by a pending signal; nothing was touched
    Interrupted,
    /// Copy to or from the caller failed; device state unchanged
    TransferFault,
    /// No page available; nothing published
    OutOfMemory,
    /// Payload or mapping larger than one page
    InvalidLength,
    /// Index does not name an instance
    NoSuchInstance,
    /// Mapping flags or offset not supported
    InvalidMapping,
    /// Seek to a negative position, or unknown whence
    InvalidSeek,
}

impl core::fmt::Display for ScullError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ScullError::Interrupted => write!(f, "Interrupted"),
            ScullError::TransferFault => write!(f, "Bad user buffer"),
            ScullError::OutOfMemory => write!(f, "Out of memory"),
            ScullError::InvalidLength => write!(f, "Length exceeds one page"),
            ScullError::NoSuchInstance => write!(f, "No such device instance"),
            ScullError::InvalidMapping => write!(f, "Unsupported mapping"),
            ScullError::InvalidSeek => write!(f, "Invalid seek"),
        }
    }
}

impl From<Interrupted> for ScullError {
    fn from(_: Interrupted) -> Self {
        ScullError::Interrupted
    }
}

impl From<TransferFault> for ScullError {
    fn from(_: TransferFault) -> Self {
        ScullError::TransferFault
    }
}

impl From<ScullError> for Errno {
    fn from(err: ScullError) -> Self {
        match err {
            ScullError::Interrupted => Errno::EINTR,
            ScullError::TransferFault => Errno::EFAULT,
            ScullError::OutOfMemory => Errno::ENOMEM,
            ScullError::InvalidLength => Errno::EINVAL,
            ScullError::NoSuchInstance => Errno::ENODEV,
            ScullError::InvalidMapping => Errno::EINVAL,
            ScullError::InvalidSeek => Errno::EINVAL,
        }
    }
}

/// Page and valid length of one instance
///
/// Only reachable through the instance lock.
#[derive(Debug, Default)]
pub struct ScullBuffer {
    /// Current page; None until the first write (or mmap)
    pub page: Option<PageRef>,
    /// Valid bytes in `page`, at most PAGE_SIZE
    pub size: usize,
}

/// One device instance
pub struct ScullDev {
    index: usize,
    devno: DevNo,
    buffer: InterruptibleMutex<ScullBuffer>,
    memory: Arc<PhysicalMemory>,
}

impl ScullDev {
    fn new(index: usize, devno: DevNo, memory: Arc<PhysicalMemory>) -> Self {
        Self {
            index,
            devno,
            buffer: InterruptibleMutex::new(ScullBuffer::default()),
            memory,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn devno(&self) -> DevNo {
        self.devno
    }

    /// Take the instance lock on behalf of a task
    pub fn acquire(&self, signals: &SignalState) -> Result<MutexGuard<'_, ScullBuffer>, ScullError> {
        Ok(self.buffer.lock_interruptible(signals)?)
    }

    pub fn is_locked(&self) -> bool {
        self.buffer.is_locked()
    }

    pub(crate) fn memory(&self) -> &Arc<PhysicalMemory> {
        &self.memory
    }

    /// Drop the current page (teardown)
    fn release(&self) {
        let mut buffer = self.buffer.lock();
        if let Some(page) = buffer.page.take() {
            if page.is_pinned() {
                log::debug!("scull{}: {:?} outlives the device", self.index, page);
            }
        }
        buffer.size = 0;
    }
}

/// The set of scull instances created at init time
pub struct ScullDevices {
    devices: Vec<Arc<ScullDev>>,
    first: DevNo,
}

impl ScullDevices {
    /// Create the instances without registering any device numbers
    pub fn new(config: &ScullConfig, memory: Arc<PhysicalMemory>) -> Self {
        let first = DevNo::new(config.major, config.minor);
        Self::with_first(first, config.nr_devs, memory)
    }

    fn with_first(first: DevNo, nr_devs: usize, memory: Arc<PhysicalMemory>) -> Self {
        let devices = (0..nr_devs)
            .map(|i| {
                let devno = DevNo::new(first.major(), first.minor() + i as u32);
                Arc::new(ScullDev::new(i, devno, Arc::clone(&memory)))
            })
            .collect();
        Self { devices, first }
    }

    /// Register the device numbers and attach the instances
    ///
    /// Uses `config.major` when it is non-zero, a dynamic major otherwise.
    pub fn init(
        config: &ScullConfig,
        memory: Arc<PhysicalMemory>,
        registry: &CharDeviceRegistry,
    ) -> Result<Arc<Self>, Errno> {
        config.validate()?;
        let count = config.nr_devs as u32;

        let first = if config.is_dynamic() {
            registry.alloc_region(config.minor, count, SCULL_NAME)?
        } else {
            let first = DevNo::new(config.major, config.minor);
            registry.register_region(first, count, SCULL_NAME)?;
            first
        };

        let devices = Arc::new(Self::with_first(first, config.nr_devs, memory));
        if let Err(e) = registry.add(first, count, devices.clone()) {
            log::warn!("scull: can't attach to {}: {}", first, e);
            if let Err(undo) = registry.unregister_region(first, count) {
                log::warn!("scull: unregister {}: {}", first, undo);
            }
            return Err(e.into());
        }

        log::info!("scull: {} devices at major {}", config.nr_devs, first.major());
        Ok(devices)
    }

    /// Detach from the registry, release the numbers and drop every page
    ///
    /// Pages still pinned by mappings are reclaimed when those go away.
    pub fn cleanup(&self, registry: &CharDeviceRegistry) {
        let count = self.devices.len() as u32;
        if let Err(e) = registry.del(self.first, count) {
            log::warn!("scull: detach {}: {}", self.first, e);
        }
        if let Err(e) = registry.unregister_region(self.first, count) {
            log::warn!("scull: unregister {}: {}", self.first, e);
        }
        for dev in &self.devices {
            dev.release();
        }
        log::info!("scull: unloaded");
    }

    /// Open a session on instance `index` for a task without signals
    pub fn open(&self, index: usize) -> Result<ScullFile, ScullError> {
        self.open_with_signals(index, Arc::new(SignalState::new()))
    }

    /// Open a session on instance `index`
    ///
    /// Lock waits of the session give up when `signals` becomes pending.
    pub fn open_with_signals(&self, index: usize, signals: Arc<SignalState>) -> Result<ScullFile, ScullError> {
        let dev = self.get(index).ok_or(ScullError::NoSuchInstance)?;
        Ok(ScullFile::new(Arc::clone(dev), signals))
    }

    pub fn get(&self, index: usize) -> Option<&Arc<ScullDev>> {
        self.devices.get(index)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn first_devno(&self) -> DevNo {
        self.first
    }
}

impl CharDevice for ScullDevices {
    fn open(&self, index: usize, signals: Arc<SignalState>) -> Result<Box<dyn File>, Errno> {
        let file = self.open_with_signals(index, signals)?;
        Ok(Box::new(file))
    }

    fn name(&self) -> &str {
        SCULL_NAME
    }
}
