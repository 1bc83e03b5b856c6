/*
 * Character Device Registry
 *
 * Device numbers and the table that routes an open of a device number to
 * the driver owning it.
 *
 * Two steps, as drivers expect:
 * 1. Reserve a region of numbers, either at a fixed major
 *    (`register_region`) or at a free dynamic one (`alloc_region`)
 * 2. Attach a driver to (part of) a reserved region (`add`); from then on
 *    `open` on those numbers reaches the driver
 *
 * Dynamic majors are handed out from 254 downwards.
 */

use crate::io::{Errno, File};
use crate::sync::SignalState;
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

const MINOR_BITS: u32 = 20;
const MINOR_MASK: u32 = (1 << MINOR_BITS) - 1;

/// Largest major number (12 bits)
pub const MAX_MAJOR: u32 = (1 << 12) - 1;
/// First major tried by dynamic allocation
const DYNAMIC_MAJOR_START: u32 = 254;

/// Device number: 12-bit major, 20-bit minor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DevNo(u32);

impl DevNo {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self((major << MINOR_BITS) | (minor & MINOR_MASK))
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn major(self) -> u32 {
        self.0 >> MINOR_BITS
    }

    pub const fn minor(self) -> u32 {
        self.0 & MINOR_MASK
    }

    /// Whether `other` falls in `[self, self + count)`
    fn covers(self, count: u32, other: DevNo) -> bool {
        other.0 >= self.0 && other.0 - self.0 < count
    }
}

impl core::fmt::Display for DevNo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.major(), self.minor())
    }
}

/// Registry errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChrdevError {
    /// Range intersects a region or driver that is already registered
    Busy,
    /// No free dynamic major left
    NoMajor,
    /// Range is not (completely) registered
    NotRegistered,
    /// No driver attached to the device number
    NoDevice,
    /// Empty range, or one that runs past the minor space
    InvalidRange,
}

impl core::fmt::Display for ChrdevError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ChrdevError::Busy => write!(f, "Device numbers already in use"),
            ChrdevError::NoMajor => write!(f, "No free major number"),
            ChrdevError::NotRegistered => write!(f, "Device numbers not registered"),
            ChrdevError::NoDevice => write!(f, "No driver for device number"),
            ChrdevError::InvalidRange => write!(f, "Invalid device number range"),
        }
    }
}

impl From<ChrdevError> for Errno {
    fn from(err: ChrdevError) -> Self {
        match err {
            ChrdevError::Busy => Errno::EBUSY,
            ChrdevError::NoMajor => Errno::EBUSY,
            ChrdevError::NotRegistered | ChrdevError::InvalidRange => Errno::EINVAL,
            ChrdevError::NoDevice => Errno::ENXIO,
        }
    }
}

/// A driver that can open sessions on its minors
pub trait CharDevice: Send + Sync {
    /// Open the `index`-th device of the driver's range
    ///
    /// `signals` is the opening task's signal state; blocking operations on
    /// the returned file give up when it becomes pending.
    fn open(&self, index: usize, signals: Arc<SignalState>) -> Result<Box<dyn File>, Errno>;

    fn name(&self) -> &str;
}

struct Region {
    first: DevNo,
    count: u32,
    name: &'static str,
}

struct Cdev {
    first: DevNo,
    count: u32,
    device: Arc<dyn CharDevice>,
}

fn ranges_overlap(a: DevNo, a_count: u32, b: DevNo, b_count: u32) -> bool {
    (a.0 as u64) < b.0 as u64 + b_count as u64 && (b.0 as u64) < a.0 as u64 + a_count as u64
}

#[derive(Default)]
struct RegistryInner {
    regions: Vec<Region>,
    cdevs: Vec<Cdev>,
}

/// Table of registered device number regions and attached drivers
#[derive(Default)]
pub struct CharDeviceRegistry {
    inner: Mutex<RegistryInner>,
}

impl CharDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `count` numbers starting at `first`
    pub fn register_region(&self, first: DevNo, count: u32, name: &'static str) -> Result<(), ChrdevError> {
        check_range(first, count)?;
        let mut inner = self.inner.lock();
        if inner
            .regions
            .iter()
            .any(|r| ranges_overlap(r.first, r.count, first, count))
        {
            log::warn!("{}: region {}+{} is busy", name, first, count);
            return Err(ChrdevError::Busy);
        }

        inner.regions.push(Region { first, count, name });
        log::info!("{}: registered region {}+{}", name, first, count);
        Ok(())
    }

    /// Reserve `count` numbers at a free major
    ///
    /// Returns the first device number of the region.
    pub fn alloc_region(&self, first_minor: u32, count: u32, name: &'static str) -> Result<DevNo, ChrdevError> {
        let mut inner = self.inner.lock();
        let major = (1..=DYNAMIC_MAJOR_START)
            .rev()
            .find(|&m| inner.regions.iter().all(|r| r.first.major() != m))
            .ok_or(ChrdevError::NoMajor)?;

        let first = DevNo::new(major, first_minor);
        check_range(first, count)?;
        inner.regions.push(Region { first, count, name });
        log::info!("{}: allocated region {}+{}", name, first, count);
        Ok(first)
    }

    /// Release a region reserved by `register_region` or `alloc_region`
    pub fn unregister_region(&self, first: DevNo, count: u32) -> Result<(), ChrdevError> {
        let mut inner = self.inner.lock();
        let pos = inner
            .regions
            .iter()
            .position(|r| r.first == first && r.count == count)
            .ok_or(ChrdevError::NotRegistered)?;
        let region = inner.regions.remove(pos);
        log::info!("{}: unregistered region {}+{}", region.name, first, count);
        Ok(())
    }

    /// Attach a driver to `count` numbers starting at `first`
    ///
    /// The numbers must lie inside one registered region.
    pub fn add(&self, first: DevNo, count: u32, device: Arc<dyn CharDevice>) -> Result<(), ChrdevError> {
        check_range(first, count)?;
        let mut inner = self.inner.lock();
        let last = DevNo(first.0 + (count - 1));
        if !inner
            .regions
            .iter()
            .any(|r| r.first.covers(r.count, first) && r.first.covers(r.count, last))
        {
            return Err(ChrdevError::NotRegistered);
        }
        if inner
            .cdevs
            .iter()
            .any(|c| ranges_overlap(c.first, c.count, first, count))
        {
            return Err(ChrdevError::Busy);
        }

        log::debug!("{}: attached to {}+{}", device.name(), first, count);
        inner.cdevs.push(Cdev { first, count, device });
        Ok(())
    }

    /// Detach the driver attached at `first`
    ///
    /// Files already open on it keep working; new opens fail.
    pub fn del(&self, first: DevNo, count: u32) -> Result<Arc<dyn CharDevice>, ChrdevError> {
        let mut inner = self.inner.lock();
        let pos = inner
            .cdevs
            .iter()
            .position(|c| c.first == first && c.count == count)
            .ok_or(ChrdevError::NotRegistered)?;
        Ok(inner.cdevs.remove(pos).device)
    }

    /// Open the device behind `devno`
    pub fn open(&self, devno: DevNo, signals: Arc<SignalState>) -> Result<Box<dyn File>, Errno> {
        // Release the table before calling into the driver
        let (device, index) = {
            let inner = self.inner.lock();
            let cdev = inner
                .cdevs
                .iter()
                .find(|c| c.first.covers(c.count, devno))
                .ok_or(ChrdevError::NoDevice)?;
            (Arc::clone(&cdev.device), (devno.0 - cdev.first.0) as usize)
        };

        device.open(index, signals)
    }

    /// Whether any region uses `major`
    pub fn major_in_use(&self, major: u32) -> bool {
        self.inner.lock().regions.iter().any(|r| r.first.major() == major)
    }
}

fn check_range(first: DevNo, count: u32) -> Result<(), ChrdevError> {
    if count == 0 || first.major() > MAX_MAJOR || first.minor() as u64 + count as u64 > MINOR_MASK as u64 + 1 {
        return Err(ChrdevError::InvalidRange);
    }
    Ok(())
}
