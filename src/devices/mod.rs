/*
 * Device Drivers
 *
 * Character device number registry and the drivers registered with it.
 */

pub mod chrdev;
pub mod scull;

pub use chrdev::{CharDevice, CharDeviceRegistry, ChrdevError, DevNo};
pub use scull::{ScullDevices, ScullError, ScullFile, ScullMapping};
