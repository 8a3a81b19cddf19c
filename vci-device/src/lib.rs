//! Device directory abstraction for VCI interface enumeration
//!
//! This crate describes what the device watcher needs from a host driver
//! runtime, without depending on any particular vendor binding:
//!
//! - [`HostPlatform`] opens a [`DeviceDirectory`] and reports the runtime version
//! - [`DeviceDirectory`] lists the attached devices and raises a
//!   [`ChangeSignal`] whenever that list changes
//! - [`DeviceHandle`] is a transient, exclusively owned reference to one
//!   device from which a [`DeviceDescriptor`] is read
//!
//! # Quick Start
//!
//! ```
//! use vci_device::simulated::{sample_device, SimulatedPlatform};
//! use vci_device::{DeviceDescriptor, DeviceDirectory, HostPlatform, Version};
//!
//! let platform = SimulatedPlatform::with_devices(Version::new(4, 0, 1), [sample_device(0)]);
//! let mut directory = platform.open_device_directory().unwrap();
//!
//! for mut handle in directory.enumerate().unwrap() {
//!     let descriptor = DeviceDescriptor::read_from(&*handle).unwrap();
//!     println!("{} {}", descriptor.id, descriptor.description);
//!     handle.release().unwrap();
//! }
//! ```

mod descriptor;
mod directory;
mod error;
mod signal;
pub mod simulated;

pub use descriptor::{DeviceClass, DeviceDescriptor, HardwareId, ObjectId, Version};
pub use directory::{DeviceDirectory, DeviceHandle, DeviceIter, HostPlatform};
pub use error::{DeviceError, Result};
pub use signal::{ChangeSignal, WaitOutcome};
