//! Traits implemented by the host driver binding.
//!
//! The watcher never talks to a vendor driver directly. It receives a
//! [`DeviceDirectory`] (usually opened through a [`HostPlatform`]) and only
//! ever sees devices as transient [`DeviceHandle`]s.

use crate::descriptor::{DeviceClass, HardwareId, ObjectId, Version};
use crate::error::Result;
use crate::signal::ChangeSignal;

/// Lazily acquiring iterator over the devices currently present.
///
/// Each call to `next()` acquires one handle from the driver. Handles not yet
/// yielded are not acquired, so dropping the iterator early leaks nothing.
pub type DeviceIter<'a> = Box<dyn Iterator<Item = Box<dyn DeviceHandle>> + 'a>;

/// A live reference to one enumerated device.
///
/// Handles pin driver resources until [`release`](DeviceHandle::release) is
/// called. Callers must release every handle exactly once.
pub trait DeviceHandle: Send {
    fn object_id(&self) -> Result<ObjectId>;

    fn driver_version(&self) -> Result<Version>;

    fn hardware_version(&self) -> Result<Version>;

    fn device_class(&self) -> Result<DeviceClass>;

    fn hardware_id(&self) -> Result<HardwareId>;

    fn description(&self) -> Result<String>;

    fn manufacturer(&self) -> Result<String>;

    /// Give the handle back to the driver.
    fn release(&mut self) -> Result<()>;
}

/// The driver's collection of attached devices.
pub trait DeviceDirectory: Send {
    /// Attach `signal` so it is raised whenever the collection changes.
    fn assign_change_signal(&mut self, signal: ChangeSignal) -> Result<()>;

    /// Start a pass over the current collection in driver order.
    fn enumerate(&mut self) -> Result<DeviceIter<'_>>;
}

/// Entry point of a host driver runtime.
pub trait HostPlatform {
    type Directory: DeviceDirectory + 'static;

    fn open_device_directory(&self) -> Result<Self::Directory>;

    /// Version of the installed driver runtime.
    fn runtime_version(&self) -> Result<Version>;
}

impl<D: DeviceDirectory + ?Sized> DeviceDirectory for Box<D> {
    fn assign_change_signal(&mut self, signal: ChangeSignal) -> Result<()> {
        (**self).assign_change_signal(signal)
    }

    fn enumerate(&mut self) -> Result<DeviceIter<'_>> {
        (**self).enumerate()
    }
}
