//! In-memory driver used by tests and demos.
//!
//! [`SimulatedPlatform`] behaves like a vendor runtime with a bus that devices
//! can be plugged into and out of. Every mutation raises the change signals
//! assigned by open directories. Faults can be injected per device or per
//! enumeration, and handle bookkeeping is exposed so callers can verify that
//! every acquired handle was released.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::descriptor::{DeviceClass, DeviceDescriptor, HardwareId, ObjectId, Version};
use crate::directory::{DeviceDirectory, DeviceHandle, DeviceIter, HostPlatform};
use crate::error::{DeviceError, Result};
use crate::signal::ChangeSignal;

#[derive(Debug, Clone)]
struct SimulatedDevice {
    descriptor: DeviceDescriptor,
    faulty: bool,
    failing_release: bool,
}

impl SimulatedDevice {
    fn new(descriptor: DeviceDescriptor) -> Self {
        Self {
            descriptor,
            faulty: false,
            failing_release: false,
        }
    }
}

#[derive(Debug, Default)]
struct Bus {
    devices: Vec<SimulatedDevice>,
    signals: Vec<(u64, ChangeSignal)>,
    next_directory_id: u64,
    open_directories: usize,
    pending_enumeration_fault: Option<DeviceError>,
    reject_signal_assignment: bool,
    enumerations: u64,
    handles_acquired: u64,
    handles_released: u64,
}

impl Bus {
    fn notify(&self) {
        for (_, signal) in &self.signals {
            signal.raise();
        }
    }

    fn device_mut(&mut self, id: ObjectId) -> Option<&mut SimulatedDevice> {
        self.devices.iter_mut().find(|d| d.descriptor.id == id)
    }
}

/// Simulated driver runtime.
///
/// Cloning yields another handle to the same bus.
#[derive(Debug, Clone)]
pub struct SimulatedPlatform {
    bus: Arc<Mutex<Bus>>,
    version: Version,
}

impl SimulatedPlatform {
    pub fn new(version: Version) -> Self {
        Self {
            bus: Arc::new(Mutex::new(Bus::default())),
            version,
        }
    }

    /// Create a platform with `devices` already attached.
    pub fn with_devices(
        version: Version,
        devices: impl IntoIterator<Item = DeviceDescriptor>,
    ) -> Self {
        let platform = Self::new(version);
        platform.bus.lock().devices = devices.into_iter().map(SimulatedDevice::new).collect();
        platform
    }

    /// Plug in a device, replacing any attached device with the same id.
    pub fn attach(&self, descriptor: DeviceDescriptor) {
        let mut bus = self.bus.lock();
        tracing::trace!("Simulated attach of device {}", descriptor.id);
        match bus.device_mut(descriptor.id) {
            Some(existing) => existing.descriptor = descriptor,
            None => bus.devices.push(SimulatedDevice::new(descriptor)),
        }
        bus.notify();
    }

    /// Unplug a device. Returns `false` if it was not attached.
    pub fn detach(&self, id: ObjectId) -> bool {
        let mut bus = self.bus.lock();
        let before = bus.devices.len();
        bus.devices.retain(|d| d.descriptor.id != id);
        let removed = bus.devices.len() != before;
        if removed {
            tracing::trace!("Simulated detach of device {}", id);
            bus.notify();
        }
        removed
    }

    /// Raise the change signals without touching the bus.
    pub fn notify_change(&self) {
        self.bus.lock().notify();
    }

    /// Make attribute reads of device `id` fail.
    pub fn set_faulty(&self, id: ObjectId, faulty: bool) -> bool {
        match self.bus.lock().device_mut(id) {
            Some(device) => {
                device.faulty = faulty;
                true
            }
            None => false,
        }
    }

    /// Make releasing handles of device `id` report an error.
    pub fn set_release_failure(&self, id: ObjectId, failing: bool) -> bool {
        match self.bus.lock().device_mut(id) {
            Some(device) => {
                device.failing_release = failing;
                true
            }
            None => false,
        }
    }

    /// Fail the next call to `enumerate` on any directory with `error`.
    pub fn fail_next_enumeration(&self, error: DeviceError) {
        self.bus.lock().pending_enumeration_fault = Some(error);
    }

    /// Make `assign_change_signal` fail on every directory.
    pub fn reject_signal_assignment(&self, reject: bool) {
        self.bus.lock().reject_signal_assignment = reject;
    }

    /// Descriptors of the attached devices in bus order.
    pub fn devices(&self) -> Vec<DeviceDescriptor> {
        self.bus
            .lock()
            .devices
            .iter()
            .map(|d| d.descriptor.clone())
            .collect()
    }

    pub fn enumerations(&self) -> u64 {
        self.bus.lock().enumerations
    }

    pub fn handles_acquired(&self) -> u64 {
        self.bus.lock().handles_acquired
    }

    pub fn handles_released(&self) -> u64 {
        self.bus.lock().handles_released
    }

    /// Handles acquired but not yet released.
    pub fn outstanding_handles(&self) -> u64 {
        let bus = self.bus.lock();
        bus.handles_acquired - bus.handles_released
    }

    /// Directories opened and not yet dropped.
    pub fn open_directories(&self) -> usize {
        self.bus.lock().open_directories
    }
}

impl HostPlatform for SimulatedPlatform {
    type Directory = SimulatedDirectory;

    fn open_device_directory(&self) -> Result<SimulatedDirectory> {
        let mut bus = self.bus.lock();
        let id = bus.next_directory_id;
        bus.next_directory_id += 1;
        bus.open_directories += 1;

        Ok(SimulatedDirectory {
            bus: Arc::clone(&self.bus),
            id,
        })
    }

    fn runtime_version(&self) -> Result<Version> {
        Ok(self.version)
    }
}

/// Device list opened on a [`SimulatedPlatform`].
#[derive(Debug)]
pub struct SimulatedDirectory {
    bus: Arc<Mutex<Bus>>,
    id: u64,
}

impl DeviceDirectory for SimulatedDirectory {
    fn assign_change_signal(&mut self, signal: ChangeSignal) -> Result<()> {
        let mut bus = self.bus.lock();
        if bus.reject_signal_assignment {
            return Err(DeviceError::SignalAssignment(
                "driver rejected the change event".to_string(),
            ));
        }
        bus.signals.retain(|(owner, _)| *owner != self.id);
        bus.signals.push((self.id, signal));
        Ok(())
    }

    fn enumerate(&mut self) -> Result<DeviceIter<'_>> {
        let mut bus = self.bus.lock();
        if let Some(error) = bus.pending_enumeration_fault.take() {
            return Err(error);
        }
        bus.enumerations += 1;

        let pending = bus.devices.clone();
        Ok(Box::new(SimulatedDeviceIter {
            bus: Arc::clone(&self.bus),
            pending: pending.into_iter(),
        }))
    }
}

impl Drop for SimulatedDirectory {
    fn drop(&mut self) {
        let mut bus = self.bus.lock();
        bus.signals.retain(|(owner, _)| *owner != self.id);
        bus.open_directories = bus.open_directories.saturating_sub(1);
    }
}

struct SimulatedDeviceIter {
    bus: Arc<Mutex<Bus>>,
    pending: std::vec::IntoIter<SimulatedDevice>,
}

impl Iterator for SimulatedDeviceIter {
    type Item = Box<dyn DeviceHandle>;

    fn next(&mut self) -> Option<Self::Item> {
        let device = self.pending.next()?;
        self.bus.lock().handles_acquired += 1;

        Some(Box::new(SimulatedHandle {
            bus: Arc::clone(&self.bus),
            device,
            released: false,
        }))
    }
}

struct SimulatedHandle {
    bus: Arc<Mutex<Bus>>,
    device: SimulatedDevice,
    released: bool,
}

impl SimulatedHandle {
    fn check(&self, attribute: &'static str) -> Result<()> {
        if self.released {
            return Err(DeviceError::attribute(attribute, "handle already released"));
        }
        if self.device.faulty {
            return Err(DeviceError::attribute(attribute, "device not responding"));
        }

        let id = self.device.descriptor.id;
        if !self.bus.lock().devices.iter().any(|d| d.descriptor.id == id) {
            return Err(DeviceError::DeviceRemoved(id));
        }
        Ok(())
    }
}

impl DeviceHandle for SimulatedHandle {
    fn object_id(&self) -> Result<ObjectId> {
        // The id comes from the enumerator, not the device, so it stays readable.
        Ok(self.device.descriptor.id)
    }

    fn driver_version(&self) -> Result<Version> {
        self.check("driver_version")?;
        Ok(self.device.descriptor.driver_version)
    }

    fn hardware_version(&self) -> Result<Version> {
        self.check("hardware_version")?;
        Ok(self.device.descriptor.hardware_version)
    }

    fn device_class(&self) -> Result<DeviceClass> {
        self.check("device_class")?;
        Ok(self.device.descriptor.device_class.clone())
    }

    fn hardware_id(&self) -> Result<HardwareId> {
        self.check("hardware_id")?;
        Ok(self.device.descriptor.hardware_id.clone())
    }

    fn description(&self) -> Result<String> {
        self.check("description")?;
        Ok(self.device.descriptor.description.clone())
    }

    fn manufacturer(&self) -> Result<String> {
        self.check("manufacturer")?;
        Ok(self.device.descriptor.manufacturer.clone())
    }

    fn release(&mut self) -> Result<()> {
        let id = self.device.descriptor.id;
        if self.released {
            return Err(DeviceError::Release {
                id,
                reason: "handle already released".to_string(),
            });
        }

        self.released = true;
        self.bus.lock().handles_released += 1;

        if self.device.failing_release {
            return Err(DeviceError::Release {
                id,
                reason: "driver refused to release the handle".to_string(),
            });
        }
        Ok(())
    }
}

/// A plausible USB-to-CAN interface descriptor, numbered by `index`.
pub fn sample_device(index: u64) -> DeviceDescriptor {
    DeviceDescriptor {
        id: ObjectId::new(1000 + index),
        driver_version: Version::new(4, 0, 1),
        hardware_version: Version::new(2, 0, 0),
        device_class: if index % 2 == 0 {
            DeviceClass::Can
        } else {
            DeviceClass::CanFd
        },
        hardware_id: HardwareId::new(format!("HW{:06}", index)),
        description: format!("USB-to-CAN interface #{}", index),
        manufacturer: "IXXAT Automation GmbH".to_string(),
    }
}
