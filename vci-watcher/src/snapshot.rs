//! Immutable device set captured by one enumeration pass

use std::fmt::Display;
use std::time::SystemTime;

use serde::{Serialize, Serializer};
use vci_device::{DeviceDescriptor, DeviceError, ObjectId};

/// A device that was enumerated but whose descriptor could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionFailure {
    /// Position of the device in the driver's enumeration order
    pub position: usize,
    /// Object id, if the driver could still provide it
    pub id: Option<ObjectId>,
    #[serde(serialize_with = "serialize_display")]
    pub error: DeviceError,
}

/// The device set at one enumeration instant.
///
/// Snapshots are built completely before they are published and never change
/// afterwards. Devices appear in the driver's native enumeration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    sequence: u64,
    captured_at: SystemTime,
    devices: Vec<DeviceDescriptor>,
    failures: Vec<ExtractionFailure>,
}

impl Snapshot {
    pub fn new(sequence: u64, devices: Vec<DeviceDescriptor>) -> Self {
        Self::with_failures(sequence, devices, Vec::new())
    }

    pub(crate) fn with_failures(
        sequence: u64,
        devices: Vec<DeviceDescriptor>,
        failures: Vec<ExtractionFailure>,
    ) -> Self {
        Self {
            sequence,
            captured_at: SystemTime::now(),
            devices,
            failures,
        }
    }

    /// Strictly increasing per watcher, starting at 1
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    /// Devices skipped because their attributes could not be read
    pub fn failures(&self) -> &[ExtractionFailure] {
        &self.failures
    }

    /// `true` when every enumerated device made it into the snapshot
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DeviceDescriptor> {
        self.devices.iter()
    }

    pub fn get(&self, id: ObjectId) -> Option<&DeviceDescriptor> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn into_devices(self) -> Vec<DeviceDescriptor> {
        self.devices
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a DeviceDescriptor;
    type IntoIter = std::slice::Iter<'a, DeviceDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.iter()
    }
}

fn serialize_display<T: Display, S: Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vci_device::simulated::sample_device;

    #[test]
    fn test_empty_snapshot() {
        let snapshot = Snapshot::new(1, Vec::new());
        assert!(snapshot.is_empty());
        assert!(snapshot.is_complete());
        assert_eq!(snapshot.len(), 0);
        assert_eq!(snapshot.sequence(), 1);
    }

    #[test]
    fn test_lookup_by_id() {
        let snapshot = Snapshot::new(3, vec![sample_device(1), sample_device(2)]);
        assert_eq!(
            snapshot.get(ObjectId::new(1002)).map(|d| d.hardware_id.as_str()),
            Some("HW000002")
        );
        assert!(snapshot.get(ObjectId::new(7)).is_none());
        assert_eq!(snapshot.iter().count(), 2);
    }

    #[test]
    fn test_serializes_failures_as_text() {
        let snapshot = Snapshot::with_failures(
            2,
            vec![sample_device(0)],
            vec![ExtractionFailure {
                position: 1,
                id: Some(ObjectId::new(1001)),
                error: DeviceError::attribute("description", "timeout"),
            }],
        );

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["sequence"], 2);
        assert_eq!(json["devices"][0]["hardware_id"], "HW000000");
        assert_eq!(
            json["failures"][0]["error"],
            "Failed to read attribute 'description': timeout"
        );
        assert!(!snapshot.is_complete());
    }
}
