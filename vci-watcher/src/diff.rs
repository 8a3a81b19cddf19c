//! Identity-based comparison of two snapshots
//!
//! The watcher always publishes full snapshots. Consumers that want
//! add/remove/update events can derive them with [`SnapshotDiff::between`],
//! keyed by each device's object id.

use std::collections::{HashMap, HashSet};

use vci_device::{DeviceDescriptor, ObjectId};

use crate::snapshot::Snapshot;

/// Changes needed to go from one snapshot to another
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// Devices only present in the newer snapshot, in its order
    pub added: Vec<DeviceDescriptor>,
    /// Devices only present in the older snapshot, in its order
    pub removed: Vec<DeviceDescriptor>,
    /// `(old, new)` pairs whose attributes differ, in the newer snapshot's order
    pub changed: Vec<(DeviceDescriptor, DeviceDescriptor)>,
}

impl SnapshotDiff {
    pub fn between(previous: &Snapshot, current: &Snapshot) -> Self {
        let before: HashMap<ObjectId, &DeviceDescriptor> =
            previous.iter().map(|d| (d.id, d)).collect();
        let after: HashSet<ObjectId> = current.iter().map(|d| d.id).collect();

        let mut diff = SnapshotDiff::default();

        for device in current {
            match before.get(&device.id) {
                None => diff.added.push(device.clone()),
                Some(old) if *old != device => diff.changed.push(((*old).clone(), device.clone())),
                Some(_) => {}
            }
        }

        diff.removed = previous
            .iter()
            .filter(|d| !after.contains(&d.id))
            .cloned()
            .collect();

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}
