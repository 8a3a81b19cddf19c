//! Snapshot construction from a live device directory
//!
//! Every handle the directory yields is wrapped in a [`ScopedHandle`], which
//! releases it exactly once: explicitly after its descriptor was read, or on
//! drop if extraction bailed out early.

use vci_device::{DeviceDescriptor, DeviceDirectory, DeviceError, DeviceHandle, ObjectId};

use crate::error::{Result, WatchError};
use crate::snapshot::{ExtractionFailure, Snapshot};

/// Owns one device handle for the duration of its descriptor extraction.
struct ScopedHandle {
    handle: Option<Box<dyn DeviceHandle>>,
    position: usize,
}

impl ScopedHandle {
    fn new(handle: Box<dyn DeviceHandle>, position: usize) -> Self {
        Self {
            handle: Some(handle),
            position,
        }
    }

    /// On failure also returns the object id, if it is still readable.
    fn read_descriptor(
        &self,
    ) -> std::result::Result<DeviceDescriptor, (Option<ObjectId>, DeviceError)> {
        let Some(handle) = self.handle.as_deref() else {
            return Err((None, DeviceError::attribute("object_id", "handle already released")));
        };

        DeviceDescriptor::read_from(handle).map_err(|error| (handle.object_id().ok(), error))
    }

    fn release(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => release_handle(handle),
            None => Ok(()),
        }
    }
}

impl Drop for ScopedHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::debug!("Releasing handle at position {} on unwind", self.position);
            if let Err(e) = release_handle(handle) {
                tracing::warn!("{}", e);
            }
        }
    }
}

fn release_handle(mut handle: Box<dyn DeviceHandle>) -> Result<()> {
    handle.release().map_err(|source| WatchError::HandleRelease {
        id: handle.object_id().ok(),
        source,
    })
}

/// Converts the devices currently present into a [`Snapshot`].
#[derive(Debug)]
pub struct SnapshotBuilder {
    next_sequence: u64,
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self { next_sequence: 1 }
    }

    /// Sequence number the next successful build will carry
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Enumerate `directory` once and collect every readable descriptor.
    ///
    /// A device whose attributes cannot be read is skipped and recorded in
    /// [`Snapshot::failures`]; the rest of the pass continues. Release
    /// failures are logged and never stop the pass. Only a failure of the
    /// enumeration itself aborts the build.
    pub fn build<D>(&mut self, directory: &mut D) -> Result<Snapshot>
    where
        D: DeviceDirectory + ?Sized,
    {
        let handles = directory.enumerate().map_err(WatchError::Enumeration)?;

        let mut devices = Vec::new();
        let mut failures = Vec::new();

        for (position, handle) in handles.enumerate() {
            let scoped = ScopedHandle::new(handle, position);

            match scoped.read_descriptor() {
                Ok(descriptor) => {
                    tracing::trace!(
                        "Read descriptor of device {} at position {}",
                        descriptor.id,
                        position
                    );
                    devices.push(descriptor);
                }
                Err((id, error)) => {
                    tracing::warn!(
                        "{}",
                        WatchError::DescriptorExtraction {
                            position,
                            source: error.clone(),
                        }
                    );
                    failures.push(ExtractionFailure {
                        position,
                        id,
                        error,
                    });
                }
            }

            if let Err(e) = scoped.release() {
                tracing::warn!("{}", e);
            }
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        tracing::debug!(
            "Built snapshot #{} with {} devices ({} skipped)",
            sequence,
            devices.len(),
            failures.len()
        );

        Ok(Snapshot::with_failures(sequence, devices, failures))
    }
}
