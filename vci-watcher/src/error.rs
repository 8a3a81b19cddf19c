//! Error types for vci-watcher

use thiserror::Error;
use vci_device::{DeviceError, ObjectId};

/// Errors raised while starting or running a [`ChangeWatcher`](crate::ChangeWatcher).
///
/// Only [`DirectoryOpen`](WatchError::DirectoryOpen),
/// [`SignalRegistration`](WatchError::SignalRegistration),
/// [`InvalidConfig`](WatchError::InvalidConfig) and
/// [`WorkerSpawn`](WatchError::WorkerSpawn) are returned to the caller of
/// `start`. Everything else happens on the watch thread and reaches the
/// consumer through `on_enumeration_error`, a snapshot's failure list, or the
/// log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    /// The host platform could not open its device directory
    #[error("Failed to open device directory: {0}")]
    DirectoryOpen(#[source] DeviceError),

    /// The change signal could not be attached to the directory
    #[error("Failed to register change signal: {0}")]
    SignalRegistration(#[source] DeviceError),

    /// A whole enumeration pass failed
    #[error("Device enumeration failed: {0}")]
    Enumeration(#[source] DeviceError),

    /// Attributes of one device could not be read; the device was skipped
    #[error("Failed to read descriptor of device at position {position}: {source}")]
    DescriptorExtraction {
        position: usize,
        #[source]
        source: DeviceError,
    },

    /// A device handle could not be released
    #[error("Failed to release handle of device {id:?}: {source}")]
    HandleRelease {
        id: Option<ObjectId>,
        #[source]
        source: DeviceError,
    },

    /// The watcher configuration is unusable
    #[error("Invalid watcher configuration: {0}")]
    InvalidConfig(String),

    /// The watch thread could not be spawned
    #[error("Failed to spawn watch thread: {0}")]
    WorkerSpawn(String),

    /// A cycle panicked inside the driver or a consumer callback; the
    /// watcher kept running
    #[error("Enumeration cycle panicked: {0}")]
    CyclePanicked(String),

    /// The watch thread panicked
    #[error("Watch thread panicked")]
    WorkerPanicked,
}

/// Result type for vci-watcher operations
pub type Result<T> = std::result::Result<T, WatchError>;
