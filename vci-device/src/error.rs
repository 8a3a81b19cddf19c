//! Error types for device directory access.

use thiserror::Error;

use crate::descriptor::ObjectId;

/// Errors reported by a device directory, its handles or the host driver.
///
/// Values are cloneable so they can be stored inside snapshots and handed
/// to consumers on another thread.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The vendor driver rejected the request
    #[error("Driver error: {0}")]
    Driver(String),

    /// A single attribute could not be read from a device handle
    #[error("Failed to read attribute '{attribute}': {reason}")]
    AttributeRead {
        attribute: &'static str,
        reason: String,
    },

    /// The change signal could not be attached to the device list
    #[error("Failed to assign change signal: {0}")]
    SignalAssignment(String),

    /// Releasing a device handle failed
    #[error("Failed to release device {id}: {reason}")]
    Release { id: ObjectId, reason: String },

    /// The device disappeared while its handle was still in use
    #[error("Device {0} was removed")]
    DeviceRemoved(ObjectId),

    /// A version string could not be parsed
    #[error("Invalid version: {0}")]
    InvalidVersion(String),
}

impl DeviceError {
    /// Shorthand for an attribute read failure.
    pub fn attribute(attribute: &'static str, reason: impl Into<String>) -> Self {
        DeviceError::AttributeRead {
            attribute,
            reason: reason.into(),
        }
    }
}

/// Result type for device directory operations
pub type Result<T> = std::result::Result<T, DeviceError>;
