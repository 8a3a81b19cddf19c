//! Device identity and capability attributes.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::directory::DeviceHandle;
use crate::error::{DeviceError, Result};

/// Driver-assigned object identifier of a device.
///
/// Stable across enumerations for the same physical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObjectId(pub u64);

impl ObjectId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Vendor-assigned unique hardware identifier (serial number style).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct HardwareId(String);

impl HardwareId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HardwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Driver or hardware revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = DeviceError;

    /// Parses `major.minor` or `major.minor.patch`.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(DeviceError::InvalidVersion(s.to_string()));
        }

        let mut numbers = [0u32; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| DeviceError::InvalidVersion(s.to_string()))?;
        }

        Ok(Version::new(numbers[0], numbers[1], numbers[2]))
    }
}

/// Bus interface type of a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum DeviceClass {
    Can,
    CanFd,
    Lin,
    /// Any class the driver reports that is not modelled explicitly
    Other(String),
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Can => write!(f, "CAN"),
            DeviceClass::CanFd => write!(f, "CAN FD"),
            DeviceClass::Lin => write!(f, "LIN"),
            DeviceClass::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Immutable attribute record of one enumerated device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceDescriptor {
    pub id: ObjectId,
    pub driver_version: Version,
    pub hardware_version: Version,
    pub device_class: DeviceClass,
    pub hardware_id: HardwareId,
    pub description: String,
    pub manufacturer: String,
}

impl DeviceDescriptor {
    /// Reads every attribute of `handle` once.
    ///
    /// Fails on the first attribute the driver cannot provide; the handle
    /// itself is left untouched and must still be released by the caller.
    pub fn read_from(handle: &dyn DeviceHandle) -> Result<Self> {
        Ok(Self {
            id: handle.object_id()?,
            driver_version: handle.driver_version()?,
            hardware_version: handle.hardware_version()?,
            device_class: handle.device_class()?,
            hardware_id: handle.hardware_id()?,
            description: handle.description()?,
            manufacturer: handle.manufacturer()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("4.0.1", Version::new(4, 0, 1))]
    #[case("1.2", Version::new(1, 2, 0))]
    #[case(" 10.20.30 ", Version::new(10, 20, 30))]
    fn test_version_parse(#[case] input: &str, #[case] expected: Version) {
        assert_eq!(input.parse::<Version>().unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("4")]
    #[case("1.2.3.4")]
    #[case("a.b")]
    #[case("1.-2")]
    fn test_version_parse_rejects(#[case] input: &str) {
        assert!(matches!(
            input.parse::<Version>(),
            Err(DeviceError::InvalidVersion(_))
        ));
    }

    #[test]
    fn test_version_ordering() {
        assert!(Version::new(1, 10, 0) > Version::new(1, 9, 9));
        assert!(Version::new(2, 0, 0) > Version::new(1, 99, 99));
        assert_eq!(Version::new(3, 1, 4).to_string(), "3.1.4");
    }

    #[test]
    fn test_device_class_display() {
        assert_eq!(DeviceClass::Can.to_string(), "CAN");
        assert_eq!(DeviceClass::CanFd.to_string(), "CAN FD");
        assert_eq!(DeviceClass::Lin.to_string(), "LIN");
        assert_eq!(
            DeviceClass::Other("FlexRay".to_string()).to_string(),
            "FlexRay"
        );
    }

    #[test]
    fn test_object_id_display() {
        assert_eq!(ObjectId::new(42).to_string(), "42");
        assert_eq!(ObjectId::new(42).as_u64(), 42);
    }
}
