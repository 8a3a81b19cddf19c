//! Configuration for the change watcher

use std::time::Duration;

use crate::error::{Result, WatchError};

/// Configuration for a [`ChangeWatcher`](crate::ChangeWatcher)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Enumerate once right after start, without waiting for a change
    /// Default: true
    pub initial_scan: bool,

    /// Upper bound for a single wait on the change signal.
    /// A timeout is counted and logged but never enumerates.
    /// Default: None (wait indefinitely)
    pub wait_timeout: Option<Duration>,

    /// Name of the watch thread
    /// Default: "vci-device-watcher"
    pub thread_name: String,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            initial_scan: true,
            wait_timeout: None,
            thread_name: "vci-device-watcher".to_string(),
        }
    }
}

impl WatcherConfig {
    /// Create a WatcherConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Only enumerate once a real change has been signaled
    pub fn without_initial_scan() -> Self {
        Self {
            initial_scan: false,
            ..Default::default()
        }
    }

    /// Wake up every `interval` even without a change, for liveness logging
    pub fn with_heartbeat(interval: Duration) -> Self {
        Self {
            wait_timeout: Some(interval),
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.thread_name.trim().is_empty() {
            return Err(WatchError::InvalidConfig(
                "Thread name must not be empty".to_string(),
            ));
        }

        if self.wait_timeout == Some(Duration::ZERO) {
            return Err(WatchError::InvalidConfig(
                "Wait timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
