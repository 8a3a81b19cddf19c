//! VCI device watcher
//!
//! Keeps an up-to-date list of the CAN/LIN interfaces a vendor driver
//! exposes. A background thread waits on the driver's change signal,
//! re-enumerates the device directory once per wake-up, and hands each
//! finished [`Snapshot`] to a consumer.
//!
//! # Architecture
//!
//! ```text
//! DeviceDirectory ──signal──▶ ChangeWatcher ──▶ SnapshotBuilder ──▶ Publisher ──▶ consumer
//!                             (watch thread)    (scoped handles)    (execution context)
//! ```
//!
//! - Enumeration is serialized: one watch thread runs every cycle, and
//!   signals that arrive during a cycle coalesce into one rescan.
//! - Snapshots are delivered in creation order; the watch thread waits for
//!   each delivery before it waits for the next signal.
//! - Every device handle is released exactly once, even if reading it fails.
//! - After [`ChangeWatcher::stop`] nothing more is delivered.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use vci_watcher::{channel, WatchEvent, WatcherBuilder};
//!
//! let (consumer, events) = channel();
//! let watcher = WatcherBuilder::from_platform(&platform)?.start(consumer)?;
//!
//! for event in events {
//!     match event {
//!         WatchEvent::Snapshot(snapshot) => {
//!             for device in &snapshot {
//!                 println!("{} {}", device.id, device.description);
//!             }
//!         }
//!         WatchEvent::Error(error) => eprintln!("enumeration failed: {}", error),
//!     }
//! }
//! ```
//!
//! To deliver on a UI thread, pass a [`Dispatcher`] from [`dispatch_queue`]
//! (or any `Fn(Task)`) to [`WatcherBuilder::context`] and pump the queue
//! from that thread.

mod builder;
mod config;
mod diff;
mod error;
mod iter;
pub mod logging;
mod publisher;
mod snapshot;
mod watcher;
mod worker;

pub use builder::SnapshotBuilder;
pub use config::WatcherConfig;
pub use diff::SnapshotDiff;
pub use error::{Result, WatchError};
pub use iter::{
    channel, ChannelConsumer, SnapshotIterator, TimeoutIterator, TryIterator, WatchEvent,
};
pub use publisher::{
    dispatch_queue, DispatchQueue, Dispatcher, ExecutionContext, Inline, PublishOutcome,
    Publisher, SnapshotConsumer, Task,
};
pub use snapshot::{ExtractionFailure, Snapshot};
pub use watcher::{ChangeWatcher, WatcherBuilder, WatcherState, WatcherStats};

// Re-export the directory model so most consumers need a single dependency
pub use vci_device::{
    ChangeSignal, DeviceClass, DeviceDescriptor, DeviceDirectory, DeviceError, DeviceHandle,
    HardwareId, HostPlatform, ObjectId, Version,
};
