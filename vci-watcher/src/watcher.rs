//! Change watcher
//!
//! ```text
//!            start                 signal
//! Stopped ─────────▶ Watching ─────────────▶ Enumerating
//!    ▲                  ▲                         │
//!    │ stop             └──── build + publish ────┘
//!    └──────────── (from any state)
//! ```
//!
//! Signals raised while `Enumerating` set the pending-rescan flag; the next
//! wait consumes it immediately, so at most one rescan is ever queued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use vci_device::{ChangeSignal, DeviceDirectory, HostPlatform, Version};

use crate::builder::SnapshotBuilder;
use crate::config::WatcherConfig;
use crate::error::{Result, WatchError};
use crate::publisher::{DeliveryGate, ExecutionContext, Inline, Publisher, SnapshotConsumer};
use crate::worker::{spawn_watch_worker, WatchLoop};

/// Lifecycle state of a [`ChangeWatcher`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// Terminal; no further cycles will run
    Stopped,
    /// Blocked on the change signal
    Watching,
    /// Building or publishing a snapshot
    Enumerating,
}

/// Counters describing what a watcher has done so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherStats {
    /// Wake-ups caused by a raised change signal
    pub wakeups: u64,
    /// Waits that ended by timeout
    pub timeouts: u64,
    /// Enumeration cycles started
    pub cycles: u64,
    /// Snapshots handed to the consumer
    pub published: u64,
    /// Snapshots dropped because the watcher was stopped
    pub discarded: u64,
    /// Cycles whose enumeration failed
    pub enumeration_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    wakeups: AtomicU64,
    timeouts: AtomicU64,
    cycles: AtomicU64,
    published: AtomicU64,
    discarded: AtomicU64,
    enumeration_failures: AtomicU64,
}

impl Counters {
    pub(crate) fn record_wakeup(&self) {
        self.wakeups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_enumeration_failure(&self) {
        self.enumeration_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> WatcherStats {
        WatcherStats {
            wakeups: self.wakeups.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            enumeration_failures: self.enumeration_failures.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the watcher handle and its watch thread
#[derive(Debug)]
pub(crate) struct Shared {
    state: Mutex<WatcherState>,
    gate: Arc<DeliveryGate>,
    pub(crate) stats: Counters,
}

impl Shared {
    fn new(gate: Arc<DeliveryGate>) -> Self {
        Self {
            state: Mutex::new(WatcherState::Watching),
            gate,
            stats: Counters::default(),
        }
    }

    pub(crate) fn set_state(&self, state: WatcherState) {
        *self.state.lock() = state;
    }

    /// Watching -> Enumerating. Returns `false` once stopped.
    pub(crate) fn enter_enumerating(&self) -> bool {
        let mut state = self.state.lock();
        if *state == WatcherState::Stopped || self.gate.is_closed() {
            return false;
        }
        *state = WatcherState::Enumerating;
        true
    }

    /// Enumerating -> Watching, unless stopped in the meantime.
    pub(crate) fn leave_enumerating(&self) {
        let mut state = self.state.lock();
        if *state == WatcherState::Enumerating {
            *state = WatcherState::Watching;
        }
    }
}

/// Watches a device directory and publishes a fresh [`Snapshot`](crate::Snapshot)
/// after every change.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use vci_device::simulated::{sample_device, SimulatedPlatform};
/// use vci_device::Version;
/// use vci_watcher::{channel, WatcherBuilder};
///
/// let platform = SimulatedPlatform::with_devices(Version::new(4, 0, 1), [sample_device(0)]);
/// let (consumer, snapshots) = channel();
///
/// let watcher = WatcherBuilder::from_platform(&platform)?.start(consumer)?;
///
/// // The initial scan arrives without any hardware change
/// let first = snapshots.next_snapshot(Duration::from_secs(2)).unwrap();
/// assert_eq!(first.len(), 1);
///
/// platform.attach(sample_device(1));
/// let second = snapshots.next_snapshot(Duration::from_secs(2)).unwrap();
/// assert_eq!(second.len(), 2);
///
/// watcher.join()?;
/// # Ok::<(), vci_watcher::WatchError>(())
/// ```
pub struct ChangeWatcher {
    shared: Arc<Shared>,
    signal: ChangeSignal,
    worker: Option<JoinHandle<()>>,
    runtime_version: Option<Version>,
}

impl ChangeWatcher {
    /// Start watching `directory` with the default configuration, delivering
    /// inline on the watch thread.
    pub fn start<D, C>(directory: D, consumer: C) -> Result<Self>
    where
        D: DeviceDirectory + 'static,
        C: SnapshotConsumer,
    {
        WatcherBuilder::new(directory).start(consumer)
    }

    pub fn builder<D>(directory: D) -> WatcherBuilder
    where
        D: DeviceDirectory + 'static,
    {
        WatcherBuilder::new(directory)
    }

    /// Stop watching.
    ///
    /// No cycle starts afterwards and nothing is delivered once this returns.
    /// A cycle already running is allowed to finish; its snapshot is
    /// discarded. If a delivery is in progress on another thread this waits
    /// for it. Safe to call repeatedly and from inside consumer callbacks.
    pub fn stop(&self) {
        let first = self.shared.gate.close();
        self.signal.close();
        self.shared.set_state(WatcherState::Stopped);

        if first {
            tracing::info!("Device watcher stop requested");
        }
    }

    /// Stop and wait for the watch thread to exit, releasing the directory.
    ///
    /// Must not be called from a consumer callback running on a thread other
    /// than the watch thread; use [`stop`](Self::stop) there.
    pub fn join(mut self) -> Result<()> {
        self.stop();

        match self.worker.take() {
            Some(handle) if handle.thread().id() == thread::current().id() => Ok(()),
            Some(handle) => handle.join().map_err(|_| WatchError::WorkerPanicked),
            None => Ok(()),
        }
    }

    pub fn state(&self) -> WatcherState {
        *self.shared.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() != WatcherState::Stopped
    }

    /// Whether a change arrived that no cycle has picked up yet
    pub fn pending_rescan(&self) -> bool {
        self.signal.is_raised()
    }

    /// Trigger a rescan as if the directory had reported a change.
    ///
    /// Returns `false` if one is already pending or the watcher is stopped.
    pub fn request_rescan(&self) -> bool {
        self.signal.raise()
    }

    pub fn stats(&self) -> WatcherStats {
        self.shared.stats.snapshot()
    }

    /// Driver runtime version, when started through a [`HostPlatform`]
    pub fn runtime_version(&self) -> Option<Version> {
        self.runtime_version
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("state", &self.state())
            .field("pending_rescan", &self.pending_rescan())
            .field("stats", &self.stats())
            .field("runtime_version", &self.runtime_version)
            .finish()
    }
}

/// Configures and starts a [`ChangeWatcher`]
pub struct WatcherBuilder {
    directory: Box<dyn DeviceDirectory>,
    config: WatcherConfig,
    context: Arc<dyn ExecutionContext>,
    runtime_version: Option<Version>,
}

impl WatcherBuilder {
    pub fn new<D>(directory: D) -> Self
    where
        D: DeviceDirectory + 'static,
    {
        Self {
            directory: Box::new(directory),
            config: WatcherConfig::default(),
            context: Arc::new(Inline),
            runtime_version: None,
        }
    }

    /// Open the platform's device directory and record its runtime version.
    pub fn from_platform<P: HostPlatform>(platform: &P) -> Result<Self> {
        let directory = platform
            .open_device_directory()
            .map_err(WatchError::DirectoryOpen)?;

        let runtime_version = match platform.runtime_version() {
            Ok(version) => Some(version),
            Err(e) => {
                tracing::warn!("Failed to query driver runtime version: {}", e);
                None
            }
        };

        let mut builder = Self::new(directory);
        builder.runtime_version = runtime_version;
        Ok(builder)
    }

    pub fn config(mut self, config: WatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Deliver on `context` instead of the watch thread
    pub fn context<X>(mut self, context: X) -> Self
    where
        X: ExecutionContext + 'static,
    {
        self.context = Arc::new(context);
        self
    }

    /// Register the change signal, spawn the watch thread and, unless
    /// disabled, schedule the initial scan.
    ///
    /// Fails synchronously if the configuration is invalid, the directory
    /// rejects the change signal, or the thread cannot be spawned.
    pub fn start<C: SnapshotConsumer>(self, consumer: C) -> Result<ChangeWatcher> {
        self.config.validate()?;

        let WatcherBuilder {
            mut directory,
            config,
            context,
            runtime_version,
        } = self;

        let signal = ChangeSignal::new();
        directory
            .assign_change_signal(signal.clone())
            .map_err(WatchError::SignalRegistration)?;

        let gate = Arc::new(DeliveryGate::new());
        let shared = Arc::new(Shared::new(Arc::clone(&gate)));

        let watch = WatchLoop {
            directory,
            builder: SnapshotBuilder::new(),
            publisher: Publisher::with_gate(Arc::new(consumer), context, gate),
            signal: signal.clone(),
            shared: Arc::clone(&shared),
            wait_timeout: config.wait_timeout,
        };

        let worker = spawn_watch_worker(config.thread_name.clone(), watch)
            .map_err(|e| WatchError::WorkerSpawn(e.to_string()))?;

        if config.initial_scan {
            signal.raise();
        }

        tracing::info!(
            "Watching device directory (initial scan: {}, wait timeout: {:?})",
            config.initial_scan,
            config.wait_timeout
        );

        Ok(ChangeWatcher {
            shared,
            signal,
            worker: Some(worker),
            runtime_version,
        })
    }
}
