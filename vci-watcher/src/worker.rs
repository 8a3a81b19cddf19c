//! Watch thread
//!
//! The worker owns the device directory for the watcher's whole life. It
//! blocks on the change signal and runs one build/publish cycle per
//! wake-up. Signals that arrive during a cycle only set the signal's flag,
//! so they collapse into a single follow-up cycle.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use vci_device::{ChangeSignal, DeviceDirectory, WaitOutcome};

use crate::builder::SnapshotBuilder;
use crate::error::WatchError;
use crate::publisher::{PublishOutcome, Publisher};
use crate::watcher::{Shared, WatcherState};

pub(crate) struct WatchLoop {
    pub(crate) directory: Box<dyn DeviceDirectory>,
    pub(crate) builder: SnapshotBuilder,
    pub(crate) publisher: Publisher,
    pub(crate) signal: ChangeSignal,
    pub(crate) shared: Arc<Shared>,
    pub(crate) wait_timeout: Option<Duration>,
}

/// Spawns the watch thread
pub(crate) fn spawn_watch_worker(
    thread_name: String,
    watch: WatchLoop,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(thread_name)
        .spawn(move || watch.run())
}

impl WatchLoop {
    fn run(mut self) {
        tracing::info!("Device watcher started");
        let _exit = ExitGuard {
            shared: Arc::clone(&self.shared),
            signal: self.signal.clone(),
        };

        loop {
            match self.signal.wait(self.wait_timeout) {
                WaitOutcome::Closed => break,
                WaitOutcome::TimedOut => {
                    self.shared.stats.record_timeout();
                    tracing::trace!("Wait timed out without a device change");
                }
                WaitOutcome::Signaled => {
                    self.shared.stats.record_wakeup();
                    self.run_cycle();
                }
            }
        }

        tracing::info!("Device watcher stopped");
    }

    /// One enumerate/build/publish pass. Never overlaps with itself because
    /// only this thread runs it.
    fn run_cycle(&mut self) {
        if !self.shared.enter_enumerating() {
            return;
        }
        self.shared.stats.record_cycle();

        let cycle = panic::catch_unwind(AssertUnwindSafe(|| self.build_and_publish()));
        if let Err(payload) = cycle {
            self.shared.stats.record_enumeration_failure();
            let error = WatchError::CyclePanicked(panic_message(payload.as_ref()));
            tracing::error!("{}", error);
            self.publisher.publish_error(error);
        }

        self.shared.leave_enumerating();
    }

    fn build_and_publish(&mut self) {
        match self.builder.build(&mut *self.directory) {
            Ok(snapshot) => {
                let sequence = snapshot.sequence();
                match self.publisher.publish(snapshot) {
                    PublishOutcome::Delivered => {
                        self.shared.stats.record_published();
                    }
                    PublishOutcome::Discarded => {
                        self.shared.stats.record_discarded();
                        tracing::debug!("Discarded snapshot #{} after stop", sequence);
                    }
                }
            }
            Err(error) => {
                self.shared.stats.record_enumeration_failure();
                tracing::error!("{}", error);
                self.publisher.publish_error(error);
            }
        }
    }
}

/// Marks the watcher stopped when the watch thread exits, including by unwinding.
struct ExitGuard {
    shared: Arc<Shared>,
    signal: ChangeSignal,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.signal.close();
        self.shared.set_state(WatcherState::Stopped);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
