//! Blocking iterator over watcher output
//!
//! [`channel`] returns a [`ChannelConsumer`] to pass to the watcher and a
//! [`SnapshotIterator`] that yields what it receives, for consumers that
//! prefer pulling over callbacks.

use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use crate::error::WatchError;
use crate::publisher::SnapshotConsumer;
use crate::snapshot::Snapshot;

/// One delivery from the watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Snapshot(Snapshot),
    Error(WatchError),
}

impl WatchEvent {
    pub fn into_snapshot(self) -> Option<Snapshot> {
        match self {
            WatchEvent::Snapshot(snapshot) => Some(snapshot),
            WatchEvent::Error(_) => None,
        }
    }

    pub fn into_error(self) -> Option<WatchError> {
        match self {
            WatchEvent::Snapshot(_) => None,
            WatchEvent::Error(error) => Some(error),
        }
    }
}

/// Create a connected consumer / iterator pair
pub fn channel() -> (ChannelConsumer, SnapshotIterator) {
    let (tx, rx) = mpsc::channel();
    (
        ChannelConsumer { tx },
        SnapshotIterator {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Consumer that forwards every delivery into a channel
#[derive(Debug)]
pub struct ChannelConsumer {
    tx: mpsc::Sender<WatchEvent>,
}

impl ChannelConsumer {
    fn forward(&self, event: WatchEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Snapshot iterator dropped, discarding delivery");
        }
    }
}

impl SnapshotConsumer for ChannelConsumer {
    fn on_snapshot(&self, snapshot: Snapshot) {
        self.forward(WatchEvent::Snapshot(snapshot));
    }

    fn on_enumeration_error(&self, error: WatchError) {
        self.forward(WatchEvent::Error(error));
    }
}

/// Blocking iterator over watcher deliveries
///
/// This iterator blocks on `next()` until an event is available or the
/// watcher (and with it the consumer) is gone. Use `try_recv()` for
/// non-blocking access.
pub struct SnapshotIterator {
    rx: Arc<Mutex<mpsc::Receiver<WatchEvent>>>,
}

impl SnapshotIterator {
    /// Block until an event is available
    ///
    /// Returns `None` if the channel is closed.
    pub fn recv(&self) -> Option<WatchEvent> {
        self.rx.lock().ok()?.recv().ok()
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<WatchEvent> {
        self.rx.lock().ok()?.try_recv().ok()
    }

    /// Block until an event is available or timeout expires
    pub fn recv_timeout(&self, timeout: Duration) -> Option<WatchEvent> {
        self.rx.lock().ok()?.recv_timeout(timeout).ok()
    }

    /// Wait up to `timeout` for the next snapshot, skipping error events
    pub fn next_snapshot(&self, timeout: Duration) -> Option<Snapshot> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            match self.recv_timeout(remaining)? {
                WatchEvent::Snapshot(snapshot) => return Some(snapshot),
                WatchEvent::Error(error) => {
                    tracing::debug!("Skipping error event: {}", error);
                }
            }
        }
    }

    /// Get a non-blocking iterator over currently available events
    pub fn try_iter(&self) -> TryIterator<'_> {
        TryIterator { inner: self }
    }

    /// Get a blocking iterator with timeout
    ///
    /// Blocks for up to `timeout` on each call to `next()`.
    pub fn timeout_iter(&self, timeout: Duration) -> TimeoutIterator<'_> {
        TimeoutIterator {
            inner: self,
            timeout,
        }
    }
}

impl Iterator for SnapshotIterator {
    type Item = WatchEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

impl Clone for SnapshotIterator {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

/// Non-blocking iterator over currently available events
pub struct TryIterator<'a> {
    inner: &'a SnapshotIterator,
}

impl<'a> Iterator for TryIterator<'a> {
    type Item = WatchEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.try_recv()
    }
}

/// Blocking iterator with timeout
pub struct TimeoutIterator<'a> {
    inner: &'a SnapshotIterator,
    timeout: Duration,
}

impl<'a> Iterator for TimeoutIterator<'a> {
    type Item = WatchEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.recv_timeout(self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vci_device::DeviceError;

    #[test]
    fn test_try_recv_empty() {
        let (_consumer, iter) = channel();
        assert!(iter.try_recv().is_none());
    }

    #[test]
    fn test_recv_timeout_empty() {
        let (_consumer, iter) = channel();

        let start = std::time::Instant::now();
        assert!(iter.recv_timeout(Duration::from_millis(50)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn test_forwards_in_order() {
        let (consumer, iter) = channel();
        consumer.on_snapshot(Snapshot::new(1, Vec::new()));
        consumer.on_enumeration_error(WatchError::Enumeration(DeviceError::Driver(
            "bus off".to_string(),
        )));
        consumer.on_snapshot(Snapshot::new(2, Vec::new()));

        let events: Vec<_> = iter.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], WatchEvent::Snapshot(ref s) if s.sequence() == 1));
        assert!(matches!(events[1], WatchEvent::Error(WatchError::Enumeration(_))));
        assert!(matches!(events[2], WatchEvent::Snapshot(ref s) if s.sequence() == 2));
    }

    #[test]
    fn test_next_snapshot_skips_errors() {
        let (consumer, iter) = channel();
        consumer.on_enumeration_error(WatchError::WorkerPanicked);
        consumer.on_snapshot(Snapshot::new(4, Vec::new()));

        let snapshot = iter.next_snapshot(Duration::from_millis(100)).unwrap();
        assert_eq!(snapshot.sequence(), 4);
        assert!(iter.next_snapshot(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn test_closed_when_consumer_dropped() {
        let (consumer, mut iter) = channel();
        consumer.on_snapshot(Snapshot::new(1, Vec::new()));
        drop(consumer);

        assert!(iter.next().is_some());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_clone_shares_receiver() {
        let (consumer, iter1) = channel();
        let iter2 = iter1.clone();
        consumer.on_snapshot(Snapshot::new(1, Vec::new()));

        assert!(iter2.try_recv().is_some());
        assert!(iter1.try_recv().is_none());
    }
}
