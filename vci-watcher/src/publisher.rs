//! Snapshot delivery to the consumer
//!
//! A [`Publisher`] hands finished snapshots (and enumeration errors) to a
//! [`SnapshotConsumer`] on whatever [`ExecutionContext`] the consumer needs,
//! and blocks the watch thread until the delivery has run. Because the watch
//! thread does nothing else while it waits, deliveries are strictly ordered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use parking_lot::ReentrantMutex;

use crate::error::WatchError;
use crate::snapshot::Snapshot;

/// Unit of work marshaled onto an execution context
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Receives the watcher's output.
///
/// Callbacks run on the publisher's execution context and hold up the next
/// enumeration until they return, so they must not block indefinitely.
pub trait SnapshotConsumer: Send + Sync + 'static {
    fn on_snapshot(&self, snapshot: Snapshot);

    fn on_enumeration_error(&self, error: WatchError);
}

impl<T: SnapshotConsumer + ?Sized> SnapshotConsumer for Arc<T> {
    fn on_snapshot(&self, snapshot: Snapshot) {
        (**self).on_snapshot(snapshot)
    }

    fn on_enumeration_error(&self, error: WatchError) {
        (**self).on_enumeration_error(error)
    }
}

/// Where consumer callbacks run.
pub trait ExecutionContext: Send + Sync {
    /// Run `task` on this context.
    ///
    /// Implementations either run the task before returning or hand it to
    /// another thread; the publisher waits for it either way. Dropping the
    /// task instead of running it counts as a discarded delivery.
    fn invoke(&self, task: Task);
}

/// Runs deliveries directly on the watch thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl ExecutionContext for Inline {
    fn invoke(&self, task: Task) {
        task()
    }
}

impl<F> ExecutionContext for F
where
    F: Fn(Task) + Send + Sync,
{
    fn invoke(&self, task: Task) {
        self(task)
    }
}

/// Create a queue that a consumer-owned thread drains, plus the
/// [`Dispatcher`] the watcher marshals onto it with.
pub fn dispatch_queue() -> (Dispatcher, DispatchQueue) {
    let (tx, rx) = mpsc::channel();
    (Dispatcher { tx }, DispatchQueue { rx })
}

/// Sending half of a [`DispatchQueue`]; blocks until the task was pumped.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Task>,
}

impl ExecutionContext for Dispatcher {
    fn invoke(&self, task: Task) {
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let wrapped: Task = Box::new(move || {
            task();
            let _ = done_tx.send(());
        });

        if self.tx.send(wrapped).is_err() {
            tracing::debug!("Dispatch queue closed, dropping delivery");
            return;
        }

        // Err means the queue was dropped with the task still pending.
        let _ = done_rx.recv();
    }
}

/// Tasks waiting to run on the consumer's thread.
#[derive(Debug)]
pub struct DispatchQueue {
    rx: mpsc::Receiver<Task>,
}

impl DispatchQueue {
    /// Run every task that is already queued. Returns how many ran.
    pub fn pump(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for one task and run it.
    pub fn pump_timeout(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(task) => {
                task();
                true
            }
            Err(_) => false,
        }
    }

    /// Run tasks until every [`Dispatcher`] is gone.
    pub fn run(&self) {
        while let Ok(task) = self.rx.recv() {
            task();
        }
    }
}

/// Result of one delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    /// The publisher was closed, or the context dropped the task
    Discarded,
}

/// Serializes deliveries against closing.
///
/// Reentrant so a consumer callback may close the gate (i.e. stop the
/// watcher) from inside a delivery.
#[derive(Debug, Default)]
pub(crate) struct DeliveryGate {
    lock: ReentrantMutex<()>,
    closed: AtomicBool,
}

impl DeliveryGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Close the gate. Waits for a delivery running on another thread.
    /// Returns `true` for the call that actually closed it.
    pub(crate) fn close(&self) -> bool {
        let _guard = self.lock.lock();
        !self.closed.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn deliver(&self, delivery: impl FnOnce()) -> PublishOutcome {
        let _guard = self.lock.lock();
        if self.closed.load(Ordering::SeqCst) {
            return PublishOutcome::Discarded;
        }
        delivery();
        PublishOutcome::Delivered
    }
}

/// Delivers snapshots and errors to one consumer, in order.
pub struct Publisher {
    consumer: Arc<dyn SnapshotConsumer>,
    context: Arc<dyn ExecutionContext>,
    gate: Arc<DeliveryGate>,
}

impl Publisher {
    pub fn new(consumer: Arc<dyn SnapshotConsumer>, context: Arc<dyn ExecutionContext>) -> Self {
        Self::with_gate(consumer, context, Arc::new(DeliveryGate::new()))
    }

    pub(crate) fn with_gate(
        consumer: Arc<dyn SnapshotConsumer>,
        context: Arc<dyn ExecutionContext>,
        gate: Arc<DeliveryGate>,
    ) -> Self {
        Self {
            consumer,
            context,
            gate,
        }
    }

    /// Discard every delivery from now on.
    ///
    /// A delivery already running on another thread finishes first.
    pub fn close(&self) {
        self.gate.close();
    }

    pub fn is_closed(&self) -> bool {
        self.gate.is_closed()
    }

    /// Hand `snapshot` to the consumer and wait until it has been handled.
    pub fn publish(&self, snapshot: Snapshot) -> PublishOutcome {
        let sequence = snapshot.sequence();
        let outcome = self.dispatch(move |consumer| consumer.on_snapshot(snapshot));
        tracing::trace!("Snapshot #{} {:?}", sequence, outcome);
        outcome
    }

    /// Report a failed enumeration cycle to the consumer.
    pub fn publish_error(&self, error: WatchError) -> PublishOutcome {
        self.dispatch(move |consumer| consumer.on_enumeration_error(error))
    }

    fn dispatch<F>(&self, delivery: F) -> PublishOutcome
    where
        F: FnOnce(&dyn SnapshotConsumer) + Send + 'static,
    {
        if self.gate.is_closed() {
            return PublishOutcome::Discarded;
        }

        let (done_tx, done_rx) = mpsc::channel();
        let consumer = Arc::clone(&self.consumer);
        let gate = Arc::clone(&self.gate);

        self.context.invoke(Box::new(move || {
            let outcome = gate.deliver(|| delivery(consumer.as_ref()));
            let _ = done_tx.send(outcome);
        }));

        done_rx.recv().unwrap_or(PublishOutcome::Discarded)
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("closed", &self.gate.is_closed())
            .finish()
    }
}
