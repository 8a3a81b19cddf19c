//! Auto-reset change signal.
//!
//! A [`ChangeSignal`] is a single boolean "something changed" flag guarded by
//! a mutex and condition variable. Raising an already raised signal is a
//! no-op, so any number of notifications that arrive while nobody is waiting
//! collapse into one wake-up.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Result of waiting on a [`ChangeSignal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The signal was raised; the flag has been consumed
    Signaled,
    /// The wait timeout elapsed without a raise
    TimedOut,
    /// The signal was closed and will never fire again
    Closed,
}

#[derive(Debug, Default)]
struct Flags {
    raised: bool,
    closed: bool,
}

#[derive(Debug, Default)]
struct Inner {
    flags: Mutex<Flags>,
    cond: Condvar,
}

/// Cloneable auto-reset event shared between a driver and a waiter.
#[derive(Debug, Clone, Default)]
pub struct ChangeSignal {
    inner: Arc<Inner>,
}

impl ChangeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake one waiter.
    ///
    /// Returns `false` when the raise was coalesced into one that is still
    /// pending, or when the signal is closed.
    pub fn raise(&self) -> bool {
        let mut flags = self.inner.flags.lock();
        if flags.closed || flags.raised {
            return false;
        }
        flags.raised = true;
        self.inner.cond.notify_one();
        true
    }

    /// Whether a raise is pending and has not been consumed by a wait.
    pub fn is_raised(&self) -> bool {
        self.inner.flags.lock().raised
    }

    /// Close the signal permanently and wake every waiter.
    ///
    /// A pending raise is dropped; waiters observe [`WaitOutcome::Closed`].
    pub fn close(&self) {
        let mut flags = self.inner.flags.lock();
        flags.closed = true;
        flags.raised = false;
        self.inner.cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.flags.lock().closed
    }

    /// Block until the signal is raised, closed, or `timeout` elapses.
    ///
    /// `None` waits without a deadline.
    pub fn wait(&self, timeout: Option<Duration>) -> WaitOutcome {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut flags = self.inner.flags.lock();

        loop {
            if flags.closed {
                return WaitOutcome::Closed;
            }
            if flags.raised {
                flags.raised = false;
                return WaitOutcome::Signaled;
            }

            match deadline {
                None => self.inner.cond.wait(&mut flags),
                Some(deadline) => {
                    if self.inner.cond.wait_until(&mut flags, deadline).timed_out() {
                        return if flags.closed {
                            WaitOutcome::Closed
                        } else if flags.raised {
                            flags.raised = false;
                            WaitOutcome::Signaled
                        } else {
                            WaitOutcome::TimedOut
                        };
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_raise_then_wait_consumes_flag() {
        let signal = ChangeSignal::new();
        assert!(signal.raise());
        assert!(signal.is_raised());

        assert_eq!(signal.wait(Some(Duration::ZERO)), WaitOutcome::Signaled);
        assert!(!signal.is_raised());
        assert_eq!(
            signal.wait(Some(Duration::from_millis(10))),
            WaitOutcome::TimedOut
        );
    }

    #[test]
    fn test_raises_coalesce() {
        let signal = ChangeSignal::new();
        assert!(signal.raise());
        assert!(!signal.raise());
        assert!(!signal.raise());

        assert_eq!(signal.wait(Some(Duration::ZERO)), WaitOutcome::Signaled);
        assert_eq!(signal.wait(Some(Duration::ZERO)), WaitOutcome::TimedOut);
    }

    #[test]
    fn test_close_wins_over_pending_raise() {
        let signal = ChangeSignal::new();
        signal.raise();
        signal.close();

        assert!(signal.is_closed());
        assert!(!signal.raise());
        assert_eq!(signal.wait(None), WaitOutcome::Closed);
    }

    #[test]
    fn test_raise_wakes_blocked_waiter() {
        let signal = ChangeSignal::new();
        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || signal.wait(None))
        };

        thread::sleep(Duration::from_millis(20));
        signal.raise();

        assert_eq!(waiter.join().unwrap(), WaitOutcome::Signaled);
    }

    #[test]
    fn test_close_wakes_blocked_waiter() {
        let signal = ChangeSignal::new();
        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || signal.wait(None))
        };

        thread::sleep(Duration::from_millis(20));
        signal.close();

        assert_eq!(waiter.join().unwrap(), WaitOutcome::Closed);
    }
}
