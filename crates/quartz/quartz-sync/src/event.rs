use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Process-local auto-reset event.
///
/// `set` raises the signal and wakes one waiter. A waiter that observes the
/// signal consumes it, so each `set` releases at most one `wait_one`. Setting
/// an already signalled event has no further effect.
pub struct AutoResetEvent {
    signalled: Mutex<bool>,
    cond: Condvar,
}

impl AutoResetEvent {
    pub fn new(initial: bool) -> Self {
        Self {
            signalled: Mutex::new(initial),
            cond: Condvar::new(),
        }
    }

    pub fn set(&self) {
        let mut signalled = self.signalled.lock();
        *signalled = true;
        self.cond.notify_one();
    }

    pub fn reset(&self) {
        *self.signalled.lock() = false;
    }

    /// Block until signalled. Always returns `true`.
    pub fn wait_one(&self) -> bool {
        let mut signalled = self.signalled.lock();
        while !*signalled {
            self.cond.wait(&mut signalled);
        }
        *signalled = false;
        true
    }

    /// Block until signalled or until `timeout` elapses. Returns whether the
    /// signal was consumed. A timeout too large to express as an `Instant`
    /// waits without a deadline.
    pub fn wait_one_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.wait_one();
        };
        let mut signalled = self.signalled.lock();
        while !*signalled {
            if self.cond.wait_until(&mut signalled, deadline).timed_out() {
                break;
            }
        }
        if *signalled {
            *signalled = false;
            true
        } else {
            tracing::debug!(?timeout, "auto reset event wait timed out");
            false
        }
    }

    /// Whether the event is currently signalled. Does not consume the signal.
    pub fn is_set(&self) -> bool {
        *self.signalled.lock()
    }
}

impl Default for AutoResetEvent {
    fn default() -> Self {
        Self::new(false)
    }
}
