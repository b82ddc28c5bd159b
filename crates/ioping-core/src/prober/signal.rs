//! Shutdown signal shared by the pool and its workers.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Cloneable cancellation flag with an interruptible wait.
///
/// Workers sleep in [`ShutdownSignal::wait_timeout`]; firing the signal
/// wakes every waiter at once.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Time the signal fired, `None` while running.
    fired_at: Mutex<Option<Instant>>,
    cond: Condvar,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal. Later calls keep the first timestamp.
    pub fn cancel(&self) {
        let mut fired = self
            .inner
            .fired_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if fired.is_none() {
            *fired = Some(Instant::now());
        }
        self.inner.cond.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at().is_some()
    }

    /// When the signal fired, if it has.
    pub fn cancelled_at(&self) -> Option<Instant> {
        *self
            .inner
            .fired_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps up to `timeout`. Returns `true` if the signal fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut fired = self
            .inner
            .fired_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        while fired.is_none() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .inner
                .cond
                .wait_timeout(fired, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            fired = guard;
        }
        true
    }
}
