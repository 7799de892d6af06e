//! Reload and stop controls for a running agent
//!
//! Signal handlers (or tests) hold a clone of [`RuntimeSignals`] and raise
//! requests; the agent loop consumes them. A reload request is a one-shot
//! flag taken at the top of the next cycle. A stop request is sticky and
//! cuts the current sleep short.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    reload: AtomicBool,
    stop: AtomicBool,
    wake: Notify,
}

/// Shared handle for raising reload/stop requests
#[derive(Debug, Clone, Default)]
pub struct RuntimeSignals {
    inner: Arc<Inner>,
}

/// How an interruptible sleep ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    /// The full interval passed
    Elapsed,
    /// A reload was requested
    Interrupted,
    /// A stop was requested
    Stopped,
}

impl RuntimeSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the agent to reload its configuration before the next cycle
    pub fn request_reload(&self) {
        self.inner.reload.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();
    }

    /// Ask the agent to stop after the current cycle
    pub fn request_stop(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();
    }

    /// Consume a pending reload request
    pub fn take_reload(&self) -> bool {
        self.inner.reload.swap(false, Ordering::SeqCst)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.inner.stop.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless a request arrives first
    ///
    /// Only a request that is still pending ends the sleep early: a request
    /// raised while nobody was sleeping is observed by the next sleep, but
    /// one already consumed by [`take_reload`](Self::take_reload) is not.
    pub async fn sleep(&self, duration: Duration) -> SleepOutcome {
        let deadline = tokio::time::Instant::now() + duration;

        loop {
            // Registered before the flags are checked so a request raised
            // in between still wakes us.
            let notified = self.inner.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_stop_requested() {
                return SleepOutcome::Stopped;
            }
            if self.inner.reload.load(Ordering::SeqCst) {
                return SleepOutcome::Interrupted;
            }

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return SleepOutcome::Elapsed,
                _ = &mut notified => {}
            }
        }
    }
}
