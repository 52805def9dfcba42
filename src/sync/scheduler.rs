//! Trailing-edge debounce scheduler
//!
//! Owns at most one pending flush. Every `reschedule` cancels the pending
//! flush and arms a new one, so only the last call in a burst fires.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default coalescing window
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

struct PendingFlush {
    handle: JoinHandle<()>,
    fire_at: Instant,
}

/// Cancel-and-reschedule timer owned by one synchronizer
pub struct DebounceScheduler {
    delay: Duration,
    pending: Mutex<Option<PendingFlush>>,
}

impl DebounceScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Cancel any pending flush and arm `fire` to run after the delay.
    ///
    /// Cancellation only reaches the waiting phase: once the delay elapses,
    /// `fire` runs as its own task and is never aborted by a later call.
    pub fn reschedule<F>(&self, fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(fire);
        });

        let previous = self.pending.lock().replace(PendingFlush {
            handle,
            fire_at: Instant::now() + delay,
        });
        if let Some(previous) = previous {
            previous.handle.abort();
        }
    }

    /// Cancel the pending flush; returns whether one was waiting
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(pending) => {
                let waiting = !pending.handle.is_finished();
                pending.handle.abort();
                waiting
            }
            None => false,
        }
    }

    /// Whether a flush is armed and has not fired yet
    pub fn is_scheduled(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|pending| !pending.handle.is_finished())
    }

    /// Time until the armed flush fires (zero if already due)
    pub fn time_remaining(&self) -> Option<Duration> {
        self.pending
            .lock()
            .as_ref()
            .filter(|pending| !pending.handle.is_finished())
            .map(|pending| pending.fire_at.saturating_duration_since(Instant::now()))
    }
}

impl Drop for DebounceScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for DebounceScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebounceScheduler")
            .field("delay", &self.delay)
            .field("scheduled", &self.is_scheduled())
            .finish()
    }
}
