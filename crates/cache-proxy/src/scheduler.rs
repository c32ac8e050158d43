//! Tokio-backed `Scheduler` implementation — deferred time events and an
//! idle/busy signal for `writeout_objects` to yield against.
//!
//! Grounded on `gc.rs`'s `tokio::time::interval`-driven sweep loop: events
//! are spawned as one-shot `tokio::time::sleep` tasks rather than run on a
//! shared interval, since spec.md §6 asks for arbitrary per-event delays,
//! not a fixed period.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use cache_core::{Scheduler, TimeEventHandle};
use tokio::time::Duration;
use tracing::trace;

/// A `Scheduler` backed by `tokio::spawn` + `tokio::time::sleep`.
///
/// `work_to_do` reports whether a request is currently being served; the
/// listener flips the flag around each request so idle-time writeout
/// (spec.md §4.F) yields promptly when a client is waiting.
pub struct TokioScheduler {
    next_handle: AtomicU64,
    busy: Arc<AtomicBool>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a cloneable flag the listener flips while serving a request.
    pub fn busy_flag(&self) -> Arc<AtomicBool> {
        self.busy.clone()
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_time_event(
        &self,
        delay_seconds: u64,
        callback: Box<dyn FnOnce() + Send>,
    ) -> Option<TimeEventHandle> {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay_seconds)).await;
            trace!(handle = id, "firing scheduled time event");
            callback();
        });
        Some(TimeEventHandle(id))
    }

    fn work_to_do(&self) -> bool {
        self.busy.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool as StdAtomicBool;

    #[tokio::test]
    async fn scheduled_event_fires_after_delay() {
        let scheduler = TokioScheduler::new();
        let fired = Arc::new(StdAtomicBool::new(false));
        let f = fired.clone();

        scheduler.schedule_time_event(0, Box::new(move || {
            f.store(true, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn work_to_do_reflects_busy_flag() {
        let scheduler = TokioScheduler::new();
        assert!(!scheduler.work_to_do());
        scheduler.busy_flag().store(true, Ordering::Relaxed);
        assert!(scheduler.work_to_do());
    }
}
