//! Wall-clock collaborator. The single concrete `Clock` used by the daemon
//! binary; tests use a fake clock inline rather than this one.

use std::time::{SystemTime, UNIX_EPOCH};

use cache_core::Clock;

/// Reads the system clock, matching the donor's own use of
/// `SystemTime::now().duration_since(UNIX_EPOCH)` in `updater.rs`'s cache
/// timestamping.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_a_plausible_unix_timestamp() {
        let clock = SystemClock;
        // Any time after this crate was written.
        assert!(clock.now() > 1_700_000_000);
    }
}
