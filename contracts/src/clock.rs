//! # Clock Sources
//!
//! The contracts never read wall-clock time on their own. Every time-gated
//! check asks a [`Clock`] at call time, which keeps unlock comparisons
//! deterministic in tests and lets the host decide what "now" means.
//!
//! - [`SystemClock`]: wall-clock seconds via `chrono`.
//! - [`ManualClock`]: externally advanced time. Only ever moves forward.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use crate::types::Timestamp;

/// A source of Unix-second timestamps.
pub trait Clock: Send + Sync {
    /// Current time in Unix seconds.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time. Pre-epoch system clocks read as 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        u64::try_from(Utc::now().timestamp()).unwrap_or(0)
    }
}

/// A clock that is advanced explicitly by its owner.
///
/// Time is monotonic: [`set`](Self::set) to an earlier value is ignored, so
/// a grant that was claimable never becomes locked again.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Moves time forward by `secs`, saturating at `u64::MAX`.
    /// Returns the new time.
    pub fn advance(&self, secs: u64) -> Timestamp {
        let previous = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
                Some(c.saturating_add(secs))
            })
            .unwrap_or_else(|c| c);
        previous.saturating_add(secs)
    }

    /// Jumps to `ts` if it is later than the current time.
    /// Returns the resulting time.
    pub fn set(&self, ts: Timestamp) -> Timestamp {
        let previous = self.now.fetch_max(ts, Ordering::SeqCst);
        previous.max(ts)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now(), 1_000);
        assert_eq!(clock.advance(86_400), 87_400);
        assert_eq!(clock.now(), 87_400);
    }

    #[test]
    fn manual_clock_never_goes_backwards() {
        let clock = ManualClock::new(5_000);
        assert_eq!(clock.set(4_000), 5_000);
        assert_eq!(clock.now(), 5_000);
        assert_eq!(clock.set(6_000), 6_000);
    }

    #[test]
    fn manual_clock_saturates() {
        let clock = ManualClock::new(u64::MAX - 1);
        assert_eq!(clock.advance(10), u64::MAX);
    }

    #[test]
    fn system_clock_is_past_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
