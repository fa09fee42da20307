//! Time source for expiration checks.
//!
//! The ledger never reads the wall clock directly. The host injects a
//! [`Clock`]; tests and simulations use [`FixedClock`] and move it by hand.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Seconds since the Unix epoch, as seen by the execution environment.
pub trait Clock: Send + Sync {
    fn unix_now(&self) -> u64;
}

/// Wall-clock time via `chrono`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_now(&self) -> u64 {
        // Pre-1970 clocks are a host misconfiguration; treat them as the epoch.
        u64::try_from(Utc::now().timestamp()).unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct FixedClock {
    now: AtomicU64,
}

impl FixedClock {
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: u64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn unix_now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_moves_on_request() {
        let clock = FixedClock::new(1_000);
        assert_eq!(clock.unix_now(), 1_000);
        clock.advance(60);
        assert_eq!(clock.unix_now(), 1_060);
        clock.set(5);
        assert_eq!(clock.unix_now(), 5);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.unix_now() > 1_577_836_800);
    }
}
