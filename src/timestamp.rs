//! Monotonic nanosecond timestamp source.
//!
//! The original C implementation reads `CLOCK_MONOTONIC` directly (or
//! `QueryPerformanceCounter` on Windows). `std::time::Instant` already wraps
//! the platform's monotonic clock on every target we care about, so there is
//! no need for a platform-specific `cfg` split here: we anchor a single
//! process-wide `Instant` at first use and report nanosecond offsets from
//! it, which is what `OTF2_GetClockTicks`-style readers do in practice.

use lazy_static::lazy_static;
use std::time::Instant;

lazy_static! {
    static ref EPOCH: Instant = Instant::now();
}

/// An opaque, monotonic timestamp. Carries no epoch meaning on its own --
/// only differences between two `Timestamp`s are meaningful, per spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Reads the monotonic clock now, as nanoseconds since this process's
    /// first call into the tracing runtime.
    #[inline]
    pub fn now() -> Self {
        Timestamp(EPOCH.elapsed().as_nanos() as u64)
    }

    #[inline]
    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Duration between two timestamps, `self` assumed later than `earlier`.
    pub fn since(&self, earlier: Timestamp) -> time::Duration {
        time::Duration::nanoseconds(self.0 as i64 - earlier.0 as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_non_decreasing() {
        let a = Timestamp::now();
        let b = Timestamp::now();
        assert!(b >= a);
    }

    #[test]
    fn since_reports_elapsed_duration() {
        let a = Timestamp::now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = Timestamp::now();
        assert!(b.since(a).whole_milliseconds() >= 1);
    }
}
