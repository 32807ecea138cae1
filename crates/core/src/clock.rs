//! Injectable time source for cache expiry and trace-flag windows

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Instant;

/// Time source used by the caches and the trace provisioner.
///
/// Production code uses [`SystemClock`]; tests swap in the manual clock
/// from `test_utils` to step TTLs deterministically.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Monotonic now, used for TTL arithmetic
    fn now(&self) -> Instant;

    /// Wall-clock now in UTC, used for trace-flag validity windows
    fn now_utc(&self) -> DateTime<Utc>;
}

/// The real time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
