//! Shared test utilities for the apexlog crates.
//!
//! Compiled into the library so downstream crates can drive the same
//! doubles from their own test modules.

use crate::clock::Clock;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A clock that only moves when told to.
///
/// Starts at construction time and advances by explicit calls, letting
/// tests step across cache-TTL boundaries without sleeping.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
    utc: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Create a clock pinned to "now"
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            utc: Mutex::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().unwrap_or_else(Utc::now)),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut offset = self
            .offset
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *offset += by;

        let mut utc = self
            .utc
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *utc += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self
            .offset
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.base + *offset
    }

    fn now_utc(&self) -> DateTime<Utc> {
        *self
            .utc
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
