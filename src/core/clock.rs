//! Clock implementations
//!
//! `SystemClock` is used by the binary. `ManualClock` holds a settable instant
//! and is used wherever time has to be controlled, such as quota rollover and
//! cache expiry tests.

use crate::core::traits::Clock;
use crate::types::Timestamp;
use chrono::{DateTime, Local, NaiveDate, TimeDelta, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Real system clock for production use
///
/// Calendar days follow the local time zone of the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn name(&self) -> &str {
        "SystemClock"
    }
}

/// Manually driven clock
///
/// Stores the current instant as microseconds since the epoch so it can be
/// shared across threads without a lock. Calendar days are UTC days.
#[derive(Debug)]
pub struct ManualClock {
    micros: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            micros: AtomicI64::new(start.timestamp_micros()),
        }
    }

    /// Jump to an absolute instant
    pub fn set(&self, at: Timestamp) {
        self.micros.store(at.timestamp_micros(), Ordering::SeqCst);
    }

    /// Move the clock forward (or backward for negative deltas)
    pub fn advance(&self, delta: TimeDelta) {
        let step = delta.num_microseconds().unwrap_or(i64::MAX);
        self.micros.fetch_add(step, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        DateTime::from_timestamp_micros(self.micros.load(Ordering::SeqCst)).unwrap_or_default()
    }

    fn name(&self) -> &str {
        "ManualClock"
    }
}
