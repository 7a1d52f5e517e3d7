//! General time utility functions

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Convert a duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: Duration) -> Option<f64> {
    duration
        .num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND as f64)
}

/// Convert a number of seconds into a duration.
///
/// Sub-nanosecond precision is truncated.
pub fn seconds_to_duration(seconds: f64) -> Duration {
    Duration::nanoseconds((seconds * NANOS_PER_SECOND as f64) as i64)
}

// ---------------------------------------------------------------------------
// CLOCKS
// ---------------------------------------------------------------------------

/// A source of the current time.
///
/// Anything which schedules work against wall time takes a clock so that it can be driven by a
/// [`ManualClock`] in tests.
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system (wall) clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

/// A clock which only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl ManualClock {
    /// Create a new manual clock starting at the given time.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward by the given number of seconds.
    pub fn advance_s(&self, seconds: f64) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = *now + seconds_to_duration(seconds);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
