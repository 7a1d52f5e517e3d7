//! Rangefinder communication monitoring

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Duration, Utc};

use util::time::seconds_to_duration;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Raises a fault when no valid packet has been decoded for longer than the window.
#[derive(Debug)]
pub struct CommMonitor {
    window: Duration,

    last_valid: DateTime<Utc>,

    last_valid_count: u64,

    faulted: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CommMonitor {
    /// Start monitoring at `now`, the link counts as healthy for the first window.
    pub fn new(window_s: f64, now: DateTime<Utc>) -> Self {
        Self {
            window: seconds_to_duration(window_s),
            last_valid: now,
            last_valid_count: 0,
            faulted: false,
        }
    }

    /// Update with the decoder's running count of valid packets.
    ///
    /// Returns the new fault state if it changed.
    pub fn update(&mut self, now: DateTime<Utc>, valid_packets: u64) -> Option<bool> {
        if valid_packets != self.last_valid_count {
            self.last_valid_count = valid_packets;
            self.last_valid = now;
        }

        let faulted = now - self.last_valid > self.window;

        if faulted != self.faulted {
            self.faulted = faulted;
            Some(faulted)
        } else {
            None
        }
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Time of the last change in the valid packet count.
    pub fn last_valid(&self) -> DateTime<Utc> {
        self.last_valid
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fault_edges() {
        let start = Utc::now();
        let at = |s: f64| start + seconds_to_duration(s);
        let mut monitor = CommMonitor::new(1.0, start);

        assert_eq!(monitor.update(at(0.5), 0), None);
        assert_eq!(monitor.update(at(1.0), 0), None);
        assert_eq!(monitor.update(at(1.1), 0), Some(true));
        assert!(monitor.is_faulted());

        // Still faulted, only the edge is reported
        assert_eq!(monitor.update(at(5.0), 0), None);

        // Packets are back
        assert_eq!(monitor.update(at(5.1), 3), Some(false));
        assert_eq!(monitor.last_valid(), at(5.1));
        assert_eq!(monitor.update(at(5.9), 3), None);
        assert_eq!(monitor.update(at(6.2), 3), Some(true));
    }
}
