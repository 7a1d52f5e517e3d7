//! # Localisation module
//!
//! Dead-reckons the pose of the vehicle in the map frame from the odometry deltas. There is no
//! correction from the map, so the pose drifts without bound over time.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use comms_if::eqpt::mapping::PoseTm;
use util::maths::norm_angle;

use crate::odom::PoseDelta;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The pose of the vehicle in the map frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    /// Position in the map.
    ///
    /// Units: meters
    pub position_m: Vector2<f64>,

    /// Heading anticlockwise from the map X axis, in the range (-pi, pi].
    ///
    /// Units: radians
    pub heading_rad: f64,
}

/// Keeps the running pose estimate.
#[derive(Debug, Clone)]
pub struct PoseTracker {
    pose: Pose,
    initial: Pose,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Pose {
    /// Create a new pose, the heading is normalised.
    pub fn new(x_m: f64, y_m: f64, heading_rad: f64) -> Self {
        Self {
            position_m: Vector2::new(x_m, y_m),
            heading_rad: norm_angle(heading_rad),
        }
    }

    pub fn x(&self) -> f64 {
        self.position_m.x
    }

    pub fn y(&self) -> f64 {
        self.position_m.y
    }

    /// Unit vector along the heading
    pub fn forward(&self) -> Vector2<f64> {
        Vector2::new(self.heading_rad.cos(), self.heading_rad.sin())
    }

    pub fn to_tm(&self, timestamp: DateTime<Utc>) -> PoseTm {
        PoseTm {
            timestamp,
            x_m: self.x(),
            y_m: self.y(),
            heading_rad: self.heading_rad,
        }
    }
}

impl PoseTracker {
    /// Create a tracker starting at the origin.
    pub fn new() -> Self {
        Self::with_initial(Pose::default())
    }

    /// Create a tracker starting at the given pose, which is also where `reset` returns to.
    pub fn with_initial(initial: Pose) -> Self {
        Self {
            pose: initial,
            initial,
        }
    }

    /// Apply a delta. The heading is updated first and the translation follows the new heading.
    pub fn apply(&mut self, delta: &PoseDelta) {
        self.pose.heading_rad = norm_angle(self.pose.heading_rad + delta.angular_rad);
        self.pose.position_m += self.pose.forward() * delta.linear_m;
    }

    pub fn snapshot(&self) -> Pose {
        self.pose
    }

    pub fn reset(&mut self) {
        self.pose = self.initial;
    }
}

impl Default for PoseTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_straight_line() {
        let mut tracker = PoseTracker::new();

        for _ in 0..10 {
            tracker.apply(&PoseDelta {
                linear_m: 0.1,
                angular_rad: 0.0,
            });
        }

        let pose = tracker.snapshot();
        assert!((pose.x() - 1.0).abs() < 1e-9);
        assert!(pose.y().abs() < 1e-9);
        assert_eq!(pose.heading_rad, 0.0);
    }

    #[test]
    fn test_single_step() {
        let mut tracker = PoseTracker::new();

        tracker.apply(&PoseDelta {
            linear_m: 1.0,
            angular_rad: 0.0,
        });

        assert_eq!(tracker.snapshot(), Pose::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_turn_then_drive() {
        let mut tracker = PoseTracker::new();

        // Turn on the spot then move 1 m, the move follows the new heading
        tracker.apply(&PoseDelta {
            linear_m: 0.0,
            angular_rad: PI / 2.0,
        });
        tracker.apply(&PoseDelta {
            linear_m: 1.0,
            angular_rad: 0.0,
        });

        let pose = tracker.snapshot();
        assert!(pose.x().abs() < 1e-9);
        assert!((pose.y() - 1.0).abs() < 1e-9);
        assert!((pose.heading_rad - PI / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_heading_stays_normalised() {
        let mut tracker = PoseTracker::new();

        for i in 0..5000 {
            tracker.apply(&PoseDelta {
                linear_m: 0.01,
                angular_rad: 0.37 * if i % 700 < 400 { 1.0 } else { -1.3 },
            });
            let h = tracker.snapshot().heading_rad;
            assert!(h > -PI && h <= PI, "heading {} out of range", h);
        }
    }

    #[test]
    fn test_reset() {
        let mut tracker = PoseTracker::with_initial(Pose::new(1.0, 2.0, 3.0 * PI));

        // Initial heading is normalised
        assert!((tracker.snapshot().heading_rad - PI).abs() < 1e-9);

        tracker.apply(&PoseDelta {
            linear_m: 5.0,
            angular_rad: 1.0,
        });
        tracker.reset();

        let pose = tracker.snapshot();
        assert_eq!(pose.x(), 1.0);
        assert_eq!(pose.y(), 2.0);
    }

    #[test]
    fn test_pose_tm() {
        let pose = Pose::new(1.5, -2.0, 0.25);
        let now = Utc::now();
        let tm = pose.to_tm(now);

        assert_eq!(tm.x_m, 1.5);
        assert_eq!(tm.y_m, -2.0);
        assert_eq!(tm.heading_rad, 0.25);
        assert_eq!(tm.timestamp, now);
    }
}
