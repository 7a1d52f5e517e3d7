//! # Simulated drive
//!
//! Moves the simulated vehicle seen by the synthetic rangefinder and produces the odometry the
//! real vehicle would report for that motion.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Arc, Mutex, PoisonError};

use map_lib::{
    loc::{Pose, PoseTracker},
    odom::{OdometryMode, OdometryParams, OdometrySample, PoseDelta},
};

use crate::params::SimDriveParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct SimDrive {
    params: SimDriveParams,

    odom_params: OdometryParams,

    /// True pose of the simulated vehicle
    truth: PoseTracker,

    /// Pose shared with the synthetic rangefinder
    sim_pose: Arc<Mutex<Pose>>,

    /// Total distance travelled by the (left, right) wheels
    wheel_dist_m: (f64, f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimDrive {
    pub fn new(
        params: SimDriveParams,
        odom_params: OdometryParams,
        sim_pose: Arc<Mutex<Pose>>,
    ) -> Self {
        let truth = PoseTracker::with_initial(
            *sim_pose.lock().unwrap_or_else(PoisonError::into_inner),
        );

        Self {
            params,
            odom_params,
            truth,
            sim_pose,
            wheel_dist_m: (0.0, 0.0),
        }
    }

    /// Drive for `dt_s` seconds, returning the odometry sample for the motion.
    pub fn step(&mut self, dt_s: f64) -> OdometrySample {
        let v = self.params.linear_ms;
        let w = self.params.angular_rads;

        self.truth.apply(&PoseDelta {
            linear_m: v * dt_s,
            angular_rad: w * dt_s,
        });
        *self
            .sim_pose
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = self.truth.snapshot();

        match self.odom_params.mode {
            OdometryMode::Velocity => OdometrySample::Velocity {
                linear_ms: v,
                angular_rads: w,
                dt_s,
            },
            OdometryMode::Encoder => {
                let half_diff = w * self.odom_params.wheel_base_m / 2.0;
                self.wheel_dist_m.0 += (v - half_diff) * dt_s;
                self.wheel_dist_m.1 += (v + half_diff) * dt_s;

                let per_pulse = self.odom_params.distance_per_pulse_m();

                OdometrySample::Encoder {
                    left_ticks: (self.wheel_dist_m.0 / per_pulse).round() as i64,
                    right_ticks: (self.wheel_dist_m.1 / per_pulse).round() as i64,
                    dt_s,
                }
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
