//! # Odometry module
//!
//! Converts wheel rotation (encoder ticks) or commanded velocity samples into pose deltas for the
//! [`crate::loc::PoseTracker`]. The vehicle is a differential drive: one wheel on each side of the
//! body, separated by the wheel base.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::mapping::ParamsError;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the odometry integrator.
#[derive(Debug, Clone, Deserialize)]
pub struct OdometryParams {
    /// Which kind of sample is expected
    pub mode: OdometryMode,

    /// Diameter of the drive wheels.
    ///
    /// Units: meters
    pub wheel_diameter_m: f64,

    /// Number of encoder pulses in one wheel revolution
    pub pulses_per_rev: f64,

    /// Distance between the left and right wheel contact points.
    ///
    /// Units: meters
    pub wheel_base_m: f64,
}

/// Displacement of the vehicle in its own frame since the previous sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PoseDelta {
    /// Distance travelled along the heading.
    ///
    /// Units: meters
    pub linear_m: f64,

    /// Change in heading, positive anticlockwise.
    ///
    /// Units: radians
    pub angular_rad: f64,
}

/// Integrates odometry samples into pose deltas.
#[derive(Debug)]
pub struct OdometryIntegrator {
    params: OdometryParams,

    /// Cumulative (left, right) tick counts of the previous encoder sample
    last_ticks: Option<(i64, i64)>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OdometryMode {
    /// Wheel encoder tick counts
    Encoder,

    /// Commanded linear and angular velocity
    Velocity,
}

/// One odometry measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum OdometrySample {
    /// Cumulative encoder counts of both wheels, forwards is positive.
    Encoder {
        left_ticks: i64,
        right_ticks: i64,
        dt_s: f64,
    },

    /// Body velocity held over the interval.
    Velocity {
        linear_ms: f64,
        angular_rads: f64,
        dt_s: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum OdometryError {
    #[error("Got a {got:?} sample but the integrator is configured for {expected:?}")]
    ModeMismatch {
        expected: OdometryMode,
        got: OdometryMode,
    },

    #[error("Invalid sample interval: {0} s")]
    InvalidInterval(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl OdometryParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if !(self.wheel_diameter_m > 0.0 && self.wheel_diameter_m.is_finite()) {
            return Err(ParamsError::InvalidWheelDiameter(self.wheel_diameter_m));
        }
        if !(self.pulses_per_rev > 0.0 && self.pulses_per_rev.is_finite()) {
            return Err(ParamsError::InvalidPulsesPerRev(self.pulses_per_rev));
        }
        if !(self.wheel_base_m > 0.0 && self.wheel_base_m.is_finite()) {
            return Err(ParamsError::InvalidWheelBase(self.wheel_base_m));
        }

        Ok(())
    }

    /// Distance travelled by a wheel per encoder pulse.
    ///
    /// Units: meters
    pub fn distance_per_pulse_m(&self) -> f64 {
        std::f64::consts::PI * self.wheel_diameter_m / self.pulses_per_rev
    }
}

impl OdometrySample {
    pub fn mode(&self) -> OdometryMode {
        match self {
            OdometrySample::Encoder { .. } => OdometryMode::Encoder,
            OdometrySample::Velocity { .. } => OdometryMode::Velocity,
        }
    }

    pub fn dt_s(&self) -> f64 {
        match self {
            OdometrySample::Encoder { dt_s, .. } => *dt_s,
            OdometrySample::Velocity { dt_s, .. } => *dt_s,
        }
    }
}

impl OdometryIntegrator {
    pub fn new(params: OdometryParams) -> Result<Self, ParamsError> {
        params.validate()?;

        Ok(Self {
            params,
            last_ticks: None,
        })
    }

    pub fn mode(&self) -> OdometryMode {
        self.params.mode
    }

    /// Convert a sample into the displacement since the previous one.
    ///
    /// The first encoder sample only sets the reference counts and gives a zero delta. A rejected
    /// sample leaves the reference counts untouched.
    pub fn update(&mut self, sample: &OdometrySample) -> Result<PoseDelta, OdometryError> {
        if sample.mode() != self.params.mode {
            return Err(OdometryError::ModeMismatch {
                expected: self.params.mode,
                got: sample.mode(),
            });
        }

        let dt_s = sample.dt_s();
        if !dt_s.is_finite() || dt_s < 0.0 {
            return Err(OdometryError::InvalidInterval(dt_s));
        }

        match *sample {
            OdometrySample::Encoder {
                left_ticks,
                right_ticks,
                ..
            } => {
                let (left_delta, right_delta) = match self.last_ticks {
                    Some((last_left, last_right)) => {
                        (left_ticks - last_left, right_ticks - last_right)
                    }
                    None => (0, 0),
                };
                self.last_ticks = Some((left_ticks, right_ticks));

                let left_m = left_delta as f64 * self.params.distance_per_pulse_m();
                let right_m = right_delta as f64 * self.params.distance_per_pulse_m();

                Ok(PoseDelta {
                    linear_m: (left_m + right_m) / 2.0,
                    angular_rad: (right_m - left_m) / self.params.wheel_base_m,
                })
            }
            OdometrySample::Velocity {
                linear_ms,
                angular_rads,
                ..
            } => {
                if !linear_ms.is_finite() || !angular_rads.is_finite() {
                    return Err(OdometryError::InvalidInterval(dt_s));
                }

                Ok(PoseDelta {
                    linear_m: linear_ms * dt_s,
                    angular_rad: angular_rads * dt_s,
                })
            }
        }
    }

    /// Forget the previous encoder counts, the next encoder sample becomes the new reference.
    pub fn reset(&mut self) {
        self.last_ticks = None;
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::PI;

    fn params(mode: OdometryMode) -> OdometryParams {
        OdometryParams {
            mode,
            wheel_diameter_m: 0.065,
            pulses_per_rev: 20.0,
            wheel_base_m: 0.15,
        }
    }

    #[test]
    fn test_encoder_straight() {
        let mut odom = OdometryIntegrator::new(params(OdometryMode::Encoder)).unwrap();

        // Reference sample
        let d = odom
            .update(&OdometrySample::Encoder {
                left_ticks: 100,
                right_ticks: 100,
                dt_s: 0.1,
            })
            .unwrap();
        assert_eq!(d, PoseDelta::default());

        // One full revolution of both wheels
        let d = odom
            .update(&OdometrySample::Encoder {
                left_ticks: 120,
                right_ticks: 120,
                dt_s: 0.1,
            })
            .unwrap();
        assert!((d.linear_m - PI * 0.065).abs() < 1e-12);
        assert_eq!(d.angular_rad, 0.0);
    }

    #[test]
    fn test_encoder_turn() {
        let mut odom = OdometryIntegrator::new(params(OdometryMode::Encoder)).unwrap();
        odom.update(&OdometrySample::Encoder {
            left_ticks: 0,
            right_ticks: 0,
            dt_s: 0.0,
        })
        .unwrap();

        // Spin on the spot, right wheel forwards
        let d = odom
            .update(&OdometrySample::Encoder {
                left_ticks: -10,
                right_ticks: 10,
                dt_s: 0.1,
            })
            .unwrap();

        let wheel_m = 0.5 * PI * 0.065;
        assert!(d.linear_m.abs() < 1e-12);
        assert!((d.angular_rad - 2.0 * wheel_m / 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_velocity() {
        let mut odom = OdometryIntegrator::new(params(OdometryMode::Velocity)).unwrap();

        let d = odom
            .update(&OdometrySample::Velocity {
                linear_ms: 0.5,
                angular_rads: -0.2,
                dt_s: 2.0,
            })
            .unwrap();
        assert_eq!(d.linear_m, 1.0);
        assert_eq!(d.angular_rad, -0.4);
    }

    #[test]
    fn test_rejections() {
        let mut odom = OdometryIntegrator::new(params(OdometryMode::Velocity)).unwrap();

        assert_eq!(
            odom.update(&OdometrySample::Encoder {
                left_ticks: 1,
                right_ticks: 1,
                dt_s: 0.1,
            }),
            Err(OdometryError::ModeMismatch {
                expected: OdometryMode::Velocity,
                got: OdometryMode::Encoder,
            })
        );

        assert!(matches!(
            odom.update(&OdometrySample::Velocity {
                linear_ms: 1.0,
                angular_rads: 0.0,
                dt_s: -0.1,
            }),
            Err(OdometryError::InvalidInterval(_))
        ));

        assert!(matches!(
            odom.update(&OdometrySample::Velocity {
                linear_ms: 1.0,
                angular_rads: 0.0,
                dt_s: f64::NAN,
            }),
            Err(OdometryError::InvalidInterval(_))
        ));
    }

    #[test]
    fn test_reset_sets_new_reference() {
        let mut odom = OdometryIntegrator::new(params(OdometryMode::Encoder)).unwrap();
        let sample = |l, r| OdometrySample::Encoder {
            left_ticks: l,
            right_ticks: r,
            dt_s: 0.1,
        };

        odom.update(&sample(0, 0)).unwrap();
        odom.reset();

        // Counter jumped while we weren't listening, that's not motion
        assert_eq!(odom.update(&sample(5000, 5000)).unwrap(), PoseDelta::default());
        assert!(odom.update(&sample(5020, 5020)).unwrap().linear_m > 0.0);
    }

    #[test]
    fn test_invalid_params() {
        let mut p = params(OdometryMode::Encoder);
        p.wheel_base_m = 0.0;
        assert!(matches!(
            OdometryIntegrator::new(p),
            Err(ParamsError::InvalidWheelBase(_))
        ));

        let mut p = params(OdometryMode::Encoder);
        p.pulses_per_rev = f64::NAN;
        assert!(matches!(
            OdometryIntegrator::new(p),
            Err(ParamsError::InvalidPulsesPerRev(_))
        ));
    }
}
