//! Mapping parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::path::PathBuf;

use serde::Deserialize;

use crate::{
    map::{GridParams, RangeLimits},
    odom::OdometryParams,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the whole mapping core, normally loaded from `mapping.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct MappingParams {
    pub grid: GridParams,

    pub sensor: SensorParams,

    pub odometry: OdometryParams,

    #[serde(default)]
    pub debug: DebugParams,
}

/// Parameters describing how the rangefinder data is used.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorParams {
    /// Units: meters
    pub min_range_m: f64,

    /// Units: meters
    pub max_range_m: f64,

    /// Maximum number of samples of one frame used to update the map
    pub max_samples_per_frame: usize,

    /// Frames with fewer samples than this are discarded
    pub min_frame_samples: usize,

    /// If no valid packet is received for this long the communication fault is raised.
    ///
    /// Units: seconds
    pub comm_fault_window_s: f64,
}

/// Debug output parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebugParams {
    /// Enable saving rendered maps to disk
    pub map_save_enabled: bool,

    /// Minimum time between two map saves.
    ///
    /// Units: seconds
    pub map_save_interval_s: f64,

    /// Directory into which scheduled map saves are written
    pub map_save_dir: PathBuf,

    /// Draw the vehicle pose on saved maps
    pub draw_pose_marker: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Invalid parameter values. Any of these is fatal at start up.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamsError {
    #[error("Grid resolution must be positive and finite, got {0} m")]
    InvalidResolution(f64),

    #[error("Grid extent must be positive and finite, got {0} x {1} m")]
    InvalidExtent(f64, f64),

    #[error("Grid origin must be finite, got {0:?}")]
    InvalidOrigin([f64; 2]),

    #[error("Grid of {0} x {1} cells is too large")]
    GridTooLarge(usize, usize),

    #[error("Log-odds bounds must contain zero, got [{0}, {1}]")]
    InvalidLogOddsBounds(f32, f32),

    #[error("Log-odds hit increment must be positive, got {0}")]
    InvalidLogOddsHit(f32),

    #[error("Log-odds miss increment must be negative, got {0}")]
    InvalidLogOddsMiss(f32),

    #[error(
        "Free/occupied thresholds must lie strictly inside the log-odds bounds on either side of \
         zero, got {0} and {1}"
    )]
    InvalidThresholds(f32, f32),

    #[error("Sensor range limits must satisfy 0 <= min < max, got [{0}, {1}] m")]
    InvalidRangeLimits(f64, f64),

    #[error("The maximum number of samples per frame must be at least 1")]
    ZeroMaxSamples,

    #[error("Communication fault window must be positive, got {0} s")]
    InvalidCommWindow(f64),

    #[error("Wheel diameter must be positive and finite, got {0} m")]
    InvalidWheelDiameter(f64),

    #[error("Encoder pulses per revolution must be positive, got {0}")]
    InvalidPulsesPerRev(f64),

    #[error("Wheel base must be positive and finite, got {0} m")]
    InvalidWheelBase(f64),

    #[error("Map save interval must be non-negative, got {0} s")]
    InvalidMapSaveInterval(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MappingParams {
    /// Check every parameter of the mapping core.
    pub fn validate(&self) -> Result<(), ParamsError> {
        self.grid.validate()?;
        self.sensor.validate()?;
        self.odometry.validate()?;
        self.debug.validate()
    }
}

impl SensorParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        self.range_limits().validate()?;

        if !(self.comm_fault_window_s > 0.0 && self.comm_fault_window_s.is_finite()) {
            return Err(ParamsError::InvalidCommWindow(self.comm_fault_window_s));
        }

        Ok(())
    }

    pub fn range_limits(&self) -> RangeLimits {
        RangeLimits {
            min_range_m: self.min_range_m,
            max_range_m: self.max_range_m,
            max_samples_per_frame: self.max_samples_per_frame,
        }
    }
}

impl DebugParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if !(self.map_save_interval_s >= 0.0 && self.map_save_interval_s.is_finite()) {
            return Err(ParamsError::InvalidMapSaveInterval(self.map_save_interval_s));
        }

        Ok(())
    }
}

impl Default for DebugParams {
    fn default() -> Self {
        Self {
            map_save_enabled: false,
            map_save_interval_s: 5.0,
            map_save_dir: PathBuf::from("maps"),
            draw_pose_marker: true,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::odom::OdometryMode;

    /// Small, fast parameters used by the mapping tests.
    pub(crate) fn test_params() -> MappingParams {
        MappingParams {
            grid: GridParams {
                resolution_m: 0.1,
                width_m: 20.0,
                height_m: 20.0,
                ..Default::default()
            },
            sensor: SensorParams {
                min_range_m: 0.05,
                max_range_m: 8.0,
                max_samples_per_frame: 1000,
                min_frame_samples: 100,
                comm_fault_window_s: 1.0,
            },
            odometry: OdometryParams {
                mode: OdometryMode::Velocity,
                wheel_diameter_m: 0.065,
                pulses_per_rev: 20.0,
                wheel_base_m: 0.15,
            },
            debug: DebugParams::default(),
        }
    }

    #[test]
    fn test_params_file() {
        let params: MappingParams =
            util::params::from_str(include_str!("../../../params/mapping.toml")).unwrap();

        params.validate().unwrap();
        assert!(params.grid.origin_m.is_none());
    }

    #[test]
    fn test_defaults() {
        let params: MappingParams = util::params::from_str(
            r#"
            [grid]
            resolution_m = 0.05
            width_m = 10.0
            height_m = 8.0

            [sensor]
            min_range_m = 0.02
            max_range_m = 12.0
            max_samples_per_frame = 500
            min_frame_samples = 50
            comm_fault_window_s = 2.0

            [odometry]
            mode = "encoder"
            wheel_diameter_m = 0.065
            pulses_per_rev = 20.0
            wheel_base_m = 0.15
            "#,
        )
        .unwrap();

        params.validate().unwrap();
        assert_eq!(params.grid.log_odds_hit, 0.9);
        assert_eq!(params.grid.log_odds_miss, -0.4);
        assert_eq!(params.odometry.mode, OdometryMode::Encoder);
        assert!(!params.debug.map_save_enabled);
    }

    #[test]
    fn test_validate() {
        test_params().validate().unwrap();

        let mut p = test_params();
        p.sensor.comm_fault_window_s = 0.0;
        assert_eq!(p.validate(), Err(ParamsError::InvalidCommWindow(0.0)));

        let mut p = test_params();
        p.sensor.max_range_m = 0.01;
        assert_eq!(p.validate(), Err(ParamsError::InvalidRangeLimits(0.05, 0.01)));

        let mut p = test_params();
        p.odometry.wheel_diameter_m = -0.065;
        assert_eq!(p.validate(), Err(ParamsError::InvalidWheelDiameter(-0.065)));

        let mut p = test_params();
        p.debug.map_save_interval_s = f64::INFINITY;
        assert_eq!(
            p.validate(),
            Err(ParamsError::InvalidMapSaveInterval(f64::INFINITY))
        );
    }
}
