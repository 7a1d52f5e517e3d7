//! # Mapping Executable Parameters
//!
//! This module provides parameters for the mapping executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use map_lib::rangefinder::ScanSourceParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MapExecParams {
    /// Target period of one cycle.
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// Stop after this long. If not given the exec runs until killed.
    ///
    /// Units: seconds
    #[serde(default)]
    pub run_duration_s: Option<f64>,

    /// Size of the buffer rangefinder bytes are read into.
    pub read_buffer_len: usize,

    /// Maximum number of reads from the rangefinder source in one cycle.
    pub max_reads_per_cycle: usize,

    /// Where the rangefinder bytes come from
    pub scan_source: ScanSourceParams,

    /// Motion of the simulated vehicle, only used with the synthetic source
    pub sim_drive: SimDriveParams,
}

/// Constant velocity drive of the simulated vehicle.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SimDriveParams {
    /// Units: meters/second
    pub linear_ms: f64,

    /// Units: radians/second
    pub angular_rads: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MapExecParamsError {
    #[error("Cycle period must be positive, got {0} s")]
    InvalidCyclePeriod(f64),

    #[error("Run duration must not be negative, got {0} s")]
    InvalidRunDuration(f64),

    #[error("The rangefinder read buffer must not be empty")]
    EmptyReadBuffer,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MapExecParams {
    pub fn validate(&self) -> Result<(), MapExecParamsError> {
        if !(self.cycle_period_s > 0.0 && self.cycle_period_s.is_finite()) {
            return Err(MapExecParamsError::InvalidCyclePeriod(self.cycle_period_s));
        }

        if let Some(d) = self.run_duration_s {
            if !(d >= 0.0) {
                return Err(MapExecParamsError::InvalidRunDuration(d));
            }
        }

        if self.read_buffer_len == 0 {
            return Err(MapExecParamsError::EmptyReadBuffer);
        }

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_params_file() {
        let params: MapExecParams =
            util::params::from_str(include_str!("../../params/map_exec.toml")).unwrap();

        assert_eq!(params.validate(), Ok(()));
        match params.scan_source {
            ScanSourceParams::Synthetic(p) => assert_eq!(p.points_per_rev, 456),
            ScanSourceParams::Device { .. } => panic!("Expected the synthetic source"),
        }
    }

    #[test]
    fn test_device_source() {
        let params: MapExecParams = util::params::from_str(
            r#"
            cycle_period_s = 0.1
            read_buffer_len = 256
            max_reads_per_cycle = 4

            [scan_source]
            kind = "device"
            path = "/dev/ttyUSB0"

            [sim_drive]
            linear_ms = 0.0
            angular_rads = 0.0
            "#,
        )
        .unwrap();

        assert!(params.run_duration_s.is_none());
        assert_eq!(params.validate(), Ok(()));
        assert!(matches!(
            params.scan_source,
            ScanSourceParams::Device { ref path } if path == "/dev/ttyUSB0"
        ));
    }

    #[test]
    fn test_validate() {
        let mut params: MapExecParams =
            util::params::from_str(include_str!("../../params/map_exec.toml")).unwrap();

        params.cycle_period_s = 0.0;
        assert_eq!(
            params.validate(),
            Err(MapExecParamsError::InvalidCyclePeriod(0.0))
        );

        params.cycle_period_s = f64::NAN;
        assert!(matches!(
            params.validate(),
            Err(MapExecParamsError::InvalidCyclePeriod(_))
        ));

        params.cycle_period_s = 0.05;
        params.run_duration_s = Some(-1.0);
        assert_eq!(
            params.validate(),
            Err(MapExecParamsError::InvalidRunDuration(-1.0))
        );

        params.run_duration_s = None;
        params.read_buffer_len = 0;
        assert_eq!(params.validate(), Err(MapExecParamsError::EmptyReadBuffer));
    }
}
