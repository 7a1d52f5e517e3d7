//! # Rangefinder module
//!
//! The rotating rangefinder delivers a continuous byte stream of fixed-length packets, each
//! carrying twelve range/bearing measurements. This module turns that stream into
//! [`ScanSample`]s ([`RangeScanDecoder`]) and groups the samples of one full rotation into a
//! [`ScanFrame`] ([`ScanFrameAssembler`]).
//!
//! Where the bytes come from is abstracted by the [`ScanSource`] trait, with a device backed
//! source and a synthetic one for running without hardware.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod decoder;
mod frame;
pub mod packet;
mod source;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use decoder::{DecoderStats, RangeScanDecoder};
pub use frame::ScanFrameAssembler;
pub use source::*;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One range/bearing measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScanSample {
    /// Bearing of the measurement relative to the vehicle's forward axis, in the range [0, 2pi).
    ///
    /// Units: radians
    pub angle_rad: f64,

    /// Measured range. A zero distance means the sensor received no return.
    ///
    /// Units: meters
    pub distance_m: f64,

    /// Return intensity reported by the sensor
    pub quality: u8,

    /// Sensor clock at the time of the measurement, wraps.
    ///
    /// Units: milliseconds
    pub timestamp_ms: u16,
}

/// The samples of one full rotation of the rangefinder, in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanFrame {
    pub samples: Vec<ScanSample>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ScanFrame {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl From<Vec<ScanSample>> for ScanFrame {
    fn from(samples: Vec<ScanSample>) -> Self {
        Self { samples }
    }
}
