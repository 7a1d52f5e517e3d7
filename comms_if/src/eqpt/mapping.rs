//! # Mapping Equipment Communications Module
//!
//! Outbound telemetry of the mapping core: the vehicle pose, the mapping status and rendered map
//! frames for the map export endpoint.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::convert::TryFrom;

use base64::DecodeError;
use chrono::{serde::ts_milliseconds, DateTime, Utc};
use image::{GrayImage, ImageBuffer};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Pose telemetry, the vehicle's dead-reckoned pose in the map frame.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct PoseTm {
    /// UTC timestamp at which the pose was sampled
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Position along the map X axis
    ///
    /// Units: meters
    pub x_m: f64,

    /// Position along the map Y axis
    ///
    /// Units: meters
    pub y_m: f64,

    /// Heading from the map X axis, in the range (-pi, pi]
    ///
    /// Units: radians
    pub heading_rad: f64,
}

/// Status telemetry of the mapping core.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct MappingTm {
    /// True if no valid rangefinder packet has been seen within the communication window.
    pub comm_fault: bool,

    /// Number of valid rangefinder packets decoded
    pub valid_packets: u64,

    /// Number of rangefinder packets dropped due to checksum errors
    pub dropped_packets: u64,

    /// Number of scan frames applied to the map
    pub frames_processed: u64,

    /// Number of scan frames discarded (too few samples)
    pub frames_skipped: u64,

    /// Number of odometry samples rejected
    pub odometry_rejected: u64,
}

/// A serialisable rendering of the occupancy map.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MapFrame {
    /// UTC timestamp at which the map snapshot was taken
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Width of the image in pixels (number of grid columns)
    pub width: u32,

    /// Height of the image in pixels (number of grid rows)
    pub height: u32,

    /// Size of one cell
    ///
    /// Units: meters
    pub resolution_m: f64,

    /// Map position of the lower-left corner of the grid
    ///
    /// Units: meters
    pub origin_m: [f64; 2],

    /// The 8 bit greyscale image, flattened row-major from the top row and encoded in base64.
    /// Occupied cells are 0, unknown 128 and free 255.
    pub b64_data: String,
}

/// The decoded image of a [`MapFrame`].
#[derive(Debug, Clone)]
pub struct MapImage {
    /// UTC timestamp at which the map snapshot was taken
    pub timestamp: DateTime<Utc>,

    /// The map image
    pub image: GrayImage,
}

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, Clone)]
pub enum MapFrameError {
    #[error("Failed to decode map image from base64: {0}")]
    MapDecodeError(DecodeError),

    #[error("The encoded frame data was the wrong size")]
    FrameWrongSize,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl MapFrame {
    /// Build a frame from an already rendered image.
    pub fn from_image(
        timestamp: DateTime<Utc>,
        image: &GrayImage,
        resolution_m: f64,
        origin_m: [f64; 2],
    ) -> Self {
        Self {
            timestamp,
            width: image.width(),
            height: image.height(),
            resolution_m,
            origin_m,
            b64_data: base64::encode(image.as_raw()),
        }
    }
}

impl TryFrom<MapFrame> for MapImage {
    type Error = MapFrameError;

    fn try_from(frame: MapFrame) -> Result<Self, Self::Error> {
        // Decode the bytes from the base64 string
        let bytes = base64::decode(frame.b64_data).map_err(MapFrameError::MapDecodeError)?;

        // Build the image from the raw data
        let image = ImageBuffer::from_raw(frame.width, frame.height, bytes)
            .ok_or(MapFrameError::FrameWrongSize)?;

        Ok(Self {
            timestamp: frame.timestamp,
            image,
        })
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
