//! # Mapping library.
//!
//! This library holds the perception/mapping core of the vehicle: it decodes the rangefinder byte
//! stream, dead-reckons the vehicle pose from odometry and builds an occupancy grid map from the
//! two. The `map_exec` executable and the benchmarks use it through this crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Rangefinder module - decodes the rangefinder byte stream into scan samples and frames
pub mod rangefinder;

/// Odometry module - converts wheel encoder or velocity samples into pose deltas
pub mod odom;

/// Localisation module - dead-reckons the vehicle pose from odometry deltas
pub mod loc;

/// Map module - the occupancy grid map and its snapshots
pub mod map;

/// Mapping module - coordinates the decoder, pose tracker and map under a single writer
pub mod mapping;
