//! # Map module
//!
//! Occupancy grid mapping: the log-odds grid itself, the ray rasteriser used to update it and
//! immutable snapshots for readers.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod occupancy_grid;
pub mod raycast;
mod snapshot;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use occupancy_grid::{
    CellState, CellThresholds, GridGeometry, GridParams, OccupancyGridMap, RangeLimits,
    UpdateReport, MAX_GRID_CELLS,
};
pub use raycast::CellIndex;
pub use snapshot::{GridSnapshot, POSE_MARKER_GREY};
