//! # Occupancy grid map
//!
//! A fixed size grid of log-odds occupancy values. Every scan sample is cast as a ray from the
//! vehicle's cell to the measured end point: cells along the ray are evidence of free space, the
//! end cell is evidence of an obstacle.
//!
//! The grid never grows. Rays leaving the grid only update the cells inside it.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use image::GrayImage;
use log::trace;
use nalgebra::Vector2;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use util::maths::clamp;

use super::{
    raycast::{CellIndex, CellLine},
    snapshot::{render, GridSnapshot},
};
use crate::{loc::Pose, mapping::ParamsError, rangefinder::ScanFrame};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Tolerance used when converting between world and cell coordinates, so that positions exactly on
/// a cell boundary don't fall into the previous cell through round-off.
const CELL_EPSILON: f64 = 1e-9;

/// Largest grid that will be allocated.
pub const MAX_GRID_CELLS: usize = 64_000_000;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the occupancy grid.
#[derive(Debug, Clone, Deserialize)]
pub struct GridParams {
    /// Side length of one cell.
    ///
    /// Units: meters
    pub resolution_m: f64,

    /// Extent of the grid along the world X axis.
    ///
    /// Units: meters
    pub width_m: f64,

    /// Extent of the grid along the world Y axis.
    ///
    /// Units: meters
    pub height_m: f64,

    /// World position of the lower-left corner of the grid. If not given the grid is centred on
    /// the world origin.
    ///
    /// Units: meters
    #[serde(default)]
    pub origin_m: Option<[f64; 2]>,

    /// Log-odds added to a cell containing a range return.
    #[serde(default = "default_log_odds_hit")]
    pub log_odds_hit: f32,

    /// Log-odds added to a cell a ray passed through.
    #[serde(default = "default_log_odds_miss")]
    pub log_odds_miss: f32,

    #[serde(default = "default_log_odds_min")]
    pub log_odds_min: f32,

    #[serde(default = "default_log_odds_max")]
    pub log_odds_max: f32,

    /// Cells at or above this value are occupied.
    #[serde(default = "default_occupied_threshold")]
    pub occupied_threshold: f32,

    /// Cells at or below this value are free.
    #[serde(default = "default_free_threshold")]
    pub free_threshold: f32,
}

/// Limits on which samples are used to update the map.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RangeLimits {
    /// Samples closer than this are ignored, this includes the zero distance "no return" reading.
    ///
    /// Units: meters
    pub min_range_m: f64,

    /// Samples further than this are truncated and only mark free space.
    ///
    /// Units: meters
    pub max_range_m: f64,

    /// Maximum number of samples used from one frame. Larger frames are evenly subsampled.
    pub max_samples_per_frame: usize,
}

/// Geometry of the grid: size, resolution and placement in the world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridGeometry {
    /// Units: meters
    pub resolution_m: f64,

    /// World position of the outer corner of cell (0, 0).
    ///
    /// Units: meters
    pub origin_m: Vector2<f64>,

    pub rows: usize,

    pub cols: usize,
}

/// Log-odds thresholds used to classify cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CellThresholds {
    pub free: f32,
    pub occupied: f32,
}

/// Summary of one map update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    /// Rays cast into the map
    pub rays_cast: usize,

    /// Samples rejected for being below the minimum range (or not finite)
    pub rays_skipped: usize,

    /// Rays which left the grid
    pub rays_clipped: usize,

    /// Rays truncated to the maximum range
    pub rays_truncated: usize,

    /// Samples not used because the frame was subsampled
    pub samples_dropped: usize,
}

/// The occupancy grid map.
#[derive(Debug, Clone)]
pub struct OccupancyGridMap {
    params: GridParams,

    geometry: GridGeometry,

    /// Log-odds of each cell, indexed `[[row, col]]`
    cells: Array2<f32>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CellState {
    Unknown,
    Free,
    Occupied,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GridParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if !(self.resolution_m > 0.0 && self.resolution_m.is_finite()) {
            return Err(ParamsError::InvalidResolution(self.resolution_m));
        }
        if !(self.width_m > 0.0 && self.width_m.is_finite())
            || !(self.height_m > 0.0 && self.height_m.is_finite())
        {
            return Err(ParamsError::InvalidExtent(self.width_m, self.height_m));
        }
        if let Some(origin) = self.origin_m {
            if !origin[0].is_finite() || !origin[1].is_finite() {
                return Err(ParamsError::InvalidOrigin(origin));
            }
        }

        let (rows, cols) = self.num_cells();
        if rows.saturating_mul(cols) > MAX_GRID_CELLS {
            return Err(ParamsError::GridTooLarge(rows, cols));
        }

        if !(self.log_odds_min < 0.0 && self.log_odds_max > 0.0) {
            return Err(ParamsError::InvalidLogOddsBounds(
                self.log_odds_min,
                self.log_odds_max,
            ));
        }
        if !(self.log_odds_hit > 0.0 && self.log_odds_hit.is_finite()) {
            return Err(ParamsError::InvalidLogOddsHit(self.log_odds_hit));
        }
        if !(self.log_odds_miss < 0.0 && self.log_odds_miss.is_finite()) {
            return Err(ParamsError::InvalidLogOddsMiss(self.log_odds_miss));
        }
        if !(self.free_threshold > self.log_odds_min
            && self.free_threshold < 0.0
            && self.occupied_threshold > 0.0
            && self.occupied_threshold < self.log_odds_max)
        {
            return Err(ParamsError::InvalidThresholds(
                self.free_threshold,
                self.occupied_threshold,
            ));
        }

        Ok(())
    }

    /// Number of (rows, cols) the grid will have.
    pub fn num_cells(&self) -> (usize, usize) {
        let cells = |extent_m: f64| (extent_m / self.resolution_m - CELL_EPSILON).ceil().max(1.0);

        (cells(self.height_m) as usize, cells(self.width_m) as usize)
    }
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            resolution_m: 0.05,
            width_m: 20.0,
            height_m: 20.0,
            origin_m: None,
            log_odds_hit: default_log_odds_hit(),
            log_odds_miss: default_log_odds_miss(),
            log_odds_min: default_log_odds_min(),
            log_odds_max: default_log_odds_max(),
            occupied_threshold: default_occupied_threshold(),
            free_threshold: default_free_threshold(),
        }
    }
}

impl RangeLimits {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if !(self.min_range_m >= 0.0
            && self.max_range_m.is_finite()
            && self.min_range_m < self.max_range_m)
        {
            return Err(ParamsError::InvalidRangeLimits(
                self.min_range_m,
                self.max_range_m,
            ));
        }
        if self.max_samples_per_frame == 0 {
            return Err(ParamsError::ZeroMaxSamples);
        }

        Ok(())
    }
}

impl GridGeometry {
    /// Signed index of the cell containing the world position. May be outside the grid.
    pub fn world_to_cell(&self, position_m: &Vector2<f64>) -> CellIndex {
        let rel = (position_m - self.origin_m) / self.resolution_m;

        CellIndex::new(
            (rel.y + CELL_EPSILON).floor() as i64,
            (rel.x + CELL_EPSILON).floor() as i64,
        )
    }

    /// World position of the centre of the given cell.
    pub fn cell_to_world(&self, row: usize, col: usize) -> Vector2<f64> {
        self.origin_m
            + Vector2::new(col as f64 + 0.5, row as f64 + 0.5) * self.resolution_m
    }

    /// The (row, col) of the cell if it is inside the grid.
    pub fn contains(&self, cell: CellIndex) -> Option<(usize, usize)> {
        if cell.row >= 0
            && cell.col >= 0
            && (cell.row as usize) < self.rows
            && (cell.col as usize) < self.cols
        {
            Some((cell.row as usize, cell.col as usize))
        } else {
            None
        }
    }
}

impl CellThresholds {
    pub fn classify(&self, log_odds: f32) -> CellState {
        if log_odds >= self.occupied {
            CellState::Occupied
        } else if log_odds <= self.free {
            CellState::Free
        } else {
            CellState::Unknown
        }
    }
}

impl CellState {
    /// Greyscale value of the state in rendered maps.
    pub fn grey_value(&self) -> u8 {
        match self {
            CellState::Occupied => 0,
            CellState::Unknown => 128,
            CellState::Free => 255,
        }
    }
}

impl OccupancyGridMap {
    /// Create a new map with every cell unknown.
    pub fn new(params: GridParams) -> Result<Self, ParamsError> {
        params.validate()?;

        let (rows, cols) = params.num_cells();
        let resolution_m = params.resolution_m;

        let origin_m = match params.origin_m {
            Some(o) => Vector2::new(o[0], o[1]),
            None => {
                -Vector2::new(cols as f64 * resolution_m, rows as f64 * resolution_m) / 2.0
            }
        };

        Ok(Self {
            params,
            geometry: GridGeometry {
                resolution_m,
                origin_m,
                rows,
                cols,
            },
            cells: Array2::zeros((rows, cols)),
        })
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn thresholds(&self) -> CellThresholds {
        CellThresholds {
            free: self.params.free_threshold,
            occupied: self.params.occupied_threshold,
        }
    }

    /// (rows, cols) of the grid
    pub fn num_cells(&self) -> (usize, usize) {
        (self.geometry.rows, self.geometry.cols)
    }

    pub fn resolution_m(&self) -> f64 {
        self.geometry.resolution_m
    }

    pub fn origin_m(&self) -> Vector2<f64> {
        self.geometry.origin_m
    }

    pub fn world_to_cell(&self, position_m: &Vector2<f64>) -> CellIndex {
        self.geometry.world_to_cell(position_m)
    }

    pub fn cell_to_world(&self, row: usize, col: usize) -> Vector2<f64> {
        self.geometry.cell_to_world(row, col)
    }

    /// Log-odds of a cell, `None` if outside the grid.
    pub fn cell(&self, row: usize, col: usize) -> Option<f32> {
        self.cells.get([row, col]).copied()
    }

    pub fn state(&self, row: usize, col: usize) -> Option<CellState> {
        self.cell(row, col).map(|v| self.thresholds().classify(v))
    }

    /// Number of (free, unknown, occupied) cells.
    pub fn counts(&self) -> (usize, usize, usize) {
        count_states(&self.cells, self.thresholds())
    }

    /// Set every cell back to unknown.
    pub fn clear(&mut self) {
        self.cells.fill(0.0);
    }

    /// Update the map with a frame of samples taken from the given pose.
    pub fn update(&mut self, pose: &Pose, frame: &ScanFrame, limits: &RangeLimits) -> UpdateReport {
        let mut report = UpdateReport::default();

        let start = self.world_to_cell(&pose.position_m);

        // Evenly subsample large frames
        let max_samples = limits.max_samples_per_frame.max(1);
        let stride = (frame.len() + max_samples - 1) / max_samples;
        let stride = stride.max(1);
        let used = (frame.len() + stride - 1) / stride;
        report.samples_dropped = frame.len() - used;

        for sample in frame.samples.iter().step_by(stride) {
            if !sample.distance_m.is_finite() || sample.distance_m < limits.min_range_m {
                report.rays_skipped += 1;
                continue;
            }

            let (range_m, hit) = if sample.distance_m > limits.max_range_m {
                report.rays_truncated += 1;
                (limits.max_range_m, false)
            } else {
                (sample.distance_m, true)
            };

            let bearing_rad = pose.heading_rad + sample.angle_rad;
            let end_m = pose.position_m + Vector2::new(bearing_rad.cos(), bearing_rad.sin()) * range_m;
            let end = self.world_to_cell(&end_m);

            if self.cast_ray(start, end, hit) {
                report.rays_clipped += 1;
            }
            report.rays_cast += 1;
        }

        trace!("Grid update: {:?}", report);

        report
    }

    /// Copy the map into an immutable snapshot.
    pub fn snapshot(&self, pose: Pose, timestamp: DateTime<Utc>) -> GridSnapshot {
        GridSnapshot::new(
            timestamp,
            pose,
            self.geometry,
            self.thresholds(),
            self.cells.clone(),
        )
    }

    /// Render the map to a greyscale image, see [`GridSnapshot::to_image`].
    pub fn to_image(&self) -> GrayImage {
        render(&self.cells, self.thresholds())
    }

    /// Walk the ray from `start` to `end`, returns true if any of the ray was outside the grid.
    fn cast_ray(&mut self, start: CellIndex, end: CellIndex, hit: bool) -> bool {
        let mut clipped = false;

        for cell in CellLine::new(start, end) {
            // The vehicle's own cell is never updated
            if cell == start {
                continue;
            }

            let (row, col) = match self.geometry.contains(cell) {
                Some(rc) => rc,
                None => {
                    clipped = true;
                    continue;
                }
            };

            let delta = if hit && cell == end {
                self.params.log_odds_hit
            } else {
                self.params.log_odds_miss
            };

            let value = &mut self.cells[[row, col]];
            *value = clamp(
                &(*value + delta),
                &self.params.log_odds_min,
                &self.params.log_odds_max,
            );
        }

        clipped
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Count the (free, unknown, occupied) cells in an array of log-odds.
pub(crate) fn count_states(cells: &Array2<f32>, thresholds: CellThresholds) -> (usize, usize, usize) {
    cells
        .iter()
        .fold((0, 0, 0), |(free, unknown, occupied), &v| match thresholds.classify(v) {
            CellState::Free => (free + 1, unknown, occupied),
            CellState::Unknown => (free, unknown + 1, occupied),
            CellState::Occupied => (free, unknown, occupied + 1),
        })
}

fn default_log_odds_hit() -> f32 {
    0.9
}

fn default_log_odds_miss() -> f32 {
    -0.4
}

fn default_log_odds_min() -> f32 {
    -5.0
}

fn default_log_odds_max() -> f32 {
    5.0
}

fn default_occupied_threshold() -> f32 {
    0.5
}

fn default_free_threshold() -> f32 {
    -0.5
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
