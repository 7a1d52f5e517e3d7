//! # Grid snapshots
//!
//! An immutable copy of the occupancy grid, taken under the map lock and then used freely (for
//! rendering, saving or sending) without holding up the mapping thread.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use image::{GrayImage, Luma};
use ndarray::Array2;

use comms_if::eqpt::mapping::MapFrame;

use super::{
    occupancy_grid::{count_states, CellState, CellThresholds, GridGeometry},
    raycast::{CellIndex, CellLine},
};
use crate::loc::Pose;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Grey level of the vehicle marker drawn by [`GridSnapshot::to_image_with_pose`].
pub const POSE_MARKER_GREY: u8 = 64;

/// Length of the heading line of the vehicle marker.
///
/// Units: cells
const POSE_MARKER_HEADING_CELLS: f64 = 6.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GridSnapshot {
    /// Time at which the snapshot was taken
    pub timestamp: DateTime<Utc>,

    /// Pose of the vehicle when the snapshot was taken
    pub pose: Pose,

    geometry: GridGeometry,

    thresholds: CellThresholds,

    cells: Array2<f32>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GridSnapshot {
    pub(crate) fn new(
        timestamp: DateTime<Utc>,
        pose: Pose,
        geometry: GridGeometry,
        thresholds: CellThresholds,
        cells: Array2<f32>,
    ) -> Self {
        Self {
            timestamp,
            pose,
            geometry,
            thresholds,
            cells,
        }
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    /// (rows, cols) of the grid
    pub fn num_cells(&self) -> (usize, usize) {
        (self.geometry.rows, self.geometry.cols)
    }

    /// Log-odds of a cell, `None` if outside the grid.
    pub fn cell(&self, row: usize, col: usize) -> Option<f32> {
        self.cells.get([row, col]).copied()
    }

    pub fn state(&self, row: usize, col: usize) -> Option<CellState> {
        self.cell(row, col).map(|v| self.thresholds.classify(v))
    }

    /// Number of (free, unknown, occupied) cells.
    pub fn counts(&self) -> (usize, usize, usize) {
        count_states(&self.cells, self.thresholds)
    }

    /// Render the snapshot to an 8 bit greyscale image.
    ///
    /// Occupied cells are black (0), unknown cells grey (128) and free cells white (255). Image
    /// row 0 is the top of the map (largest world Y).
    pub fn to_image(&self) -> GrayImage {
        render(&self.cells, self.thresholds)
    }

    /// Render the snapshot with a marker at the vehicle's cell and a short line along its heading.
    pub fn to_image_with_pose(&self) -> GrayImage {
        let mut image = self.to_image();

        let start = self.geometry.world_to_cell(&self.pose.position_m);
        let end = self.geometry.world_to_cell(
            &(self.pose.position_m
                + self.pose.forward() * POSE_MARKER_HEADING_CELLS * self.geometry.resolution_m),
        );

        // Vehicle cell plus its 4 neighbours
        let mut marker: Vec<CellIndex> = [(0, 0), (1, 0), (-1, 0), (0, 1), (0, -1)]
            .iter()
            .map(|(dr, dc)| CellIndex::new(start.row + dr, start.col + dc))
            .collect();
        marker.extend(CellLine::new(start, end));

        for cell in marker {
            if let Some((row, col)) = self.geometry.contains(cell) {
                let (x, y) = pixel_of(self.geometry.rows, row, col);
                image.put_pixel(x, y, Luma([POSE_MARKER_GREY]));
            }
        }

        image
    }

    /// Convert the snapshot into a serialisable map frame.
    pub fn to_map_frame(&self) -> MapFrame {
        MapFrame::from_image(
            self.timestamp,
            &self.to_image(),
            self.geometry.resolution_m,
            [self.geometry.origin_m.x, self.geometry.origin_m.y],
        )
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Render an array of log-odds into a greyscale image, flipping rows so that the image is north up.
pub(crate) fn render(cells: &Array2<f32>, thresholds: CellThresholds) -> GrayImage {
    let (rows, cols) = cells.dim();

    GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        let row = rows - 1 - y as usize;
        Luma([thresholds.classify(cells[[row, x as usize]]).grey_value()])
    })
}

/// Image pixel (x, y) of a grid cell.
fn pixel_of(rows: usize, row: usize, col: usize) -> (u32, u32) {
    (col as u32, (rows - 1 - row) as u32)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        map::{GridParams, OccupancyGridMap, RangeLimits},
        rangefinder::{ScanFrame, ScanSample},
    };
    use comms_if::eqpt::mapping::MapImage;
    use std::convert::TryFrom;
    use std::f64::consts::PI;

    /// A 2 m square map at 0.1 m with one ray along +X and one along +Y, repeated so that the cells
    /// become confidently free/occupied.
    fn mapped() -> OccupancyGridMap {
        let mut map = OccupancyGridMap::new(GridParams {
            resolution_m: 0.1,
            width_m: 2.0,
            height_m: 2.0,
            ..Default::default()
        })
        .unwrap();

        let frame = ScanFrame::from(vec![
            ScanSample {
                angle_rad: 0.0,
                distance_m: 0.5,
                quality: 100,
                timestamp_ms: 0,
            },
            ScanSample {
                angle_rad: PI / 2.0,
                distance_m: 0.5,
                quality: 100,
                timestamp_ms: 0,
            },
        ]);
        let limits = RangeLimits {
            min_range_m: 0.05,
            max_range_m: 5.0,
            max_samples_per_frame: 100,
        };

        for _ in 0..5 {
            map.update(&Pose::default(), &frame, &limits);
        }

        map
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut map = mapped();
        let snapshot = map.snapshot(Pose::default(), Utc::now());

        map.clear();

        assert_eq!(snapshot.state(10, 15), Some(CellState::Occupied));
        assert_eq!(map.state(10, 15), Some(CellState::Unknown));
        assert_eq!(snapshot.counts(), (8, 400 - 10, 2));
        assert_eq!(snapshot.cell(20, 0), None);
    }

    #[test]
    fn test_render_colours() {
        let snapshot = mapped().snapshot(Pose::default(), Utc::now());
        let image = snapshot.to_image();

        assert_eq!(image.dimensions(), (20, 20));

        // Grid row 10 is image row 9, row 15 is image row 4
        assert_eq!(image.get_pixel(15, 9), &Luma([0]));
        assert_eq!(image.get_pixel(12, 9), &Luma([255]));
        assert_eq!(image.get_pixel(10, 4), &Luma([0]));
        assert_eq!(image.get_pixel(10, 7), &Luma([255]));
        assert_eq!(image.get_pixel(0, 0), &Luma([128]));
        assert_eq!(image.get_pixel(19, 19), &Luma([128]));

        // The map renders identically
        assert_eq!(mapped().to_image(), image);
    }

    #[test]
    fn test_render_pose_marker() {
        let snapshot = mapped().snapshot(Pose::new(0.0, 0.0, PI / 2.0), Utc::now());
        let image = snapshot.to_image_with_pose();

        assert_eq!(image.get_pixel(10, 9), &Luma([POSE_MARKER_GREY]));
        assert_eq!(image.get_pixel(11, 9), &Luma([POSE_MARKER_GREY]));
        // Heading line points up the image
        assert_eq!(image.get_pixel(10, 5), &Luma([POSE_MARKER_GREY]));
        assert_eq!(image.get_pixel(15, 9), &Luma([0]));
    }

    #[test]
    fn test_map_frame() {
        let snapshot = mapped().snapshot(Pose::default(), Utc::now());
        let frame = snapshot.to_map_frame();

        assert_eq!(frame.width, 20);
        assert_eq!(frame.height, 20);
        assert_eq!(frame.resolution_m, 0.1);
        assert_eq!(frame.origin_m, [-1.0, -1.0]);

        let decoded = MapImage::try_from(frame).unwrap();
        assert_eq!(decoded.image, snapshot.to_image());
    }
}
