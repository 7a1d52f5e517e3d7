//! # Mapping module
//!
//! The [`MappingCoordinator`] ties the rangefinder decoder, the odometry integrator, the pose
//! tracker and the occupancy grid together. It is the only writer of the pose and the map: both
//! live behind mutexes so that any number of [`MappingReader`]s on other threads can take copies
//! of them, while all updates happen in whichever thread owns the coordinator (normally the
//! [`MappingTask`] thread).
//!
//! A completed scan frame is always applied using the pose at the moment the frame completes.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod comms;
mod map_save;
mod params;
mod task;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use comms::CommMonitor;
pub use map_save::MapSaveSchedule;
pub use params::{DebugParams, MappingParams, ParamsError, SensorParams};
pub use task::{MappingEvent, MappingHandle, MappingTask};

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use log::{debug, info, warn};
use serde::Serialize;

use comms_if::eqpt::mapping::MappingTm;
use util::time::Clock;

use crate::{
    loc::{Pose, PoseTracker},
    map::{GridSnapshot, OccupancyGridMap, RangeLimits},
    odom::{OdometryIntegrator, OdometrySample},
    rangefinder::{DecoderStats, RangeScanDecoder, ScanFrame, ScanFrameAssembler},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Owns the mapping pipeline and performs every update of the pose and map.
pub struct MappingCoordinator {
    range_limits: RangeLimits,

    decoder: RangeScanDecoder,

    assembler: ScanFrameAssembler,

    integrator: OdometryIntegrator,

    comms: CommMonitor,

    status: MappingStatus,

    shared: MappingReader,
}

/// Read access to the mapping state, cheap to clone and safe to use from any thread.
#[derive(Clone)]
pub struct MappingReader {
    pose: Arc<Mutex<PoseTracker>>,

    grid: Arc<Mutex<OccupancyGridMap>>,

    status: Arc<Mutex<MappingStatus>>,

    map_save: Arc<MapSaveSchedule>,

    clock: Arc<dyn Clock>,
}

/// Counters and flags describing the state of the mapping core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MappingStatus {
    /// True if no valid rangefinder packet arrived within the communication window
    pub comm_fault: bool,

    pub decoder: DecoderStats,

    /// Frames applied to the map
    pub frames_processed: u64,

    /// Frames discarded for being too short
    pub frames_skipped: u64,

    pub rays_cast: u64,

    pub rays_clipped: u64,

    /// Odometry samples rejected (wrong mode or invalid interval)
    pub odometry_rejected: u64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("Invalid mapping parameters: {0}")]
    InvalidParams(ParamsError),

    #[error("Could not create the directory for map image {0:?}: {1}")]
    MapSaveIoError(PathBuf, std::io::Error),

    #[error("Could not write map image {0:?}: {1}")]
    MapSaveImageError(PathBuf, image::ImageError),

    #[error("The mapping task has stopped")]
    TaskStopped,

    #[error("Could not spawn the mapping task: {0}")]
    TaskSpawnError(std::io::Error),

    #[error("The mapping task panicked")]
    TaskPanicked,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MappingCoordinator {
    /// Create a new coordinator with an empty map and the vehicle at the origin.
    pub fn new(params: MappingParams, clock: Arc<dyn Clock>) -> Result<Self, MappingError> {
        params.validate().map_err(MappingError::InvalidParams)?;

        let grid = OccupancyGridMap::new(params.grid.clone()).map_err(MappingError::InvalidParams)?;
        let integrator =
            OdometryIntegrator::new(params.odometry.clone()).map_err(MappingError::InvalidParams)?;

        let (rows, cols) = grid.num_cells();
        info!(
            "Mapping core initialised: {} x {} cells at {} m, {:?} odometry",
            cols,
            rows,
            grid.resolution_m(),
            integrator.mode()
        );

        let comms = CommMonitor::new(params.sensor.comm_fault_window_s, clock.now());

        Ok(Self {
            range_limits: params.sensor.range_limits(),
            decoder: RangeScanDecoder::new(),
            assembler: ScanFrameAssembler::new(params.sensor.min_frame_samples),
            integrator,
            comms,
            status: MappingStatus::default(),
            shared: MappingReader {
                pose: Arc::new(Mutex::new(PoseTracker::new())),
                grid: Arc::new(Mutex::new(grid)),
                status: Arc::new(Mutex::new(MappingStatus::default())),
                map_save: Arc::new(MapSaveSchedule::new(&params.debug)),
                clock,
            },
        })
    }

    /// Feed rangefinder bytes, applying every frame they complete to the map.
    pub fn ingest_scan(&mut self, bytes: &[u8]) {
        let dropped_before = self.decoder.stats().dropped_packets;
        let samples = self.decoder.feed(bytes);

        if self.decoder.stats().dropped_packets > dropped_before {
            self.assembler.mark_gap();
        }

        for frame in self.assembler.push(&samples) {
            self.apply_frame(frame);
        }

        self.status.frames_skipped = self.assembler.frames_skipped();
        self.check_comms();
    }

    /// Feed one odometry sample. Invalid samples are counted and otherwise ignored.
    pub fn ingest_odometry(&mut self, sample: &OdometrySample) {
        match self.integrator.update(sample) {
            Ok(delta) => lock(&self.shared.pose).apply(&delta),
            Err(e) => {
                warn!("Rejected odometry sample: {}", e);
                self.status.odometry_rejected += 1;
                self.publish_status();
            }
        }
    }

    /// Update the communication fault state, must be called periodically even when no bytes
    /// arrive.
    pub fn check_comms(&mut self) {
        let stats = self.decoder.stats();

        match self.comms.update(self.shared.clock.now(), stats.valid_packets) {
            Some(true) => warn!(
                "No valid rangefinder packets since {}, communication fault raised",
                self.comms.last_valid()
            ),
            Some(false) => info!("Rangefinder packets received again, communication fault cleared"),
            None => (),
        }

        self.status.comm_fault = self.comms.is_faulted();
        self.status.decoder = stats;
        self.publish_status();
    }

    /// Put the vehicle back to its initial pose. The map is kept.
    pub fn reset_pose(&mut self) {
        lock(&self.shared.pose).reset();
        self.integrator.reset();
        info!("Pose reset");
    }

    pub fn get_pose(&self) -> Pose {
        self.shared.get_pose()
    }

    pub fn get_map_snapshot(&self) -> GridSnapshot {
        self.shared.get_map_snapshot()
    }

    pub fn status(&self) -> MappingStatus {
        self.status
    }

    /// See [`MappingReader::save_map`].
    pub fn save_map<P: AsRef<Path>>(&self, path: P) -> Result<bool, MappingError> {
        self.shared.save_map(path)
    }

    /// See [`MappingReader::maybe_save_map`].
    pub fn maybe_save_map(&self) -> Result<Option<PathBuf>, MappingError> {
        self.shared.maybe_save_map()
    }

    /// Get a reader sharing this coordinator's state.
    pub fn shared(&self) -> MappingReader {
        self.shared.clone()
    }

    fn apply_frame(&mut self, frame: ScanFrame) {
        let pose = self.get_pose();

        let report = lock(&self.shared.grid).update(&pose, &frame, &self.range_limits);

        self.status.frames_processed += 1;
        self.status.rays_cast += report.rays_cast as u64;
        self.status.rays_clipped += report.rays_clipped as u64;

        debug!(
            "Applied frame of {} samples at ({:.3}, {:.3}, {:.3}): {:?}",
            frame.len(),
            pose.x(),
            pose.y(),
            pose.heading_rad,
            report
        );
    }

    fn publish_status(&self) {
        *lock(&self.shared.status) = self.status;
    }
}

impl MappingReader {
    /// Copy of the current pose.
    pub fn get_pose(&self) -> Pose {
        lock(&self.pose).snapshot()
    }

    /// Copy of the current map, stamped with the current pose and time.
    pub fn get_map_snapshot(&self) -> GridSnapshot {
        let pose = self.get_pose();
        let now = self.clock.now();

        lock(&self.grid).snapshot(pose, now)
    }

    /// Copy of the last published status.
    pub fn status(&self) -> MappingStatus {
        *lock(&self.status)
    }

    /// Save the map as a PNG at `path`.
    ///
    /// Returns `Ok(false)` without writing if map saving is disabled or the last save was less
    /// than one save interval ago. Rendering and writing happen on the calling thread against a
    /// copy of the map.
    pub fn save_map<P: AsRef<Path>>(&self, path: P) -> Result<bool, MappingError> {
        if !self.map_save.claim(self.clock.now()) {
            return Ok(false);
        }

        let snapshot = self.get_map_snapshot();
        self.map_save.write(&snapshot, path.as_ref())?;

        debug!("Map saved to {:?}", path.as_ref());

        Ok(true)
    }

    /// Save the map into the configured directory if a save is due, returning the path written.
    pub fn maybe_save_map(&self) -> Result<Option<PathBuf>, MappingError> {
        if !self.map_save.enabled() {
            return Ok(None);
        }

        let path = self.map_save.scheduled_path(self.clock.now());

        match self.save_map(&path)? {
            true => Ok(Some(path)),
            false => Ok(None),
        }
    }
}

impl MappingStatus {
    pub fn to_tm(&self) -> MappingTm {
        MappingTm {
            comm_fault: self.comm_fault,
            valid_packets: self.decoder.valid_packets,
            dropped_packets: self.decoder.dropped_packets,
            frames_processed: self.frames_processed,
            frames_skipped: self.frames_skipped,
            odometry_rejected: self.odometry_rejected,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Lock a mutex, carrying on with the data if another thread panicked while holding it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
