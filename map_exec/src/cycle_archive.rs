//! Per-cycle archive of the mapping exec

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;

use map_lib::{loc::Pose, mapping::MappingStatus};
use util::{
    archive::{ArchiveError, Archived, Archiver},
    session::{self, Session},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Archives the pose and mapping status every cycle.
pub struct CycleArchive {
    archiver: Archiver,

    record: CycleRecord,
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
struct CycleRecord {
    time_s: f64,
    x_m: f64,
    y_m: f64,
    heading_rad: f64,
    comm_fault: bool,
    valid_packets: u64,
    dropped_packets: u64,
    frames_processed: u64,
    rays_clipped: u64,
    odometry_rejected: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CycleArchive {
    pub fn new(session: &Session) -> Result<Self, ArchiveError> {
        Ok(Self {
            archiver: Archiver::from_path(session, "map_exec.csv")?,
            record: CycleRecord::default(),
        })
    }

    /// Set the data to be written by the next call to `write`.
    pub fn update(&mut self, pose: &Pose, status: &MappingStatus) {
        self.record = CycleRecord {
            time_s: session::get_elapsed_seconds(),
            x_m: pose.x(),
            y_m: pose.y(),
            heading_rad: pose.heading_rad,
            comm_fault: status.comm_fault,
            valid_packets: status.decoder.valid_packets,
            dropped_packets: status.decoder.dropped_packets,
            frames_processed: status.frames_processed,
            rays_clipped: status.rays_clipped,
            odometry_rejected: status.odometry_rejected,
        };
    }
}

impl Archived for CycleArchive {
    fn write(&mut self) -> Result<(), ArchiveError> {
        self.archiver.serialise(self.record)
    }
}
