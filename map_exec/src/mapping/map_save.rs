//! # Map saving
//!
//! Rendered maps are written to disk for debugging. Saving is switched on by the debug parameters
//! and throttled so that a caller polling every cycle only writes once per interval.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use chrono::{DateTime, Utc};

use super::{DebugParams, MappingError};
use crate::map::GridSnapshot;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// chrono format of the timestamp in scheduled map file names
const MAP_FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Decides when the map may be saved.
#[derive(Debug)]
pub struct MapSaveSchedule {
    enabled: bool,

    interval_s: f64,

    dir: PathBuf,

    draw_pose_marker: bool,

    last_save: Mutex<Option<DateTime<Utc>>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MapSaveSchedule {
    pub fn new(params: &DebugParams) -> Self {
        Self {
            enabled: params.map_save_enabled,
            interval_s: params.map_save_interval_s,
            dir: params.map_save_dir.clone(),
            draw_pose_marker: params.draw_pose_marker,
            last_save: Mutex::new(None),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Directory scheduled saves are written into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Claim the right to save at `now`.
    ///
    /// Returns true, and restarts the interval, if saving is enabled and at least one interval has
    /// passed since the last successful claim.
    pub fn claim(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }

        let mut last_save = self
            .last_save
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let due = match *last_save {
            Some(last) => util::time::duration_to_seconds(now - last)
                .map(|s| s >= self.interval_s)
                .unwrap_or(true),
            None => true,
        };

        if due {
            *last_save = Some(now);
        }

        due
    }

    /// Path of a scheduled save made at `now`.
    pub fn scheduled_path(&self, now: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(format!("map_{}.png", now.format(MAP_FILE_TIMESTAMP_FORMAT)))
    }

    /// Render the snapshot and write it to `path` as a PNG.
    pub fn write(&self, snapshot: &GridSnapshot, path: &Path) -> Result<(), MappingError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MappingError::MapSaveIoError(path.to_path_buf(), e))?;
        }

        let image = if self.draw_pose_marker {
            snapshot.to_image_with_pose()
        } else {
            snapshot.to_image()
        };

        image
            .save(path)
            .map_err(|e| MappingError::MapSaveImageError(path.to_path_buf(), e))
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use util::time::{seconds_to_duration, Clock, ManualClock};

    fn schedule(enabled: bool) -> MapSaveSchedule {
        MapSaveSchedule::new(&DebugParams {
            map_save_enabled: enabled,
            map_save_interval_s: 5.0,
            ..Default::default()
        })
    }

    #[test]
    fn test_claim_throttles() {
        let clock = ManualClock::default();
        let schedule = schedule(true);

        assert!(schedule.claim(clock.now()));
        assert!(!schedule.claim(clock.now()));

        clock.advance_s(4.9);
        assert!(!schedule.claim(clock.now()));

        clock.advance_s(0.1);
        assert!(schedule.claim(clock.now()));
        assert!(!schedule.claim(clock.now() + seconds_to_duration(1.0)));
    }

    #[test]
    fn test_disabled() {
        let clock = ManualClock::default();
        let schedule = schedule(false);

        assert!(!schedule.claim(clock.now()));
        clock.advance_s(100.0);
        assert!(!schedule.claim(clock.now()));
    }

    #[test]
    fn test_scheduled_path() {
        let schedule = schedule(true);
        let time = DateTime::parse_from_rfc3339("2021-03-04T05:06:07.089Z")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(
            schedule.scheduled_path(time),
            PathBuf::from("maps/map_20210304_050607_089.png")
        );
    }
}
