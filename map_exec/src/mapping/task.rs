//! # Mapping task
//!
//! Runs a [`MappingCoordinator`] in its own thread. Producers (the rangefinder reader, the
//! odometry source) submit events through a [`MappingHandle`], which the thread applies in the
//! order they were sent. Readers use the same handle to take copies of the pose and map.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel, Receiver, RecvTimeoutError, Sender},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{info, warn};

use super::{MappingCoordinator, MappingError, MappingReader, MappingStatus};
use crate::{loc::Pose, map::GridSnapshot, odom::OdometrySample};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Period at which the communication fault is checked, whether or not events arrive.
const COMMS_CHECK_PERIOD: Duration = Duration::from_millis(50);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The running mapping thread.
pub struct MappingTask {
    run: Arc<AtomicBool>,

    jh: Option<JoinHandle<MappingCoordinator>>,
}

/// Submits events to, and reads state from, a running [`MappingTask`].
#[derive(Clone)]
pub struct MappingHandle {
    sender: Sender<MappingEvent>,

    reader: MappingReader,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum MappingEvent {
    /// Raw rangefinder bytes
    Scan(Vec<u8>),

    /// One odometry sample
    Odometry(OdometrySample),

    /// Return the vehicle to its initial pose
    ResetPose,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MappingTask {
    /// Start the mapping thread, which takes ownership of the coordinator.
    pub fn spawn(coordinator: MappingCoordinator) -> Result<(Self, MappingHandle), MappingError> {
        let (sender, receiver) = channel();
        let run = Arc::new(AtomicBool::new(true));
        let reader = coordinator.shared();

        let run_clone = run.clone();
        let jh = thread::Builder::new()
            .name("mapping".into())
            .spawn(move || mapping_thread(coordinator, receiver, run_clone))
            .map_err(MappingError::TaskSpawnError)?;

        info!("Mapping task started");

        Ok((
            Self { run, jh: Some(jh) },
            MappingHandle { sender, reader },
        ))
    }

    /// Stop the thread once every event already submitted has been applied, returning the
    /// coordinator.
    pub fn stop(mut self) -> Result<MappingCoordinator, MappingError> {
        self.run.store(false, Ordering::Relaxed);

        let jh = self.jh.take().ok_or(MappingError::TaskStopped)?;
        let coordinator = jh.join().map_err(|_| MappingError::TaskPanicked)?;

        info!("Mapping task stopped");

        Ok(coordinator)
    }
}

impl Drop for MappingTask {
    fn drop(&mut self) {
        self.run.store(false, Ordering::Relaxed);

        if let Some(jh) = self.jh.take() {
            if jh.join().is_err() {
                warn!("Mapping task panicked");
            }
        }
    }
}

impl MappingHandle {
    pub fn submit(&self, event: MappingEvent) -> Result<(), MappingError> {
        self.sender
            .send(event)
            .map_err(|_| MappingError::TaskStopped)
    }

    pub fn submit_scan(&self, bytes: Vec<u8>) -> Result<(), MappingError> {
        self.submit(MappingEvent::Scan(bytes))
    }

    pub fn submit_odometry(&self, sample: OdometrySample) -> Result<(), MappingError> {
        self.submit(MappingEvent::Odometry(sample))
    }

    pub fn reset_pose(&self) -> Result<(), MappingError> {
        self.submit(MappingEvent::ResetPose)
    }

    pub fn reader(&self) -> &MappingReader {
        &self.reader
    }

    pub fn get_pose(&self) -> Pose {
        self.reader.get_pose()
    }

    pub fn get_map_snapshot(&self) -> GridSnapshot {
        self.reader.get_map_snapshot()
    }

    pub fn status(&self) -> MappingStatus {
        self.reader.status()
    }

    pub fn save_map<P: AsRef<Path>>(&self, path: P) -> Result<bool, MappingError> {
        self.reader.save_map(path)
    }

    pub fn maybe_save_map(&self) -> Result<Option<PathBuf>, MappingError> {
        self.reader.maybe_save_map()
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn mapping_thread(
    mut coordinator: MappingCoordinator,
    receiver: Receiver<MappingEvent>,
    run: Arc<AtomicBool>,
) -> MappingCoordinator {
    let mut next_check = Instant::now() + COMMS_CHECK_PERIOD;

    while run.load(Ordering::Relaxed) {
        let timeout = next_check.saturating_duration_since(Instant::now());

        match receiver.recv_timeout(timeout) {
            Ok(event) => handle_event(&mut coordinator, event),
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => break,
        }

        // A steady stream of events must not hold off the check
        if Instant::now() >= next_check {
            coordinator.check_comms();
            next_check = Instant::now() + COMMS_CHECK_PERIOD;
        }
    }

    // Apply anything submitted before the stop
    for event in receiver.try_iter() {
        handle_event(&mut coordinator, event);
    }

    coordinator
}

fn handle_event(coordinator: &mut MappingCoordinator, event: MappingEvent) {
    match event {
        MappingEvent::Scan(bytes) => coordinator.ingest_scan(&bytes),
        MappingEvent::Odometry(sample) => coordinator.ingest_odometry(&sample),
        MappingEvent::ResetPose => coordinator.reset_pose(),
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::mapping::{params::test::test_params, test::rotation_bytes};
    use util::time::ManualClock;

    fn spawn() -> (MappingTask, MappingHandle) {
        let coordinator =
            MappingCoordinator::new(test_params(), Arc::new(ManualClock::default())).unwrap();
        MappingTask::spawn(coordinator).unwrap()
    }

    #[test]
    fn test_events_applied_in_order() {
        let (task, handle) = spawn();

        for _ in 0..10 {
            handle
                .submit_odometry(OdometrySample::Velocity {
                    linear_ms: 0.1,
                    angular_rads: 0.0,
                    dt_s: 1.0,
                })
                .unwrap();
        }
        handle.submit_scan(rotation_bytes(2000)).unwrap();
        handle.submit_scan(rotation_bytes(2000)).unwrap();

        let coordinator = task.stop().unwrap();

        // Every queued event was applied before the thread exited
        assert!((coordinator.get_pose().x() - 1.0).abs() < 1e-9);
        assert_eq!(coordinator.status().frames_processed, 1);

        // The handle still reads the shared state
        assert!((handle.get_pose().x() - 1.0).abs() < 1e-9);
        assert_eq!(handle.status().frames_processed, 1);
        assert!(handle.get_map_snapshot().counts().2 > 0);
    }

    #[test]
    fn test_reset_event() {
        let (task, handle) = spawn();

        handle
            .submit_odometry(OdometrySample::Velocity {
                linear_ms: 1.0,
                angular_rads: 1.0,
                dt_s: 1.0,
            })
            .unwrap();
        handle.reset_pose().unwrap();

        task.stop().unwrap();
        assert_eq!(handle.get_pose(), Pose::default());
    }

    #[test]
    fn test_comm_fault_under_odometry_stream() {
        let clock = ManualClock::default();
        let coordinator =
            MappingCoordinator::new(test_params(), Arc::new(clock.clone())).unwrap();
        let (task, handle) = MappingTask::spawn(coordinator).unwrap();

        // Odometry every 20 ms, faster than the check period, and no rangefinder bytes at all
        for _ in 0..100 {
            handle
                .submit_odometry(OdometrySample::Velocity {
                    linear_ms: 0.1,
                    angular_rads: 0.0,
                    dt_s: 0.02,
                })
                .unwrap();
            clock.advance_s(0.02);
            thread::sleep(Duration::from_millis(20));
        }

        assert!(handle.status().comm_fault);

        task.stop().unwrap();
    }

    #[test]
    fn test_submit_after_stop() {
        let (task, handle) = spawn();
        task.stop().unwrap();

        assert!(matches!(
            handle.submit_scan(vec![0x54]),
            Err(MappingError::TaskStopped)
        ));
    }

    #[test]
    fn test_handles_are_shareable() {
        let (task, handle) = spawn();

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let h = handle.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        h.submit_odometry(OdometrySample::Velocity {
                            linear_ms: 0.01,
                            angular_rads: 0.0,
                            dt_s: 1.0,
                        })
                        .unwrap();
                        let _ = h.get_pose();
                    }
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }

        task.stop().unwrap();
        assert!((handle.get_pose().x() - 1.0).abs() < 1e-9);
    }
}
