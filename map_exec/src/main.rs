//! Mapping executable entry point.
//!
//! # Architecture
//!
//! The exec runs the mapping core in its own thread (see `map_lib::mapping::MappingTask`) and
//! acts as the producer for it:
//!
//!     - Initialise the session, logging and parameters
//!     - Open the rangefinder source (a device or the synthetic room)
//!     - Main loop:
//!         - Odometry acquisition (the simulated drive when using the synthetic room)
//!         - Rangefinder byte acquisition
//!         - Periodic map saving
//!         - Archiving and status reporting
//!     - Shutdown, saving the final pose, status and map into the session

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod cycle_archive;
mod params;
mod sim_drive;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use color_eyre::{eyre::WrapErr, Report};
use log::{debug, info, warn};

use map_lib::{
    loc::Pose,
    mapping::{MappingCoordinator, MappingParams, MappingTask},
    rangefinder::{self, ScanSourceParams},
};
use util::{
    archive::Archived,
    logger::{logger_init, LevelFilter},
    session::{self, Session},
    time::{Clock, SystemClock},
};

use cycle_archive::CycleArchive;
use params::MapExecParams;
use sim_drive::SimDrive;

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    let session = Session::new("map_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Occupancy Grid Mapping Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let exec_params: MapExecParams =
        util::params::load("map_exec.toml").wrap_err("Could not load exec params")?;
    exec_params.validate().wrap_err("Invalid exec params")?;

    let mut mapping_params: MappingParams =
        util::params::load("mapping.toml").wrap_err("Could not load mapping params")?;

    // Debug maps go into the session
    mapping_params.debug.map_save_dir = session
        .session_root
        .join(&mapping_params.debug.map_save_dir);

    info!("Exec parameters loaded");

    let cycle_period = Duration::from_secs_f64(exec_params.cycle_period_s);
    let cycle_freq = (1.0 / exec_params.cycle_period_s).round().max(1.0) as u64;

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let sim_pose = Arc::new(Mutex::new(Pose::default()));

    let mut source =
        rangefinder::open_source(&exec_params.scan_source, sim_pose.clone(), clock.clone())
            .wrap_err("Failed to open the rangefinder source")?;
    info!("Rangefinder source: {}", source.describe());

    let mut sim_drive = match exec_params.scan_source {
        ScanSourceParams::Synthetic(_) => {
            info!("Simulated drive: {:?}", exec_params.sim_drive);
            Some(SimDrive::new(
                exec_params.sim_drive,
                mapping_params.odometry.clone(),
                sim_pose,
            ))
        }
        ScanSourceParams::Device { .. } => None,
    };

    let draw_pose_marker = mapping_params.debug.draw_pose_marker;

    let coordinator = MappingCoordinator::new(mapping_params, clock)
        .wrap_err("Failed to initialise the mapping core")?;

    let (task, handle) =
        MappingTask::spawn(coordinator).wrap_err("Failed to start the mapping task")?;

    let mut archive = CycleArchive::new(&session).wrap_err("Failed to create the cycle archive")?;

    info!("Module initialisation complete\n");

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let mut read_buffer = vec![0u8; exec_params.read_buffer_len];
    let mut num_cycles: u64 = 0;
    let mut last_cycle_instant = Instant::now();

    loop {
        let cycle_start_instant = Instant::now();
        let cycle_dt_s = (cycle_start_instant - last_cycle_instant).as_secs_f64();
        last_cycle_instant = cycle_start_instant;

        let is_1_hz_cycle = num_cycles % cycle_freq == 0;

        // ---- ODOMETRY ----

        if let Some(ref mut drive) = sim_drive {
            handle
                .submit_odometry(drive.step(cycle_dt_s))
                .wrap_err("Mapping task stopped unexpectedly")?;
        }

        // ---- RANGEFINDER ----

        for _ in 0..exec_params.max_reads_per_cycle {
            match source.read_bytes(&mut read_buffer) {
                Ok(0) => break,
                Ok(n) => handle
                    .submit_scan(read_buffer[..n].to_vec())
                    .wrap_err("Mapping task stopped unexpectedly")?,
                Err(e) => {
                    warn!("Error reading from {}: {}", source.describe(), e);
                    break;
                }
            }
        }

        // ---- MAP SAVING ----

        match handle.maybe_save_map() {
            Ok(Some(path)) => debug!("Map saved to {:?}", path),
            Ok(None) => (),
            Err(e) => warn!("Could not save the map: {}", e),
        }

        // ---- WRITE ARCHIVES ----

        let pose = handle.get_pose();
        let status = handle.status();

        archive.update(&pose, &status);
        if let Err(e) = archive.write() {
            warn!("Could not write the cycle archive: {}", e);
        }

        if is_1_hz_cycle {
            info!(
                "Pose ({:.3}, {:.3}, {:.3}), {} frames, {} valid / {} dropped packets{}",
                pose.x(),
                pose.y(),
                pose.heading_rad,
                status.frames_processed,
                status.decoder.valid_packets,
                status.decoder.dropped_packets,
                if status.comm_fault { ", COMM FAULT" } else { "" }
            );
        }

        // ---- CYCLE MANAGEMENT ----

        num_cycles += 1;

        if let Some(run_duration_s) = exec_params.run_duration_s {
            if session::get_elapsed_seconds() >= run_duration_s {
                info!("Run duration of {:.02} s reached, stopping", run_duration_s);
                break;
            }
        }

        let cycle_dur = Instant::now() - cycle_start_instant;

        match cycle_period.checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => warn!(
                "Cycle overran by {:.06} s",
                cycle_dur.as_secs_f64() - cycle_period.as_secs_f64()
            ),
        }
    }

    // ---- SHUTDOWN ----

    let coordinator = task.stop().wrap_err("Failed to stop the mapping task")?;

    let snapshot = coordinator.get_map_snapshot();
    let (free, unknown, occupied) = snapshot.counts();
    info!(
        "Final map: {} unknown, {} free, {} occupied cells",
        unknown, free, occupied
    );

    session.save("mapping_tm.json", coordinator.status().to_tm());
    session.save("final_pose.json", snapshot.pose.to_tm(snapshot.timestamp));
    session.save("final_map.json", snapshot.to_map_frame());

    let image_path = session.session_root.join("final_map.png");
    let image = match draw_pose_marker {
        true => snapshot.to_image_with_pose(),
        false => snapshot.to_image(),
    };
    if let Err(e) = image.save(&image_path) {
        warn!("Could not save the final map to {:?}: {}", image_path, e);
    }

    info!("End of execution");

    session.exit();

    Ok(())
}
