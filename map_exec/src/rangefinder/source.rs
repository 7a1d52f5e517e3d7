//! # Rangefinder byte sources
//!
//! A [`ScanSource`] produces the raw rangefinder byte stream. [`DeviceSource`] reads it from a
//! device node (or a recorded capture), [`SyntheticSource`] encodes packets for a simulated
//! vehicle standing in a rectangular room.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    fs::{File, OpenOptions},
    io::{self, ErrorKind, Read},
    path::PathBuf,
    sync::{Arc, Mutex},
};

use log::info;
use serde::Deserialize;

use crate::loc::Pose;
use util::time::Clock;

#[cfg(feature = "sim")]
use chrono::{DateTime, Utc};
#[cfg(feature = "sim")]
use nalgebra::Vector2;
#[cfg(feature = "sim")]
use noise::{NoiseFn, Perlin};
#[cfg(feature = "sim")]
use std::sync::PoisonError;

#[cfg(feature = "sim")]
use super::packet::{Packet, RawPoint, POINTS_PER_PACKET};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Maximum number of packets the synthetic source generates in one go. If the caller falls further
/// behind than this the missing packets are skipped.
#[cfg(feature = "sim")]
const MAX_SYNTHETIC_BURST: u64 = 256;

/// Quality reported for every synthetic return.
#[cfg(feature = "sim")]
const SYNTHETIC_QUALITY: u8 = 200;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A producer of rangefinder bytes.
pub trait ScanSource: Send {
    /// Read whatever bytes are currently available into `buf`, returning the number read.
    ///
    /// Returns `Ok(0)` if no bytes are available right now.
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Human readable description of the source, for logging.
    fn describe(&self) -> String;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Reads the rangefinder stream from a device path.
///
/// The serial line is expected to have been configured (baud rate, read timeout) before the
/// source is opened.
pub struct DeviceSource {
    path: PathBuf,
    file: File,
}

/// Parameters of the simulated room seen by the [`SyntheticSource`].
#[derive(Debug, Clone, Deserialize)]
pub struct SyntheticParams {
    /// Extent of the room along the world X axis, centred on the origin.
    ///
    /// Units: meters
    pub room_width_m: f64,

    /// Extent of the room along the world Y axis, centred on the origin.
    ///
    /// Units: meters
    pub room_height_m: f64,

    /// Rotation rate of the simulated head.
    ///
    /// Units: Hertz
    pub rotation_hz: f64,

    /// Number of points in one rotation, rounded down to a whole number of packets.
    pub points_per_rev: usize,

    /// Amplitude of the Perlin noise added to every range.
    ///
    /// Units: meters
    pub noise_amplitude_m: f64,

    /// Walls further away than this produce no return (a zero distance).
    ///
    /// Units: meters
    pub max_range_m: f64,
}

/// Encodes rangefinder packets for a simulated vehicle inside a rectangular room.
///
/// Packets are produced at the rate a real head would produce them, measured with the given
/// clock, so that frames line up with odometry fed in over the same period.
#[cfg(feature = "sim")]
pub struct SyntheticSource {
    params: SyntheticParams,

    /// Pose of the simulated vehicle, updated by whoever drives the simulation.
    sim_pose: Arc<Mutex<Pose>>,

    clock: Arc<dyn Clock>,

    start_time: DateTime<Utc>,

    packets_per_rev: u64,

    packets_sent: u64,

    perlin: Perlin,

    pending: Vec<u8>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Selects where the rangefinder bytes come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanSourceParams {
    /// Read from a device node or recorded capture file
    Device { path: String },

    /// Generate packets of a simulated room
    Synthetic(SyntheticParams),
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Could not open rangefinder device {0:?}: {1}")]
    DeviceOpenError(PathBuf, io::Error),

    #[error("The synthetic source was requested but the \"sim\" feature is disabled")]
    SimNotEnabled,

    #[error("Invalid synthetic source parameters: {0}")]
    InvalidSyntheticParams(&'static str),
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Open the source described by the parameters.
///
/// `sim_pose` and `clock` are only used by the synthetic source.
pub fn open_source(
    params: &ScanSourceParams,
    sim_pose: Arc<Mutex<Pose>>,
    clock: Arc<dyn Clock>,
) -> Result<Box<dyn ScanSource>, SourceError> {
    match params {
        ScanSourceParams::Device { path } => Ok(Box::new(DeviceSource::open(path)?)),
        #[cfg(feature = "sim")]
        ScanSourceParams::Synthetic(p) => Ok(Box::new(SyntheticSource::new(
            p.clone(),
            sim_pose,
            clock,
        )?)),
        #[cfg(not(feature = "sim"))]
        ScanSourceParams::Synthetic(_) => {
            let _ = (sim_pose, clock);
            Err(SourceError::SimNotEnabled)
        }
    }
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DeviceSource {
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, SourceError> {
        let path = path.into();

        let file = OpenOptions::new()
            .read(true)
            .open(&path)
            .map_err(|e| SourceError::DeviceOpenError(path.clone(), e))?;

        info!("Opened rangefinder device {:?}", path);

        Ok(Self { path, file })
    }
}

impl ScanSource for DeviceSource {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.file.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    fn describe(&self) -> String {
        format!("device {:?}", self.path)
    }
}

#[cfg(feature = "sim")]
impl SyntheticSource {
    pub fn new(
        params: SyntheticParams,
        sim_pose: Arc<Mutex<Pose>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SourceError> {
        let packets_per_rev = (params.points_per_rev / POINTS_PER_PACKET) as u64;

        if packets_per_rev == 0 {
            return Err(SourceError::InvalidSyntheticParams(
                "points_per_rev must be at least one packet",
            ));
        }
        if !(params.rotation_hz > 0.0 && params.rotation_hz.is_finite()) {
            return Err(SourceError::InvalidSyntheticParams(
                "rotation_hz must be positive",
            ));
        }
        if !(params.room_width_m > 0.0 && params.room_height_m > 0.0) {
            return Err(SourceError::InvalidSyntheticParams(
                "room dimensions must be positive",
            ));
        }

        let start_time = clock.now();

        Ok(Self {
            params,
            sim_pose,
            clock,
            start_time,
            packets_per_rev,
            packets_sent: 0,
            perlin: Perlin::new(),
            pending: Vec::new(),
        })
    }

    /// Generate the packets which are due since the last call.
    fn generate(&mut self) {
        let elapsed_s =
            util::time::duration_to_seconds(self.clock.now() - self.start_time).unwrap_or(0.0);

        let due = (elapsed_s * self.params.rotation_hz * self.packets_per_rev as f64).floor() as u64;
        let behind = due.saturating_sub(self.packets_sent);
        let count = behind.min(MAX_SYNTHETIC_BURST);

        // Skip what we can't produce
        self.packets_sent += behind - count;

        let pose = *self
            .sim_pose
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        for _ in 0..count {
            let packet = self.next_packet(&pose, elapsed_s);
            self.pending.extend_from_slice(&packet.encode());
        }
    }

    fn next_packet(&mut self, pose: &Pose, elapsed_s: f64) -> Packet {
        let points_per_rev = (self.packets_per_rev as usize * POINTS_PER_PACKET) as f64;
        let step_deg = 360.0 / points_per_rev;
        let index = (self.packets_sent % self.packets_per_rev) as usize;
        let start_deg = (index * POINTS_PER_PACKET) as f64 * step_deg;
        let end_deg = start_deg + (POINTS_PER_PACKET - 1) as f64 * step_deg;

        let mut points = [RawPoint::default(); POINTS_PER_PACKET];
        for (i, point) in points.iter_mut().enumerate() {
            let angle_rad = (start_deg + i as f64 * step_deg).to_radians();
            let range_m = self.range_to_wall(&pose.position_m, pose.heading_rad + angle_rad);

            if range_m <= self.params.max_range_m {
                let noise = self.perlin.get([angle_rad * 4.0, elapsed_s * 0.5])
                    * self.params.noise_amplitude_m;
                let distance_mm = ((range_m + noise).max(0.0) * 1000.0).round();

                point.distance_mm = distance_mm.min(u16::MAX as f64) as u16;
                point.quality = SYNTHETIC_QUALITY;
            }
        }

        self.packets_sent += 1;

        Packet {
            speed_degs: (self.params.rotation_hz * 360.0).round() as u16,
            start_angle_cdeg: to_cdeg(start_deg),
            points,
            end_angle_cdeg: to_cdeg(end_deg),
            timestamp_ms: ((elapsed_s * 1000.0) as u64 % 30_000) as u16,
        }
    }

    /// Distance along the given world bearing to the nearest wall of the room.
    fn range_to_wall(&self, position_m: &Vector2<f64>, bearing_rad: f64) -> f64 {
        let half_w = self.params.room_width_m / 2.0;
        let half_h = self.params.room_height_m / 2.0;
        let (dx, dy) = (bearing_rad.cos(), bearing_rad.sin());

        let tx = if dx > f64::EPSILON {
            (half_w - position_m.x) / dx
        } else if dx < -f64::EPSILON {
            (-half_w - position_m.x) / dx
        } else {
            f64::INFINITY
        };

        let ty = if dy > f64::EPSILON {
            (half_h - position_m.y) / dy
        } else if dy < -f64::EPSILON {
            (-half_h - position_m.y) / dy
        } else {
            f64::INFINITY
        };

        tx.min(ty).max(0.0)
    }
}

#[cfg(feature = "sim")]
impl ScanSource for SyntheticSource {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            self.generate();
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);

        Ok(n)
    }

    fn describe(&self) -> String {
        format!(
            "synthetic {}x{} m room",
            self.params.room_width_m, self.params.room_height_m
        )
    }
}

/// Degrees to the packet's hundredths of a degree, wrapped to one turn.
#[cfg(feature = "sim")]
fn to_cdeg(deg: f64) -> u16 {
    ((deg * 100.0).round() as u64 % 36_000) as u16
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(all(test, feature = "sim"))]
mod test {
    use super::*;
    use crate::rangefinder::{RangeScanDecoder, ScanFrameAssembler};
    use util::time::ManualClock;

    fn params() -> SyntheticParams {
        SyntheticParams {
            room_width_m: 8.0,
            room_height_m: 6.0,
            rotation_hz: 10.0,
            points_per_rev: 360,
            noise_amplitude_m: 0.0,
            max_range_m: 12.0,
        }
    }

    fn read_all(source: &mut dyn ScanSource) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 100];
        loop {
            let n = source.read_bytes(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[test]
    fn test_synthetic_rate() {
        let clock = ManualClock::default();
        let pose = Arc::new(Mutex::new(Pose::default()));
        let mut source =
            SyntheticSource::new(params(), pose, Arc::new(clock.clone())).unwrap();

        // Nothing is due before any time has passed
        assert!(read_all(&mut source).is_empty());

        // 10 Hz with 30 packets per rev is 300 packets per second
        clock.advance_s(0.1);
        let bytes = read_all(&mut source);
        assert_eq!(bytes.len(), 30 * 47);

        let mut decoder = RangeScanDecoder::new();
        assert_eq!(decoder.feed(&bytes).len(), 360);
        assert_eq!(decoder.stats().dropped_packets, 0);
    }

    #[test]
    fn test_synthetic_ranges() {
        let clock = ManualClock::default();
        let pose = Arc::new(Mutex::new(Pose::new(1.0, 0.0, 0.0)));
        let mut source =
            SyntheticSource::new(params(), pose, Arc::new(clock.clone())).unwrap();

        // Two full rotations so that one complete frame comes out
        clock.advance_s(0.2);
        let bytes = read_all(&mut source);

        let mut decoder = RangeScanDecoder::new();
        let mut assembler = ScanFrameAssembler::new(100);
        let frames = assembler.push(&decoder.feed(&bytes));
        assert_eq!(frames.len(), 1);

        let frame = &frames[0];
        assert_eq!(frame.len(), 360);

        // Forward hits the wall at x = 4, left hits y = 3
        assert!((frame.samples[0].distance_m - 3.0).abs() < 1e-3);
        assert!((frame.samples[90].distance_m - 3.0).abs() < 1e-3);
        assert!((frame.samples[180].distance_m - 5.0).abs() < 1e-3);
    }

    #[test]
    fn test_device_source_missing() {
        assert!(matches!(
            DeviceSource::open("/this/device/does/not/exist"),
            Err(SourceError::DeviceOpenError(_, _))
        ));
    }

    #[test]
    fn test_device_source_replay() {
        let path = std::env::temp_dir().join(format!("map_lib_capture_{}", std::process::id()));
        let packet = crate::rangefinder::packet::test::uniform_packet(0, 1100, 1500);
        std::fs::write(&path, packet.encode()).unwrap();

        let mut source = DeviceSource::open(&path).unwrap();
        let bytes = read_all(&mut source);
        assert_eq!(bytes.len(), 47);

        let mut decoder = RangeScanDecoder::new();
        assert_eq!(decoder.feed(&bytes).len(), 12);

        std::fs::remove_file(&path).unwrap();
    }
}
