//! # Rangefinder packet format
//!
//! The rangefinder streams fixed-length little-endian packets:
//!
//! ```text
//! ┌──────┬─────────┬───────┬─────────────┬──────────────────────┬───────────┬───────────┬──────┐
//! │ 0x54 │ VER_LEN │ speed │ start angle │ 12 × (dist, quality) │ end angle │ timestamp │ CRC8 │
//! │  1   │    1    │   2   │      2      │        12 × 3        │     2     │     2     │  1   │
//! └──────┴─────────┴───────┴─────────────┴──────────────────────┴───────────┴───────────┴──────┘
//! ```
//!
//! Angles are in hundredths of a degree, distances in millimeters, speed in degrees per second and
//! the timestamp in (wrapping) milliseconds. The CRC covers every byte before it.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use byteorder::{ByteOrder, LittleEndian};

use super::ScanSample;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Packet header (sync) byte.
pub const HEADER: u8 = 0x54;

/// Version/length byte: packet type 1 in the top 3 bits, point count in the bottom 5.
pub const VER_LEN: u8 = 0x2C;

/// Number of measurement points in one packet.
pub const POINTS_PER_PACKET: usize = 12;

/// Total length of one packet in bytes.
pub const PACKET_LEN: usize = 47;

const START_ANGLE_OFFSET: usize = 4;
const POINTS_OFFSET: usize = 6;
const POINT_LEN: usize = 3;
const END_ANGLE_OFFSET: usize = 42;
const TIMESTAMP_OFFSET: usize = 44;
const CRC_OFFSET: usize = 46;

/// CRC8 lookup table used by the rangefinder.
const CRC_TABLE: [u8; 256] = [
    0x00, 0x4d, 0x9a, 0xd7, 0x79, 0x34, 0xe3, 0xae, 0xf2, 0xbf, 0x68, 0x25, 0x8b, 0xc6, 0x11, 0x5c,
    0xa9, 0xe4, 0x33, 0x7e, 0xd0, 0x9d, 0x4a, 0x07, 0x5b, 0x16, 0xc1, 0x8c, 0x22, 0x6f, 0xb8, 0xf5,
    0x1f, 0x52, 0x85, 0xc8, 0x66, 0x2b, 0xfc, 0xb1, 0xed, 0xa0, 0x77, 0x3a, 0x94, 0xd9, 0x0e, 0x43,
    0xb6, 0xfb, 0x2c, 0x61, 0xcf, 0x82, 0x55, 0x18, 0x44, 0x09, 0xde, 0x93, 0x3d, 0x70, 0xa7, 0xea,
    0x3e, 0x73, 0xa4, 0xe9, 0x47, 0x0a, 0xdd, 0x90, 0xcc, 0x81, 0x56, 0x1b, 0xb5, 0xf8, 0x2f, 0x62,
    0x97, 0xda, 0x0d, 0x40, 0xee, 0xa3, 0x74, 0x39, 0x65, 0x28, 0xff, 0xb2, 0x1c, 0x51, 0x86, 0xcb,
    0x21, 0x6c, 0xbb, 0xf6, 0x58, 0x15, 0xc2, 0x8f, 0xd3, 0x9e, 0x49, 0x04, 0xaa, 0xe7, 0x30, 0x7d,
    0x88, 0xc5, 0x12, 0x5f, 0xf1, 0xbc, 0x6b, 0x26, 0x7a, 0x37, 0xe0, 0xad, 0x03, 0x4e, 0x99, 0xd4,
    0x7c, 0x31, 0xe6, 0xab, 0x05, 0x48, 0x9f, 0xd2, 0x8e, 0xc3, 0x14, 0x59, 0xf7, 0xba, 0x6d, 0x20,
    0xd5, 0x98, 0x4f, 0x02, 0xac, 0xe1, 0x36, 0x7b, 0x27, 0x6a, 0xbd, 0xf0, 0x5e, 0x13, 0xc4, 0x89,
    0x63, 0x2e, 0xf9, 0xb4, 0x1a, 0x57, 0x80, 0xcd, 0x91, 0xdc, 0x0b, 0x46, 0xe8, 0xa5, 0x72, 0x3f,
    0xca, 0x87, 0x50, 0x1d, 0xb3, 0xfe, 0x29, 0x64, 0x38, 0x75, 0xa2, 0xef, 0x41, 0x0c, 0xdb, 0x96,
    0x42, 0x0f, 0xd8, 0x95, 0x3b, 0x76, 0xa1, 0xec, 0xb0, 0xfd, 0x2a, 0x67, 0xc9, 0x84, 0x53, 0x1e,
    0xeb, 0xa6, 0x71, 0x3c, 0x92, 0xdf, 0x08, 0x45, 0x19, 0x54, 0x83, 0xce, 0x60, 0x2d, 0xfa, 0xb7,
    0x5d, 0x10, 0xc7, 0x8a, 0x24, 0x69, 0xbe, 0xf3, 0xaf, 0xe2, 0x35, 0x78, 0xd6, 0x9b, 0x4c, 0x01,
    0xf4, 0xb9, 0x6e, 0x23, 0x8d, 0xc0, 0x17, 0x5a, 0x06, 0x4b, 0x9c, 0xd1, 0x7f, 0x32, 0xe5, 0xa8,
];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single measurement point inside a packet, in raw sensor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawPoint {
    /// Units: millimeters
    pub distance_mm: u16,

    /// Return intensity
    pub quality: u8,
}

/// One decoded rangefinder packet, in raw sensor units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Rotation speed of the head.
    ///
    /// Units: degrees/second
    pub speed_degs: u16,

    /// Angle of the first point.
    ///
    /// Units: hundredths of a degree
    pub start_angle_cdeg: u16,

    /// The measurements, evenly spaced between the start and end angles
    pub points: [RawPoint; POINTS_PER_PACKET],

    /// Angle of the last point.
    ///
    /// Units: hundredths of a degree
    pub end_angle_cdeg: u16,

    /// Sensor timestamp, wraps every 30 seconds.
    ///
    /// Units: milliseconds
    pub timestamp_ms: u16,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Reasons a candidate packet is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("Expected 47 bytes, got {0}")]
    WrongLength(usize),

    #[error("Expected header byte 0x54, got {0:#04x}")]
    BadHeader(u8),

    #[error("Expected ver/len byte 0x2C, got {0:#04x}")]
    BadVerLen(u8),

    #[error("Checksum mismatch (computed {computed:#04x}, packet {received:#04x})")]
    BadChecksum { computed: u8, received: u8 },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Packet {
    /// Parse a packet from exactly [`PACKET_LEN`] bytes.
    pub fn parse(raw: &[u8]) -> Result<Self, PacketError> {
        if raw.len() != PACKET_LEN {
            return Err(PacketError::WrongLength(raw.len()));
        }
        if raw[0] != HEADER {
            return Err(PacketError::BadHeader(raw[0]));
        }
        if raw[1] != VER_LEN {
            return Err(PacketError::BadVerLen(raw[1]));
        }

        let computed = crc8(&raw[..CRC_OFFSET]);
        if computed != raw[CRC_OFFSET] {
            return Err(PacketError::BadChecksum {
                computed,
                received: raw[CRC_OFFSET],
            });
        }

        let mut points = [RawPoint::default(); POINTS_PER_PACKET];
        for (i, point) in points.iter_mut().enumerate() {
            let offset = POINTS_OFFSET + i * POINT_LEN;
            point.distance_mm = LittleEndian::read_u16(&raw[offset..]);
            point.quality = raw[offset + 2];
        }

        Ok(Self {
            speed_degs: LittleEndian::read_u16(&raw[2..]),
            start_angle_cdeg: LittleEndian::read_u16(&raw[START_ANGLE_OFFSET..]),
            points,
            end_angle_cdeg: LittleEndian::read_u16(&raw[END_ANGLE_OFFSET..]),
            timestamp_ms: LittleEndian::read_u16(&raw[TIMESTAMP_OFFSET..]),
        })
    }

    /// Encode the packet into its wire representation, including the checksum.
    pub fn encode(&self) -> [u8; PACKET_LEN] {
        let mut raw = [0u8; PACKET_LEN];

        raw[0] = HEADER;
        raw[1] = VER_LEN;
        LittleEndian::write_u16(&mut raw[2..], self.speed_degs);
        LittleEndian::write_u16(&mut raw[START_ANGLE_OFFSET..], self.start_angle_cdeg);

        for (i, point) in self.points.iter().enumerate() {
            let offset = POINTS_OFFSET + i * POINT_LEN;
            LittleEndian::write_u16(&mut raw[offset..], point.distance_mm);
            raw[offset + 2] = point.quality;
        }

        LittleEndian::write_u16(&mut raw[END_ANGLE_OFFSET..], self.end_angle_cdeg);
        LittleEndian::write_u16(&mut raw[TIMESTAMP_OFFSET..], self.timestamp_ms);
        raw[CRC_OFFSET] = crc8(&raw[..CRC_OFFSET]);

        raw
    }

    /// Convert the packet's points into scan samples.
    ///
    /// Point angles are interpolated linearly between the start and end angles. If the end angle
    /// is smaller than the start angle the packet straddles the zero crossing and the end is
    /// unwrapped by a full turn before interpolating.
    pub fn samples(&self) -> Vec<ScanSample> {
        let start_deg = self.start_angle_cdeg as f64 / 100.0;
        let end_deg = self.end_angle_cdeg as f64 / 100.0;

        let mut span_deg = end_deg - start_deg;
        if span_deg < 0.0 {
            span_deg += 360.0;
        }
        let step_deg = span_deg / (POINTS_PER_PACKET - 1) as f64;

        self.points
            .iter()
            .enumerate()
            .map(|(i, point)| ScanSample {
                angle_rad: util::maths::wrap_2pi((start_deg + i as f64 * step_deg).to_radians()),
                distance_m: point.distance_mm as f64 / 1000.0,
                quality: point.quality,
                timestamp_ms: self.timestamp_ms,
            })
            .collect()
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Calculate the rangefinder's CRC8 of the given bytes.
pub fn crc8(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |crc, &b| CRC_TABLE[(crc ^ b) as usize])
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// Build a packet with every point at the same distance.
    pub(crate) fn uniform_packet(start_cdeg: u16, end_cdeg: u16, distance_mm: u16) -> Packet {
        Packet {
            speed_degs: 3600,
            start_angle_cdeg: start_cdeg,
            points: [RawPoint {
                distance_mm,
                quality: 200,
            }; POINTS_PER_PACKET],
            end_angle_cdeg: end_cdeg,
            timestamp_ms: 1000,
        }
    }

    #[test]
    fn test_crc8() {
        assert_eq!(crc8(&[]), 0x00);
        assert_eq!(crc8(&[0x00]), 0x00);
        assert_eq!(crc8(&[0x01]), 0x4d);
        assert_eq!(crc8(&[0x01, 0x01]), CRC_TABLE[(0x4d ^ 0x01) as usize]);
    }

    #[test]
    fn test_parse_encoded() {
        let mut packet = uniform_packet(1000, 2100, 1500);
        packet.points[3] = RawPoint {
            distance_mm: 0x1234,
            quality: 7,
        };

        let raw = packet.encode();
        assert_eq!(raw[0], HEADER);
        assert_eq!(raw[1], VER_LEN);
        // Little endian distance of point 3
        assert_eq!(raw[POINTS_OFFSET + 3 * POINT_LEN], 0x34);
        assert_eq!(raw[POINTS_OFFSET + 3 * POINT_LEN + 1], 0x12);

        assert_eq!(Packet::parse(&raw), Ok(packet));
    }

    #[test]
    fn test_parse_rejects() {
        let raw = uniform_packet(0, 1100, 1000).encode();

        assert_eq!(Packet::parse(&raw[..46]), Err(PacketError::WrongLength(46)));

        let mut bad = raw;
        bad[0] = 0x55;
        assert_eq!(Packet::parse(&bad), Err(PacketError::BadHeader(0x55)));

        let mut bad = raw;
        bad[1] = 0x2D;
        assert_eq!(Packet::parse(&bad), Err(PacketError::BadVerLen(0x2D)));

        let mut bad = raw;
        bad[10] ^= 0xFF;
        assert!(matches!(
            Packet::parse(&bad),
            Err(PacketError::BadChecksum { .. })
        ));
    }

    #[test]
    fn test_samples_interpolation() {
        // 10.00 to 21.00 degrees, one degree per point
        let samples = uniform_packet(1000, 2100, 2500).samples();

        assert_eq!(samples.len(), POINTS_PER_PACKET);
        for (i, s) in samples.iter().enumerate() {
            assert!((s.angle_rad - (10.0 + i as f64).to_radians()).abs() < 1e-9);
            assert_eq!(s.distance_m, 2.5);
            assert_eq!(s.quality, 200);
            assert_eq!(s.timestamp_ms, 1000);
        }
    }

    #[test]
    fn test_samples_across_zero() {
        // 354.50 to 5.50 degrees straddles the zero crossing
        let samples = uniform_packet(35450, 550, 1000).samples();

        assert!((samples[0].angle_rad - 354.5f64.to_radians()).abs() < 1e-9);
        assert!((samples[11].angle_rad - 5.5f64.to_radians()).abs() < 1e-9);

        for s in samples.iter() {
            assert!(s.angle_rad >= 0.0 && s.angle_rad < std::f64::consts::TAU);
        }
    }
}
