//! # Rangefinder stream decoder
//!
//! The decoder accepts arbitrarily sized chunks of the rangefinder byte stream and extracts every
//! complete, valid packet from them. Corrupted or misaligned data is never reported as an error,
//! the decoder drops a byte and hunts for the next header instead.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, trace};
use serde::Serialize;

use super::{
    packet::{Packet, PacketError, HEADER, PACKET_LEN, VER_LEN},
    ScanSample,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Decodes the rangefinder byte stream into scan samples.
#[derive(Debug, Default)]
pub struct RangeScanDecoder {
    /// Bytes received but not yet consumed, always starts at a candidate header once a header has
    /// been seen.
    buffer: Vec<u8>,

    /// Number of bytes at the start of the buffer which belong to a packet that was already
    /// dropped. Candidate headers inside those bytes are not counted as new dropped packets.
    rejected_len: usize,

    stats: DecoderStats,
}

/// Counters describing the health of the rangefinder stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecoderStats {
    /// Number of packets which passed all checks
    pub valid_packets: u64,

    /// Number of packets with a header byte which failed the length or checksum check
    pub dropped_packets: u64,

    /// Number of bytes skipped while searching for a packet header
    pub discarded_bytes: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RangeScanDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes to the stream and return the samples of every complete valid packet.
    ///
    /// Packets may be split across any number of calls.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ScanSample> {
        self.buffer.extend_from_slice(bytes);

        let mut samples = Vec::new();
        let mut pos = 0;
        let mut rejected_end = self.rejected_len;

        loop {
            // Hunt for the next header byte
            match self.buffer[pos..].iter().position(|&b| b == HEADER) {
                Some(skip) => {
                    self.stats.discarded_bytes += skip as u64;
                    pos += skip;
                }
                None => {
                    self.stats.discarded_bytes += (self.buffer.len() - pos) as u64;
                    pos = self.buffer.len();
                    break;
                }
            }

            // Reject a bad ver/len as soon as it is visible rather than waiting for a whole packet
            if pos + 1 < self.buffer.len() && self.buffer[pos + 1] != VER_LEN {
                if pos >= rejected_end {
                    self.stats.dropped_packets += 1;
                    rejected_end = pos + PACKET_LEN;
                    debug!(
                        "Dropped rangefinder packet, ver/len {:#04x} != {:#04x}",
                        self.buffer[pos + 1],
                        VER_LEN
                    );
                }
                self.stats.discarded_bytes += 1;
                pos += 1;
                continue;
            }

            if self.buffer.len() - pos < PACKET_LEN {
                break;
            }

            match Packet::parse(&self.buffer[pos..pos + PACKET_LEN]) {
                Ok(packet) => {
                    self.stats.valid_packets += 1;
                    samples.extend(packet.samples());
                    pos += PACKET_LEN;
                }
                Err(PacketError::BadChecksum { computed, received }) => {
                    if pos >= rejected_end {
                        self.stats.dropped_packets += 1;
                        rejected_end = pos + PACKET_LEN;
                        debug!(
                            "Dropped rangefinder packet, checksum {:#04x} != {:#04x}",
                            computed, received
                        );
                    } else {
                        trace!("Spurious header inside a rejected packet");
                    }
                    self.stats.discarded_bytes += 1;
                    pos += 1;
                }
                Err(e) => {
                    trace!("Rejected candidate packet: {}", e);
                    self.stats.discarded_bytes += 1;
                    pos += 1;
                }
            }
        }

        self.buffer.drain(..pos);
        self.rejected_len = rejected_end.saturating_sub(pos);

        samples
    }

    /// Discard any partially received packet.
    pub fn flush(&mut self) {
        if !self.buffer.is_empty() {
            debug!("Flushing {} buffered rangefinder bytes", self.buffer.len());
        }
        self.stats.discarded_bytes += self.buffer.len() as u64;
        self.buffer.clear();
        self.rejected_len = 0;
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Number of bytes held waiting for the rest of a packet.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
