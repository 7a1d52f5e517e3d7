//! # Scan frame assembly
//!
//! Groups the decoded samples into one frame per rotation of the rangefinder head. A rotation is
//! complete when the sample bearing wraps back through zero. After a gap in the stream (dropped
//! packets) any backwards step is taken as the wrap, since the missing samples may have hidden it.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::f64::consts::PI;

use log::{debug, warn};

use super::{ScanFrame, ScanSample};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Upper limit on the number of samples in one frame. A sensor which never wraps (a stalled head)
/// would otherwise grow the frame forever.
pub const MAX_FRAME_SAMPLES: usize = 4096;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug)]
pub struct ScanFrameAssembler {
    min_frame_samples: usize,

    current: Vec<ScanSample>,

    last_angle_rad: Option<f64>,

    /// Packets were lost since the last pushed samples
    gap: bool,

    frames_skipped: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ScanFrameAssembler {
    /// Create a new assembler, frames with fewer than `min_frame_samples` samples are discarded.
    pub fn new(min_frame_samples: usize) -> Self {
        Self {
            min_frame_samples,
            current: Vec::new(),
            last_angle_rad: None,
            gap: false,
            frames_skipped: 0,
        }
    }

    /// Add samples to the frame in progress, returning every frame completed by them.
    pub fn push(&mut self, samples: &[ScanSample]) -> Vec<ScanFrame> {
        let mut frames = Vec::new();

        for sample in samples {
            let wrapped = match self.last_angle_rad {
                Some(last) => {
                    last - sample.angle_rad > PI || (self.gap && sample.angle_rad < last)
                }
                None => false,
            };

            if wrapped {
                self.complete(&mut frames);
            } else if self.current.len() >= MAX_FRAME_SAMPLES {
                warn!(
                    "No sweep boundary after {} samples, forcing frame completion",
                    MAX_FRAME_SAMPLES
                );
                self.complete(&mut frames);
            }

            self.last_angle_rad = Some(sample.angle_rad);
            self.current.push(*sample);
        }

        if !samples.is_empty() {
            self.gap = false;
        }

        frames
    }

    /// Note that packets were lost before the next samples to be pushed.
    pub fn mark_gap(&mut self) {
        self.gap = true;
    }

    /// Drop the frame in progress.
    pub fn reset(&mut self) {
        self.current.clear();
        self.last_angle_rad = None;
        self.gap = false;
    }

    /// Number of frames discarded for being too short.
    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    fn complete(&mut self, frames: &mut Vec<ScanFrame>) {
        let samples = std::mem::take(&mut self.current);

        if samples.len() < self.min_frame_samples {
            debug!(
                "Discarding short scan frame ({} < {} samples)",
                samples.len(),
                self.min_frame_samples
            );
            self.frames_skipped += 1;
        } else {
            frames.push(ScanFrame::from(samples));
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn sample(angle_deg: f64) -> ScanSample {
        ScanSample {
            angle_rad: angle_deg.to_radians(),
            distance_m: 1.0,
            quality: 100,
            timestamp_ms: 0,
        }
    }

    fn sweep(start_deg: f64, end_deg: f64, step_deg: f64) -> Vec<ScanSample> {
        let mut samples = Vec::new();
        let mut a = start_deg;
        while a < end_deg {
            samples.push(sample(a));
            a += step_deg;
        }
        samples
    }

    #[test]
    fn test_frames_on_wrap() {
        let mut asm = ScanFrameAssembler::new(10);

        // Partial sweep at start up is too short and is skipped
        assert!(asm.push(&sweep(350.0, 360.0, 2.0)).is_empty());

        // First full sweep completes the partial one
        let frames = asm.push(&sweep(0.0, 360.0, 1.0));
        assert!(frames.is_empty());
        assert_eq!(asm.frames_skipped(), 1);

        // Second sweep completes the first
        let frames = asm.push(&sweep(0.0, 360.0, 1.0));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 360);
        assert_eq!(frames[0].samples[0].angle_rad, 0.0);
    }

    #[test]
    fn test_small_backwards_steps_are_not_wraps() {
        let mut asm = ScanFrameAssembler::new(1);

        let samples = vec![sample(10.0), sample(9.0), sample(11.0), sample(200.0), sample(5.0)];
        let frames = asm.push(&samples);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 4);
    }

    #[test]
    fn test_wrap_hidden_by_gap() {
        let mut asm = ScanFrameAssembler::new(1);

        // Without a gap a backwards step of less than half a turn is not a wrap
        assert!(asm.push(&sweep(0.0, 300.0, 1.0)).is_empty());
        assert!(asm.push(&sweep(200.0, 210.0, 1.0)).is_empty());
        asm.reset();

        // Lost packets straddling zero: 300 degrees then 200 degrees of the next turn
        assert!(asm.push(&sweep(0.0, 300.0, 1.0)).is_empty());
        asm.mark_gap();
        let frames = asm.push(&sweep(200.0, 360.0, 1.0));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 300);

        // The gap only applies to the samples which follow it
        assert!(asm.push(&[sample(350.0)]).is_empty());
    }

    #[test]
    fn test_reset() {
        let mut asm = ScanFrameAssembler::new(1);

        asm.push(&sweep(0.0, 180.0, 1.0));
        asm.reset();

        // With no previous angle the next sample cannot complete a frame
        assert!(asm.push(&[sample(1.0)]).is_empty());
        let frames = asm.push(&[sample(300.0), sample(2.0)]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 2);
    }

    #[test]
    fn test_frame_size_limit() {
        let mut asm = ScanFrameAssembler::new(1);

        let samples: Vec<ScanSample> = (0..MAX_FRAME_SAMPLES + 10).map(|_| sample(45.0)).collect();
        let frames = asm.push(&samples);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), MAX_FRAME_SAMPLES);
    }
}
