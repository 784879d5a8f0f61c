//! Evenly spaced frame selection

use image::RgbImage;
use tracing::{debug, warn};

use super::VideoDecoder;

/// Stride between sampled source frames: `max(1, total / max_frames)`.
/// Unknown or zero totals sample every frame.
pub fn sampling_step(total_frames: Option<u64>, max_frames: usize) -> u64 {
    match total_frames {
        Some(total) if total > 0 && max_frames > 0 => (total / max_frames as u64).max(1),
        _ => 1,
    }
}

/// A frame picked by the sampler
#[derive(Debug, Clone)]
pub struct SampledFrame {
    /// Zero-based index of the frame in the source stream
    pub source_index: u64,
    pub image: RgbImage,
}

/// Lazy iterator over every `step`-th frame of a decoder, stopping after
/// `max_frames` emissions or at end of stream
pub struct FrameSampler {
    decoder: Box<dyn VideoDecoder>,
    step: u64,
    max_frames: usize,
    position: u64,
    emitted: usize,
    finished: bool,
}

impl FrameSampler {
    pub fn new(decoder: Box<dyn VideoDecoder>, max_frames: usize) -> Self {
        let total = decoder.frame_count();
        let step = sampling_step(total, max_frames);
        debug!(
            "Sampling {:?} source frames with step {} (max {})",
            total, step, max_frames
        );

        Self {
            decoder,
            step,
            max_frames,
            position: 0,
            emitted: 0,
            finished: max_frames == 0,
        }
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    /// Source frame rate, if the decoder reports one
    pub fn frame_rate(&self) -> Option<f64> {
        self.decoder.frame_rate()
    }

    pub fn total_frames(&self) -> Option<u64> {
        self.decoder.frame_count()
    }
}

impl Iterator for FrameSampler {
    type Item = SampledFrame;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let frame = match self.decoder.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    self.finished = true;
                    break;
                }
                Err(e) => {
                    warn!("Stopping frame sampling at frame {}: {}", self.position, e);
                    self.finished = true;
                    break;
                }
            };

            let index = self.position;
            self.position += 1;

            if index % self.step == 0 {
                self.emitted += 1;
                if self.emitted >= self.max_frames {
                    self.finished = true;
                }
                return Some(SampledFrame {
                    source_index: index,
                    image: frame,
                });
            }
        }
        None
    }
}
