//! In-memory decoder

use image::RgbImage;
use std::collections::VecDeque;
use std::path::Path;

use super::{VideoDecoder, VideoOpener};
use crate::error::VisionError;

/// Decoder over frames already held in memory
#[derive(Debug, Clone)]
pub struct MemoryDecoder {
    frames: VecDeque<RgbImage>,
    total: Option<u64>,
    fps: Option<f64>,
}

impl MemoryDecoder {
    pub fn new(frames: Vec<RgbImage>, fps: f64) -> Self {
        let total = Some(frames.len() as u64);
        Self {
            frames: frames.into(),
            total,
            fps: (fps.is_finite() && fps > 0.0).then_some(fps),
        }
    }

    /// Hide the frame count, as a container without an index would
    pub fn with_unknown_length(mut self) -> Self {
        self.total = None;
        self
    }

    /// Hide the frame rate
    pub fn with_unknown_rate(mut self) -> Self {
        self.fps = None;
        self
    }
}

impl VideoDecoder for MemoryDecoder {
    fn frame_count(&self) -> Option<u64> {
        self.total
    }

    fn frame_rate(&self) -> Option<f64> {
        self.fps
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, VisionError> {
        Ok(self.frames.pop_front())
    }
}

/// Opener that hands out a copy of a fixed decoder for any path
#[derive(Debug, Clone)]
pub struct MemoryOpener {
    decoder: MemoryDecoder,
}

impl MemoryOpener {
    pub fn new(decoder: MemoryDecoder) -> Self {
        Self { decoder }
    }
}

impl VideoOpener for MemoryOpener {
    fn open(&self, _path: &Path) -> Result<Box<dyn VideoDecoder>, VisionError> {
        Ok(Box::new(self.decoder.clone()))
    }
}
