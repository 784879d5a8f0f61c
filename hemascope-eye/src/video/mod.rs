//! Video decoding and frame sampling
//!
//! A [`VideoOpener`] turns a local path into a [`VideoDecoder`], which yields
//! RGB frames in order. [`FrameSampler`] selects evenly spaced frames from a
//! decoder without buffering the whole stream.

pub mod sampler;
pub mod ffmpeg;
pub mod memory;
#[cfg(feature = "opencv")]
pub mod opencv;

use image::RgbImage;
use std::path::Path;

use crate::error::VisionError;

pub use sampler::{sampling_step, FrameSampler, SampledFrame};
pub use ffmpeg::{FfmpegDecoder, FfmpegOpener};
pub use memory::{MemoryDecoder, MemoryOpener};
#[cfg(feature = "opencv")]
pub use self::opencv::{OpenCvDecoder, OpenCvOpener};

/// Sequential frame source
pub trait VideoDecoder: Send {
    /// Total frames when the container reports it
    fn frame_count(&self) -> Option<u64>;

    /// Frames per second when known
    fn frame_rate(&self) -> Option<f64>;

    /// Next frame, or `None` at end of stream
    fn next_frame(&mut self) -> Result<Option<RgbImage>, VisionError>;
}

/// Opens a local video file for decoding
pub trait VideoOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoDecoder>, VisionError>;
}

impl<F> VideoOpener for F
where
    F: Fn(&Path) -> Result<Box<dyn VideoDecoder>, VisionError> + Send + Sync,
{
    fn open(&self, path: &Path) -> Result<Box<dyn VideoDecoder>, VisionError> {
        self(path)
    }
}
