//! Detection model seam and implementations

pub mod manager;
pub mod untrained;
#[cfg(feature = "onnx")]
pub mod ssd;

use image::RgbImage;

use crate::error::VisionError;

pub use manager::{load_model, LoadedModel, ModelStatus};
pub use untrained::UntrainedModel;
#[cfg(feature = "onnx")]
pub use ssd::SsdOnnxModel;

/// One raw model output, in model input-resolution pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// `[x1, y1, x2, y2]`
    pub bbox: [f32; 4],
    pub score: f32,
    pub label: i64,
}

/// A loaded detector. Given a batch of fixed-size RGB images, returns one
/// candidate list per image, in the model's native order.
pub trait DetectionModel: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, batch: &[RgbImage]) -> Result<Vec<Vec<Candidate>>, VisionError>;
}
