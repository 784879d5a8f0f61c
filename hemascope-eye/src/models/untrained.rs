//! Stand-in detector used when trained weights are unavailable

use image::RgbImage;

use super::{Candidate, DetectionModel};
use crate::error::VisionError;

/// Model without trained weights. Produces no candidates, so predictions made
/// while it is active are meaningless; the service reports it as degraded.
#[derive(Debug, Default, Clone, Copy)]
pub struct UntrainedModel;

impl DetectionModel for UntrainedModel {
    fn name(&self) -> &str {
        "SSD300_Untrained"
    }

    fn predict(&self, batch: &[RgbImage]) -> Result<Vec<Vec<Candidate>>, VisionError> {
        Ok(vec![Vec::new(); batch.len()])
    }
}
