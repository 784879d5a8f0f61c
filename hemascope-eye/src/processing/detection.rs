//! Single-frame detection

use hemascope_core::ClassTable;
use image::imageops::FilterType;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::VisionError;
use crate::models::{Candidate, DetectionModel};
use crate::utils::{center_crop, panic_message, rescale_box};

/// One detected object, in the pixel space of the image it was found in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// `[x1, y1, x2, y2]`
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_id: i64,
    pub class_name: String,
}

/// Detections plus the image their coordinates refer to
#[derive(Debug, Clone)]
pub struct FrameDetection {
    pub detections: Vec<Detection>,
    pub image: RgbImage,
}

/// Runs frames through a detection model at its fixed input resolution and
/// maps the results back to frame coordinates
pub struct FrameDetector {
    model: Arc<dyn DetectionModel>,
    classes: ClassTable,
    input_size: u32,
    zoom_factor: f32,
}

impl FrameDetector {
    pub fn new(model: Arc<dyn DetectionModel>, classes: ClassTable, input_size: u32) -> Self {
        Self {
            model,
            classes,
            input_size,
            zoom_factor: 1.0,
        }
    }

    /// Center-crop zoom applied before inference
    pub fn with_zoom_factor(mut self, zoom_factor: f32) -> Self {
        self.zoom_factor = zoom_factor;
        self
    }

    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Detect objects in `frame`. Any failure, including a panic inside the
    /// model, yields no detections and the untouched frame.
    pub fn detect(&self, frame: &RgbImage, confidence_threshold: f32) -> FrameDetection {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.try_detect(frame, confidence_threshold)
        }));

        let error = match outcome {
            Ok(Ok(result)) => return result,
            Ok(Err(e)) => e.to_string(),
            Err(payload) => panic_message(payload),
        };

        warn!("Error in frame detection: {}", error);
        FrameDetection {
            detections: Vec::new(),
            image: frame.clone(),
        }
    }

    /// Fallible detection; errors propagate to the caller
    pub fn try_detect(
        &self,
        frame: &RgbImage,
        confidence_threshold: f32,
    ) -> Result<FrameDetection, VisionError> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(VisionError::Processing("Frame has no pixels".to_string()));
        }

        let cropped = center_crop(frame, self.zoom_factor);
        let resized = image::imageops::resize(
            &cropped,
            self.input_size,
            self.input_size,
            FilterType::Triangle,
        );

        let mut predictions = self.model.predict(std::slice::from_ref(&resized))?;
        let candidates = if predictions.is_empty() {
            Vec::new()
        } else {
            predictions.swap_remove(0)
        };

        let scale_x = cropped.width() as f32 / self.input_size as f32;
        let scale_y = cropped.height() as f32 / self.input_size as f32;
        let detections = postprocess(
            &candidates,
            confidence_threshold,
            scale_x,
            scale_y,
            &self.classes,
        );

        debug!(
            "Frame detection: {} raw candidates, {} above {}",
            candidates.len(),
            detections.len(),
            confidence_threshold
        );

        Ok(FrameDetection {
            detections,
            image: cropped,
        })
    }
}

/// Keep candidates scoring strictly above `confidence_threshold`, rescale
/// their boxes per axis and attach class labels. Model order is preserved.
pub fn postprocess(
    candidates: &[Candidate],
    confidence_threshold: f32,
    scale_x: f32,
    scale_y: f32,
    classes: &ClassTable,
) -> Vec<Detection> {
    candidates
        .iter()
        .filter(|c| c.score > confidence_threshold)
        .map(|c| Detection {
            bbox: rescale_box(c.bbox, scale_x, scale_y),
            confidence: c.score,
            class_id: c.label,
            class_name: classes.label(c.label).to_string(),
        })
        .collect()
}
