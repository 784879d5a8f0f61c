//! SSD300 detector backed by ONNX Runtime
//!
//! Expects an export with a single `[N, 3, H, W]` float input in [0, 1] and
//! three outputs: `boxes` (`[K, 4]`, xyxy in input pixels), `scores` (`[K]`)
//! and `labels` (`[K]`, int64).

use image::RgbImage;
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, info};

use super::{Candidate, DetectionModel};
use crate::error::VisionError;
use crate::utils::image_to_chw_tensor;

pub struct SsdOnnxModel {
    session: Mutex<Session>,
    input_name: String,
    input_size: u32,
}

impl SsdOnnxModel {
    /// Load an SSD300 ONNX export from `model_path`
    pub fn new(model_path: &Path, input_size: u32) -> Result<Self, VisionError> {
        if !model_path.exists() {
            return Err(VisionError::Model(format!(
                "Trained model file not found: {:?}",
                model_path
            )));
        }

        let session = Session::builder()
            .map_err(|e| VisionError::Ort(format!("Failed to create session builder: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| VisionError::Ort(format!("Failed to load SSD model: {}", e)))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| VisionError::Model("SSD model declares no inputs".to_string()))?;

        info!("SSD model loaded from {:?} (input '{}')", model_path, input_name);

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            input_size,
        })
    }

    fn predict_one(&self, image: &RgbImage) -> Result<Vec<Candidate>, VisionError> {
        if image.dimensions() != (self.input_size, self.input_size) {
            return Err(VisionError::Model(format!(
                "Expected {0}x{0} input, got {1}x{2}",
                self.input_size,
                image.width(),
                image.height()
            )));
        }

        let side = self.input_size as usize;
        let data = image_to_chw_tensor(image)?;
        let input = Tensor::from_array(([1usize, 3, side, side], data.into_boxed_slice()))?;

        let mut session = self.session.lock();
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input])?;

        let (_, boxes) = outputs["boxes"].try_extract_tensor::<f32>()?;
        let (_, scores) = outputs["scores"].try_extract_tensor::<f32>()?;
        let (_, labels) = outputs["labels"].try_extract_tensor::<i64>()?;

        if boxes.len() != scores.len() * 4 || labels.len() != scores.len() {
            return Err(VisionError::Model(format!(
                "Inconsistent SSD outputs: {} boxes values, {} scores, {} labels",
                boxes.len(),
                scores.len(),
                labels.len()
            )));
        }

        let candidates: Vec<Candidate> = scores
            .iter()
            .zip(labels.iter())
            .zip(boxes.chunks_exact(4))
            .map(|((&score, &label), b)| Candidate {
                bbox: [b[0], b[1], b[2], b[3]],
                score,
                label,
            })
            .collect();

        debug!("SSD produced {} raw candidates", candidates.len());
        Ok(candidates)
    }
}

impl DetectionModel for SsdOnnxModel {
    fn name(&self) -> &str {
        "SSD300_VGG16"
    }

    fn predict(&self, batch: &[RgbImage]) -> Result<Vec<Vec<Candidate>>, VisionError> {
        batch.iter().map(|image| self.predict_one(image)).collect()
    }
}
