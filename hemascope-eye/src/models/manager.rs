//! Model loading with degraded-mode fallback

use hemascope_core::ModelConfig;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::{DetectionModel, UntrainedModel};

/// Operating mode of the loaded detector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ModelStatus {
    /// Trained weights loaded
    Ready,
    /// Running on the untrained stand-in after a load failure
    Degraded { reason: String },
}

impl ModelStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, ModelStatus::Degraded { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ModelStatus::Ready => None,
            ModelStatus::Degraded { reason } => Some(reason.as_str()),
        }
    }
}

/// A detector together with the mode it was loaded in
#[derive(Clone)]
pub struct LoadedModel {
    pub model: Arc<dyn DetectionModel>,
    pub status: ModelStatus,
}

impl LoadedModel {
    pub fn ready(model: Arc<dyn DetectionModel>) -> Self {
        Self {
            model,
            status: ModelStatus::Ready,
        }
    }

    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            model: Arc::new(UntrainedModel),
            status: ModelStatus::Degraded {
                reason: reason.into(),
            },
        }
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("model", &self.model.name())
            .field("status", &self.status)
            .finish()
    }
}

/// Load the trained detector. Never fails: on any error the untrained
/// stand-in is returned tagged as degraded.
pub fn load_model(config: &ModelConfig, input_size: u32) -> LoadedModel {
    info!("Loading trained detector from {:?}", config.path);

    match try_load(config, input_size) {
        Ok(model) => {
            info!("Trained detector loaded ({})", model.name());
            LoadedModel::ready(model)
        }
        Err(reason) => {
            warn!("Error loading trained model: {}", reason);
            warn!("Falling back to untrained model; predictions are for demo only");
            LoadedModel::degraded(reason)
        }
    }
}

#[cfg(feature = "onnx")]
fn try_load(config: &ModelConfig, input_size: u32) -> Result<Arc<dyn DetectionModel>, String> {
    super::SsdOnnxModel::new(&config.path, input_size)
        .map(|model| Arc::new(model) as Arc<dyn DetectionModel>)
        .map_err(|e| e.to_string())
}

#[cfg(not(feature = "onnx"))]
fn try_load(config: &ModelConfig, _input_size: u32) -> Result<Arc<dyn DetectionModel>, String> {
    if !config.path.exists() {
        return Err(format!("Trained model file not found: {:?}", config.path));
    }
    Err("built without the `onnx` feature; cannot run trained weights".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_model_file_falls_back_to_degraded() {
        let config = ModelConfig {
            path: PathBuf::from("/nonexistent/ssd.onnx"),
            ..ModelConfig::default()
        };
        let loaded = load_model(&config, 300);
        assert!(loaded.status.is_degraded());
        assert_eq!(loaded.model.name(), "SSD300_Untrained");
        assert!(loaded.status.reason().is_some());
    }

    #[test]
    fn test_ready_status() {
        let loaded = LoadedModel::ready(Arc::new(UntrainedModel));
        assert_eq!(loaded.status, ModelStatus::Ready);
        assert!(!loaded.status.is_degraded());
        assert!(loaded.status.reason().is_none());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(ModelStatus::Degraded {
            reason: "missing weights".to_string(),
        })
        .unwrap();
        assert_eq!(json["state"], "degraded");
        assert_eq!(json["reason"], "missing weights");

        let json = serde_json::to_value(ModelStatus::Ready).unwrap();
        assert_eq!(json["state"], "ready");
    }
}
