// Shared application state built once at startup

use hemascope_core::HemascopeConfig;
use hemascope_eye::models::load_model;
use hemascope_eye::{LoadedModel, ModelStatus, VideoOpener, VideoPipeline, VideoSourceResolver, VisionError};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything request handlers need, shared behind an `Arc`
pub struct AppContext {
    pub config: HemascopeConfig,
    pub model_status: ModelStatus,
    pub model_name: String,
    pub device: String,
    pub pipeline: Arc<VideoPipeline>,
}

impl AppContext {
    pub fn builder(config: HemascopeConfig) -> AppContextBuilder {
        AppContextBuilder::new(config)
    }

    /// Foreground class labels
    pub fn class_names(&self) -> &[String] {
        self.pipeline.detector().classes().foreground()
    }

    /// True when requests must be refused because only the untrained model
    /// is available
    pub fn refuses_requests(&self) -> bool {
        self.model_status.is_degraded() && self.config.model.refuse_degraded
    }
}

pub struct AppContextBuilder {
    config: HemascopeConfig,
    model: Option<LoadedModel>,
    resolver: Option<Arc<dyn VideoSourceResolver>>,
    opener: Option<Arc<dyn VideoOpener>>,
}

impl AppContextBuilder {
    pub fn new(config: HemascopeConfig) -> Self {
        Self {
            config,
            model: None,
            resolver: None,
            opener: None,
        }
    }

    /// Use an already loaded model instead of loading from `model.path`
    pub fn with_model(mut self, model: LoadedModel) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn VideoSourceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_opener(mut self, opener: Arc<dyn VideoOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    pub fn build(self) -> Result<AppContext, VisionError> {
        self.config
            .validate()
            .map_err(|e| VisionError::Config(e.to_string()))?;

        let model = match self.model {
            Some(model) => model,
            None => load_model(&self.config.model, self.config.detection.input_size),
        };

        if let Some(reason) = model.status.reason() {
            warn!("Serving with untrained model: {}", reason);
        }

        let mut pipeline = VideoPipeline::from_config(&self.config, &model)?;
        if let Some(resolver) = self.resolver {
            pipeline = pipeline.with_resolver(resolver);
        }
        if let Some(opener) = self.opener {
            pipeline = pipeline.with_opener(opener);
        }

        info!(
            "Application context ready (model {}, device {})",
            model.model.name(),
            self.config.model.device
        );

        Ok(AppContext {
            model_name: model.model.name().to_string(),
            model_status: model.status,
            device: self.config.model.device.clone(),
            pipeline: Arc::new(pipeline),
            config: self.config,
        })
    }
}
