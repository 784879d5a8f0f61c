pub mod error;
pub mod config;
pub mod classes;

pub use error::{Error, Result};
pub use config::{
    HemascopeConfig, ServerConfig, ModelConfig, DetectionConfig, AnnotationConfig,
    EncodingConfig, VideoConfig, ConfigError,
};
pub use classes::{ClassTable, UNKNOWN_CLASS};
