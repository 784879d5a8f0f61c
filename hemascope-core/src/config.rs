// Configuration for the Hemascope detection service

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by the CORS layer
    pub cors_origins: Vec<String>,
    /// Upper bound on multipart upload size
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["http://localhost:3000".to_string()],
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

/// Detection model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the SSD300 ONNX export
    pub path: PathBuf,
    /// Execution device label reported by the health endpoint
    pub device: String,
    /// Refuse predictions while running on the untrained stand-in model
    pub refuse_degraded: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("../SSD_custom.onnx"),
            device: "cpu".to_string(),
            refuse_degraded: false,
        }
    }
}

/// Per-frame detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Square model input resolution
    pub input_size: u32,
    pub confidence_threshold: f32,
    /// Center-crop zoom applied before inference; 1.0 keeps the whole frame
    pub zoom_factor: f32,
    /// Label table indexed by model class id; index 0 is background
    pub class_names: Vec<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            input_size: 300,
            confidence_threshold: 0.5,
            zoom_factor: 1.0,
            class_names: ["bg", "Platelets", "RBC", "WBC"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Label rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    /// Preferred TrueType font; system fonts are tried when unset or unreadable
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            font_size: 16.0,
        }
    }
}

/// Image transport encoding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// Largest side allowed before downscaling
    pub max_dimension: u32,
    /// JPEG quality (1-100)
    pub quality: u8,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            max_dimension: 800,
            quality: 85,
        }
    }
}

/// Video retrieval and sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Hard cap applied to any requested frame count
    pub max_frames_cap: usize,
    pub default_max_frames: usize,
    /// Frame rate assumed when the decoder cannot report one
    pub assumed_fps: f64,
    pub max_duration_secs: u64,
    /// Ceiling for clips at or under `short_form_threshold_secs`
    pub short_form_max_duration_secs: u64,
    pub short_form_threshold_secs: u64,
    pub allowed_domains: Vec<String>,
    pub supported_formats: Vec<String>,
    pub ytdlp_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            max_frames_cap: 100,
            default_max_frames: 30,
            assumed_fps: 30.0,
            max_duration_secs: 300,
            short_form_max_duration_secs: 180,
            short_form_threshold_secs: 60,
            allowed_domains: vec!["youtube.com".to_string(), "youtu.be".to_string()],
            supported_formats: vec!["mp4".to_string(), "webm".to_string()],
            ytdlp_path: PathBuf::from("yt-dlp"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HemascopeConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub detection: DetectionConfig,
    pub annotation: AnnotationConfig,
    pub encoding: EncodingConfig,
    pub video: VideoConfig,
}

impl HemascopeConfig {
    /// Load configuration from file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        if path.contains("..") {
            return Err(ConfigError::IoError(format!(
                "Path traversal detected: '{}'",
                path
            )));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path, e)))?;
        Self::from_str(&content)
    }

    /// Load configuration from string, trying JSON, TOML and YAML in turn
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if let Ok(config) = serde_json::from_str::<HemascopeConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = toml::from_str::<HemascopeConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = serde_yaml::from_str::<HemascopeConfig>(content) {
            return Ok(config);
        }

        Err(ConfigError::ParseError("Unknown format".to_string()))
    }

    /// Defaults with `HEMASCOPE_*` environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `HEMASCOPE_*` environment overrides on top of this configuration
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("HEMASCOPE_PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.server.port = port;
        }

        if let Some(host) = lookup("HEMASCOPE_HOST") {
            self.server.host = host;
        }

        if let Some(path) = lookup("HEMASCOPE_MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }

        if let Some(threshold) =
            lookup("HEMASCOPE_CONFIDENCE_THRESHOLD").and_then(|t| t.parse::<f32>().ok())
        {
            self.detection.confidence_threshold = threshold;
        }

        if let Some(path) = lookup("HEMASCOPE_YTDLP_PATH") {
            self.video.ytdlp_path = PathBuf::from(path);
        }

        if let Some(path) = lookup("HEMASCOPE_FFMPEG_PATH") {
            self.video.ffmpeg_path = PathBuf::from(path);
        }

        if let Some(refuse) = lookup("HEMASCOPE_REFUSE_DEGRADED").and_then(|r| r.parse::<bool>().ok()) {
            self.model.refuse_degraded = refuse;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError("port must be non-zero".to_string()));
        }

        let threshold = self.detection.confidence_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::ValidationError(
                "confidence_threshold must be between 0 and 1".to_string(),
            ));
        }

        if self.detection.input_size == 0 {
            return Err(ConfigError::ValidationError("input_size must be non-zero".to_string()));
        }

        if !self.detection.zoom_factor.is_finite() || self.detection.zoom_factor < 1.0 {
            return Err(ConfigError::ValidationError("zoom_factor must be >= 1.0".to_string()));
        }

        if self.detection.class_names.is_empty() {
            return Err(ConfigError::ValidationError("class_names cannot be empty".to_string()));
        }

        if self.encoding.quality == 0 || self.encoding.quality > 100 {
            return Err(ConfigError::ValidationError(
                "encoding quality must be between 1 and 100".to_string(),
            ));
        }

        if self.encoding.max_dimension == 0 {
            return Err(ConfigError::ValidationError("max_dimension must be non-zero".to_string()));
        }

        if self.video.max_frames_cap == 0 || self.video.default_max_frames == 0 {
            return Err(ConfigError::ValidationError("frame caps must be non-zero".to_string()));
        }

        if !(self.video.assumed_fps > 0.0) {
            return Err(ConfigError::ValidationError("assumed_fps must be positive".to_string()));
        }

        if !(self.annotation.font_size > 0.0) {
            return Err(ConfigError::ValidationError("font_size must be positive".to_string()));
        }

        Ok(())
    }
}

#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = HemascopeConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.detection.input_size, 300);
        assert_eq!(config.detection.confidence_threshold, 0.5);
        assert_eq!(config.detection.zoom_factor, 1.0);
        assert_eq!(config.detection.class_names.len(), 4);
        assert_eq!(config.encoding.max_dimension, 800);
        assert_eq!(config.encoding.quality, 85);
        assert_eq!(config.video.max_frames_cap, 100);
        assert_eq!(config.video.default_max_frames, 30);
        assert!(!config.model.refuse_degraded);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml_partial() {
        let content = r#"
[server]
port = 9100

[detection]
zoom_factor = 1.5
"#;
        let config = HemascopeConfig::from_str(content).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.detection.zoom_factor, 1.5);
        // Untouched sections keep their defaults
        assert_eq!(config.encoding.quality, 85);
        assert_eq!(config.video.allowed_domains.len(), 2);
    }

    #[test]
    fn test_config_from_json() {
        let content = r#"{"encoding": {"max_dimension": 640, "quality": 70}}"#;
        let config = HemascopeConfig::from_str(content).unwrap();
        assert_eq!(config.encoding.max_dimension, 640);
        assert_eq!(config.encoding.quality, 70);
    }

    #[test]
    fn test_config_from_yaml() {
        let content = "video:\n  max_frames_cap: 50\n  assumed_fps: 25.0\n";
        let config = HemascopeConfig::from_str(content).unwrap();
        assert_eq!(config.video.max_frames_cap, 50);
        assert_eq!(config.video.assumed_fps, 25.0);
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hemascope.toml");
        std::fs::write(&path, "[model]\nrefuse_degraded = true\n").unwrap();

        let config = HemascopeConfig::from_file(path.to_str().unwrap()).unwrap();
        assert!(config.model.refuse_degraded);
    }

    #[test]
    fn test_config_from_file_missing() {
        let result = HemascopeConfig::from_file("/nonexistent/hemascope.toml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_config_from_file_rejects_traversal() {
        let result = HemascopeConfig::from_file("../../etc/passwd");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_config_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("HEMASCOPE_PORT", "9000"),
            ("HEMASCOPE_HOST", "127.0.0.1"),
            ("HEMASCOPE_CONFIDENCE_THRESHOLD", "0.75"),
            ("HEMASCOPE_REFUSE_DEGRADED", "true"),
            ("HEMASCOPE_MODEL_PATH", "/models/ssd.onnx"),
        ]
        .into_iter()
        .collect();

        let mut config = HemascopeConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.detection.confidence_threshold, 0.75);
        assert!(config.model.refuse_degraded);
        assert_eq!(config.model.path, PathBuf::from("/models/ssd.onnx"));
    }

    #[test]
    fn test_config_env_ignores_garbage() {
        let mut config = HemascopeConfig::default();
        config.apply_overrides(|key| match key {
            "HEMASCOPE_PORT" => Some("not-a-port".to_string()),
            _ => None,
        });
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_config_validation_threshold() {
        let mut config = HemascopeConfig::default();
        config.detection.confidence_threshold = 1.5;
        assert!(config.validate().is_err());

        config.detection.confidence_threshold = -0.1;
        assert!(config.validate().is_err());

        config.detection.confidence_threshold = f32::NAN;
        assert!(config.validate().is_err());

        // Edges are valid
        config.detection.confidence_threshold = 0.0;
        assert!(config.validate().is_ok());
        config.detection.confidence_threshold = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zoom() {
        let mut config = HemascopeConfig::default();
        config.detection.zoom_factor = 0.5;
        assert!(config.validate().is_err());

        config.detection.zoom_factor = 2.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_quality() {
        let mut config = HemascopeConfig::default();
        config.encoding.quality = 0;
        assert!(config.validate().is_err());

        config.encoding.quality = 101;
        assert!(config.validate().is_err());

        config.encoding.quality = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_misc() {
        let mut config = HemascopeConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = HemascopeConfig::default();
        config.video.max_frames_cap = 0;
        assert!(config.validate().is_err());

        let mut config = HemascopeConfig::default();
        config.detection.class_names.clear();
        assert!(config.validate().is_err());

        let mut config = HemascopeConfig::default();
        config.video.assumed_fps = 0.0;
        assert!(config.validate().is_err());
    }
}
