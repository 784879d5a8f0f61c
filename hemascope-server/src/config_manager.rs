// Configuration assembly: file, environment, then command line

use hemascope_core::{ConfigError, HemascopeConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CONFIG_FILE_NAME: &str = "config.toml";

/// Per-user config location, e.g. `~/.config/hemascope/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("hemascope").join(CONFIG_FILE_NAME))
}

/// Configuration builder for programmatic configuration
pub struct ConfigBuilder {
    config: HemascopeConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: HemascopeConfig::default(),
        }
    }

    /// Start from `path` when given, else from the per-user config file if
    /// one exists, else from defaults. `HEMASCOPE_*` overrides are applied.
    pub fn from_sources(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                info!("Loading configuration from {:?}", path);
                load_file(path)?
            }
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(path) => {
                    info!("Loading configuration from {:?}", path);
                    load_file(&path)?
                }
                None => {
                    debug!("No configuration file; using defaults");
                    HemascopeConfig::default()
                }
            },
        };

        config.apply_env();
        Ok(Self { config })
    }

    pub fn with_config(mut self, config: HemascopeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.model.path = path.into();
        self
    }

    pub fn with_refuse_degraded(mut self, refuse: bool) -> Self {
        self.config.model.refuse_degraded = refuse;
        self
    }

    pub fn build(self) -> Result<HemascopeConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn load_file(path: &Path) -> Result<HemascopeConfig, ConfigError> {
    let path = path
        .to_str()
        .ok_or_else(|| ConfigError::IoError(format!("Non UTF-8 config path: {:?}", path)))?;
    HemascopeConfig::from_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides() {
        let config = ConfigBuilder::new()
            .with_host("127.0.0.1")
            .with_port(9090)
            .with_model_path("/models/ssd.onnx")
            .with_refuse_degraded(true)
            .build()
            .unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.model.path, PathBuf::from("/models/ssd.onnx"));
        assert!(config.model.refuse_degraded);
    }

    #[test]
    fn test_builder_rejects_invalid() {
        assert!(ConfigBuilder::new().with_port(0).build().is_err());
    }

    #[test]
    fn test_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hemascope.toml");
        std::fs::write(&path, "[server]\nport = 8123\n\n[encoding]\nquality = 70\n").unwrap();

        let config = ConfigBuilder::from_sources(Some(&path)).unwrap().build().unwrap();
        assert_eq!(config.encoding.quality, 70);
        assert_eq!(config.detection.input_size, 300);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = ConfigBuilder::from_sources(Some(Path::new("/nonexistent/hemascope.toml")));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
