//! Orchestrator configuration storage
//!
//! Persists the output location, compiler fallbacks and hi-res-fix
//! defaults as `pipeline.json` in a caller-chosen directory.

use std::path::{Path, PathBuf};

use graph_compiler::CompilerConfig;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::constants::defaults;

/// Hi-res-fix values used when a request leaves them out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HiresDefaults {
    /// Refine size relative to the base size
    pub scale: f64,
    pub denoise: f64,
    pub steps: u32,
}

impl Default for HiresDefaults {
    fn default() -> Self {
        Self {
            scale: defaults::HIRES_SCALE,
            denoise: defaults::HIRES_DENOISE,
            steps: defaults::HIRES_STEPS,
        }
    }
}

/// Full orchestrator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Stage artifacts land in `<output_dir>/<execution_id>/`
    pub output_dir: PathBuf,
    pub compiler: CompilerConfig,
    pub hires: HiresDefaults,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(defaults::OUTPUT_DIR),
            compiler: CompilerConfig::default(),
            hires: HiresDefaults::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from `dir`, falling back to defaults when the
    /// file does not exist
    pub async fn load(dir: &Path) -> Result<Self, ConfigError> {
        let config_path = dir.join(defaults::CONFIG_FILE);

        if !fs::try_exists(&config_path).await.map_err(ConfigError::Io)? {
            log::debug!("No config at {:?}, using defaults", config_path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&config_path)
            .await
            .map_err(ConfigError::Io)?;

        serde_json::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save configuration to `dir`, creating it if needed
    pub async fn save(&self, dir: &Path) -> Result<(), ConfigError> {
        fs::create_dir_all(dir).await.map_err(ConfigError::Io)?;

        let config_path = dir.join(defaults::CONFIG_FILE);
        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        fs::write(&config_path, contents)
            .await
            .map_err(ConfigError::Io)?;

        log::info!("Configuration saved to {:?}", config_path);
        Ok(())
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(serde_json::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = OrchestratorConfig::load(dir.path()).await.unwrap();
        assert_eq!(config, OrchestratorConfig::default());
        assert_eq!(config.hires.denoise, 0.4);
        assert_eq!(config.hires.steps, 20);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("conf");
        let mut config = OrchestratorConfig::default().with_output_dir("/tmp/renders");
        config.compiler.default_checkpoint = Some("base.safetensors".into());
        config.save(&nested).await.unwrap();

        let loaded = OrchestratorConfig::load(&nested).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("pipeline.json"), r#"{"hires": {"scale": 2.0}}"#)
            .await
            .unwrap();
        let config = OrchestratorConfig::load(dir.path()).await.unwrap();
        assert_eq!(config.hires.scale, 2.0);
        assert_eq!(config.hires.steps, 20);
        assert_eq!(config.output_dir, PathBuf::from("output"));
    }

    #[tokio::test]
    async fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("pipeline.json"), "{not json")
            .await
            .unwrap();
        let err = OrchestratorConfig::load(dir.path()).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
