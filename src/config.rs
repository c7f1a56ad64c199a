use serde::Deserialize;
use std::path::Path;

use crate::kernel::coordinator::CoordinatorConfig;
use crate::kernel::pipeline::PipelineConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Pause between generated chunks.
    pub chunk_delay_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self { chunk_delay_ms: 60 }
    }
}

/// Runtime configuration. Every field has a default, so `{}` is valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub coordinator: CoordinatorConfig,
    pub demo: DemoConfig,
}

impl Config {
    pub const ENV_VAR: &'static str = "PARLEY_CONFIG";

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Reads the file named by `PARLEY_CONFIG`, or falls back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(Self::ENV_VAR) {
            Some(path) => Self::from_path(path),
            None => Ok(Self::default()),
        }
    }
}
