//! Typed configuration for the tutoring gateway.
//!
//! JSON file with serde defaults; every section can be omitted.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("validation error: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub pipelines: PipelineConfig,
    pub recommendations: RecommendationConfig,
    pub path: PathConfig,
}

/// Gateway listener settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the WebSocket listener
    pub bind: String,
    /// Maximum concurrent connections before polite rejection
    pub max_connections: usize,
    /// Heartbeat interval in seconds
    pub heartbeat_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:17600".to_string(),
            max_connections: 1000,
            heartbeat_interval_secs: 30,
        }
    }
}

/// Bounded timeouts for downstream pipeline calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub chat_timeout_ms: u64,
    pub audio_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chat_timeout_ms: 10_000,
            audio_timeout_ms: 20_000,
        }
    }
}

/// Recommendation caching and sizing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecommendationConfig {
    pub cache_ttl_secs: u64,
    pub max_items: usize,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            max_items: 20,
        }
    }
}

/// Learning path sizing bounds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathConfig {
    pub min_study_minutes: u32,
    pub max_study_minutes: u32,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            min_study_minutes: 30,
            max_study_minutes: 120,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tutora")
            .join("config.json")
    }

    /// Reject configurations the gateway cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.max_connections == 0 {
            return Err(ConfigError::Validation(
                "server.max_connections must be positive".to_string(),
            ));
        }
        if self.pipelines.chat_timeout_ms == 0 || self.pipelines.audio_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "pipeline timeouts must be positive".to_string(),
            ));
        }
        if self.path.min_study_minutes == 0
            || self.path.min_study_minutes > self.path.max_study_minutes
        {
            return Err(ConfigError::Validation(format!(
                "invalid study bounds: {}..{}",
                self.path.min_study_minutes, self.path.max_study_minutes
            )));
        }
        if self.recommendations.max_items == 0 {
            return Err(ConfigError::Validation(
                "recommendations.max_items must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
