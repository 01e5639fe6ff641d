//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::{ProxyMode, ServerConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<ValidationError> for ConfigError {
    fn from(err: ValidationError) -> Self {
        ConfigError::Validation(vec![err])
    }
}

/// Command-line values that take precedence over the config file.
///
/// Applied on startup and again to every reloaded file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub mode: Option<ProxyMode>,
    pub base_url: Option<String>,
    pub rewrite: bool,
}

impl Overrides {
    /// Apply to `config` and re-validate the result.
    pub fn apply(&self, mut config: ServerConfig) -> Result<ServerConfig, ConfigError> {
        if let Some(mode) = self.mode {
            config.upstream.mode = mode;
        }
        if let Some(base_url) = &self.base_url {
            config.upstream.base_url = base_url.clone();
        }
        if self.rewrite {
            config.upstream.rewrite = true;
        }
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ServerConfig, ConfigError> {
    let config: ServerConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}
