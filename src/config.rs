//! Configuration management for Confab
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::cli::Cli;
use crate::error::{ConfabError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for Confab
///
/// This structure holds all configuration needed for the client,
/// including the chat service endpoint and local credential storage.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Chat service endpoint configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Local credential storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Chat service endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the chat service API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_api_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_seconds: default_timeout(),
        }
    }
}

/// Local credential storage configuration
///
/// When `credentials_file` is unset, the store lives in the platform data
/// directory (see [`crate::credentials::FileCredentialStore::open_default`]).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Optional path to the credentials file (useful for tests and sandboxes)
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a YAML file, applying CLI/env overrides
    ///
    /// A missing file is not an error: defaults are used so the client works
    /// out of the box against a local server.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    /// * `cli` - Parsed CLI arguments whose overrides take precedence
    ///
    /// # Errors
    ///
    /// Returns [`ConfabError::Io`] if an existing file cannot be read, or
    /// [`ConfabError::Yaml`] if its contents fail to parse.
    pub fn load(path: &str, cli: &Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path).map_err(ConfabError::Io)?;
            serde_yaml::from_str(&contents).map_err(ConfabError::Yaml)?
        } else {
            tracing::debug!("No config file at {}, using defaults", path);
            Self::default()
        };

        if let Some(api_url) = &cli.api_url {
            config.server.api_url = api_url.clone();
        }
        if let Some(credentials_file) = &cli.credentials_file {
            config.storage.credentials_file = Some(credentials_file.clone());
        }

        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfabError::Config`] if the API URL does not parse as an
    /// http(s) URL or the request timeout is zero.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.server.api_url).map_err(|e| {
            ConfabError::Config(format!("Invalid api_url '{}': {}", self.server.api_url, e))
        })?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ConfabError::Config(format!(
                    "Unsupported api_url scheme '{}': expected http or https",
                    other
                ))
                .into());
            }
        }

        if self.server.timeout_seconds == 0 {
            return Err(
                ConfabError::Config("timeout_seconds must be greater than zero".to_string()).into(),
            );
        }

        Ok(())
    }
}
