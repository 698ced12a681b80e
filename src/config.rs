//! Configuration file for reaching the control plane.
//!
//! ```toml
//! [control_plane]
//! api_server = "https://127.0.0.1:6443"
//! token_file = "/var/run/secrets/kubernetes.io/serviceaccount/token"
//! timeout_secs = 30
//!
//! [logging]
//! level = "info"
//! ```

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{LogicalClusterError, Result};

/// `[control_plane]` section
#[derive(Debug, Clone, Deserialize)]
pub struct ControlPlaneConfig {
    /// Base URL of the API server
    #[serde(default = "default_api_server")]
    pub api_server: String,
    /// Bearer token sent with every request
    #[serde(default)]
    pub token: Option<String>,
    /// File holding the bearer token, read when `token` is not set
    #[serde(default)]
    pub token_file: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Skip TLS certificate verification (self-signed test clusters only)
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_api_server() -> String {
    "https://127.0.0.1:6443".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            api_server: default_api_server(),
            token: None,
            token_file: None,
            timeout_secs: default_timeout_secs(),
            accept_invalid_certs: false,
        }
    }
}

impl ControlPlaneConfig {
    /// Resolve the bearer token, reading `token_file` if needed.
    pub fn bearer_token(&self) -> Result<Option<String>> {
        if let Some(token) = &self.token {
            return Ok(Some(token.clone()));
        }
        match &self.token_file {
            Some(path) => {
                let token = fs::read_to_string(path).map_err(|e| {
                    LogicalClusterError::Config(format!(
                        "failed to read token file '{}': {}",
                        path, e
                    ))
                })?;
                Ok(Some(token.trim().to_string()))
            }
            None => Ok(None),
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub control_plane: ControlPlaneConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Read and parse a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            LogicalClusterError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        content.parse()
    }
}

impl FromStr for Config {
    type Err = LogicalClusterError;

    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| LogicalClusterError::Config(e.to_string()))
    }
}
