//! Configuration loading for the CLI
//!
//! Settings are layered, lowest precedence first:
//! - Configuration file (TOML)
//! - `SENDIFY_*` environment variables (and `.env`)
//! - Command-line arguments
//!
//! ```toml
//! base_url = "https://api.example.com/v1"
//! timeout_ms = 10000
//!
//! [headers]
//! Authorization = "Bearer ${ENV:API_TOKEN}"
//!
//! [retry]
//! max_attempts = 3
//! initial_delay_ms = 500
//!
//! [rate_limit]
//! permits = 10
//! window_ms = 1000
//! ```

use crate::error::{Error, Result};
use sendify_http::ClientConfig;
use std::path::{Path, PathBuf};

/// Parse a configuration file
pub fn from_file(path: &Path) -> Result<ClientConfig> {
    if !path.exists() {
        return Err(Error::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    parse(path, &content)
}

fn parse(path: &Path, content: &str) -> Result<ClientConfig> {
    toml::from_str(content).map_err(|err| Error::InvalidFormat {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

/// Load the first configuration file found in the default locations
pub fn load() -> Result<ClientConfig> {
    for path in default_config_paths() {
        if path.exists() {
            tracing::debug!(path = %path.display(), "Loading configuration");
            return from_file(&path);
        }
    }
    Ok(ClientConfig::default())
}

/// Load from a specific file or default locations, then apply the
/// environment on top
pub fn load_with_file(file: Option<&Path>) -> Result<ClientConfig> {
    let config = match file {
        Some(path) => from_file(path)?,
        None => load()?,
    };
    Ok(config.merge(ClientConfig::from_env()?))
}

/// Default configuration file paths to check
fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from(".sendify.toml"),
        PathBuf::from("sendify.toml"),
    ];

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("sendify").join("config.toml"));
    }

    paths
}
