//! Configuration Module
//!
//! This module defines all configuration structures for the batch server.
//! Configuration is loaded from TOML files and parsed using serde.

use serde::Deserialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that overrides `storage.data_dir`
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Main configuration structure
///
/// # Example TOML
/// ```toml
/// [storage]
/// data_dir = "./data"
///
/// [api]
/// host = "127.0.0.1"
/// port = 5173
/// max_upload_bytes = 104857600
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    pub api: ApiConfig,
}

/// Where batches live on disk
///
/// Batches are stored under `<data_dir>/batches`.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    pub fn batches_root(&self) -> PathBuf {
        self.data_dir.join("batches")
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

/// HTTP server configuration
///
/// # Fields
/// - `host`: IP address to bind to (e.g., "127.0.0.1" or "0.0.0.0")
/// - `port`: TCP port to listen on
/// - `max_upload_bytes`: request body limit for batch uploads
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// `DATA_DIR` in the environment takes precedence over `storage.data_dir`.
    ///
    /// # Returns
    /// * `Ok(Config)` if the file was successfully loaded and parsed
    /// * `Err` if the file couldn't be read or the TOML is invalid
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.override_data_dir(std::env::var_os(DATA_DIR_ENV));
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn override_data_dir(&mut self, value: Option<OsString>) {
        if let Some(dir) = value.filter(|dir| !dir.is_empty()) {
            self.storage.data_dir = PathBuf::from(dir);
        }
    }
}
