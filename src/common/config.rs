//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Sandbox host process settings
    #[serde(default)]
    pub host: HostConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,
}

/// Configuration for the sandbox host process
#[derive(Debug, Deserialize, Clone)]
pub struct HostConfig {
    /// Path or bare name of the host executable
    #[serde(default = "default_host_path")]
    pub path: PathBuf,

    /// Additional arguments to pass to the host
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            path: default_host_path(),
            args: Vec::new(),
        }
    }
}

fn default_host_path() -> PathBuf {
    PathBuf::from("node")
}

/// Timeout settings in milliseconds
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Deadline applied to a test that does not specify its own
    #[serde(default = "default_test_timeout")]
    pub default_ms: u64,

    /// How long to wait for the host to report `ready`
    #[serde(default = "default_host_ready")]
    pub host_ready_ms: u64,

    /// Timeout for individual host requests (resolve, activate, ...)
    #[serde(default = "default_request")]
    pub request_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            default_ms: default_test_timeout(),
            host_ready_ms: default_host_ready(),
            request_ms: default_request(),
        }
    }
}

fn default_test_timeout() -> u64 {
    20 * 60 * 1000
}
fn default_host_ready() -> u64 {
    60_000
}
fn default_request() -> u64 {
    30_000
}

impl Timeouts {
    /// Default per-test deadline. A zero value in the file falls back to the built-in default.
    pub fn default_timeout(&self) -> Duration {
        let ms = if self.default_ms == 0 {
            default_test_timeout()
        } else {
            self.default_ms
        };
        Duration::from_millis(ms)
    }

    pub fn host_ready(&self) -> Duration {
        Duration::from_millis(self.host_ready_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Resolve the host executable
    ///
    /// Explicit paths are used as given; bare names are searched in PATH
    pub fn resolve_host(&self) -> Result<PathBuf> {
        resolve_host_path(&self.host.path)
    }
}

/// Resolve a host executable path, searching PATH for bare names
pub fn resolve_host_path(path: &Path) -> Result<PathBuf> {
    if path.components().count() > 1 || path.is_absolute() {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(Error::host_not_found(
            &path.display().to_string(),
            &[path.display().to_string()],
        ));
    }

    let name = path.to_string_lossy();
    which::which(name.as_ref()).map_err(|_| Error::host_not_found(&name, &["PATH"]))
}
