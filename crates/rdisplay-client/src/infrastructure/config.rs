//! TOML configuration for the display client.
//!
//! Read from `$XDG_CONFIG_HOME/rdisplay/config.toml` (or
//! `~/.config/rdisplay/config.toml`).  A missing file yields the defaults,
//! and `RDISPLAY_SERVER` in the environment overrides the server address.
//!
//! ```toml
//! server = "/run/user/1000/rdisplay.sock"
//! log_level = "debug"
//!
//! [mode]
//! width = 800
//! height = 600
//! double_buffered = true
//! resizable = false
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "...")]` so a partial file (or an
//! empty one) still loads.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::backend::ModeRequest;

/// Environment variable that overrides [`ClientConfig::server`].
pub const SERVER_ENV: &str = "RDISPLAY_SERVER";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither `XDG_CONFIG_HOME` nor `HOME` is set.
    #[error("could not determine config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// Path of the display server's socket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<PathBuf>,
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub mode: ModeConfig,
}

/// Video mode the demo client requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModeConfig {
    #[serde(default = "default_width")]
    pub width: i32,
    #[serde(default = "default_height")]
    pub height: i32,
    #[serde(default = "default_true")]
    pub double_buffered: bool,
    #[serde(default)]
    pub resizable: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_width() -> i32 {
    640
}
fn default_height() -> i32 {
    480
}
fn default_true() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: None,
            log_level: default_log_level(),
            mode: ModeConfig::default(),
        }
    }
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            double_buffered: default_true(),
            resizable: false,
        }
    }
}

impl ModeConfig {
    pub fn request(&self) -> ModeRequest {
        ModeRequest {
            width: self.width,
            height: self.height,
            double_buffered: self.double_buffered,
            resizable: self.resizable,
        }
    }
}

impl ClientConfig {
    /// Returns `true` when a non-empty server address is configured.
    pub fn is_available(&self) -> bool {
        self.server
            .as_ref()
            .is_some_and(|s| !s.as_os_str().is_empty())
    }

    /// Replaces the server address with `value` when it is set.
    pub fn apply_server_override(&mut self, value: Option<OsString>) {
        if let Some(value) = value {
            self.server = Some(PathBuf::from(value));
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if neither `XDG_CONFIG_HOME`
/// nor `HOME` is set.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok_or(ConfigError::NoPlatformConfigDir)?;
    Ok(base.join("rdisplay").join("config.toml"))
}

/// Loads the config file (if any) and applies the environment override.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    let mut config = match config_file_path() {
        Ok(path) => load_config_from(&path)?,
        Err(ConfigError::NoPlatformConfigDir) => ClientConfig::default(),
        Err(e) => return Err(e),
    };
    config.apply_server_override(std::env::var_os(SERVER_ENV));
    Ok(config)
}

/// Loads `path`, returning defaults if it does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<ClientConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
