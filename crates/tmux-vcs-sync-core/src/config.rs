//! Configuration loading and management
//!
//! # Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. User config: `<config dir>/tmux-vcs-sync/config.toml`
//! 3. Environment variables: `TMUX_VCS_SYNC_*`
//!
//! # Example Config
//!
//! ```toml
//! timeout_secs = 30
//!
//! [tmux]
//! socket_name = "work"
//!
//! [git]
//! binary = "/usr/local/bin/git"
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::{Error, Result};

const MIN_TIMEOUT_SECS: u64 = 1;
const MAX_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Deadline for a whole command, including every subprocess it runs.
    pub timeout_secs: u64,
    pub tmux: TmuxConfig,
    pub git: GitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TmuxConfig {
    pub binary: String,
    /// Passed as `-L`.
    pub socket_name: Option<String>,
    /// Passed as `-f`.
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct GitConfig {
    pub enabled: bool,
    pub binary: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            tmux: TmuxConfig::default(),
            git: GitConfig::default(),
        }
    }
}

impl Default for TmuxConfig {
    fn default() -> Self {
        Self {
            binary: "tmux".to_string(),
            socket_name: None,
            config_file: None,
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: "git".to_string(),
        }
    }
}

/// Load configuration from all sources.
///
/// # Errors
///
/// Returns error if:
/// - The config file exists but cannot be read
/// - The config file is malformed TOML
/// - An environment override has an invalid value
/// - A value fails validation
pub fn load_config() -> Result<Config> {
    let config = match config_path() {
        Some(path) if path.is_file() => load_toml_file(&path)?,
        _ => Config::default(),
    };
    let config = config.apply_env_vars()?;
    config.validate()?;
    Ok(config)
}

/// Path of the user config file, if a config directory can be determined.
pub fn config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "tmux-vcs-sync")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Parse a TOML config file.
///
/// # Errors
///
/// Returns error if the file cannot be read or is not a valid config.
pub fn load_toml_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::io_error(format!("Failed to read config file {}: {e}", path.display()))
    })?;
    toml::from_str(&content).map_err(|e| {
        Error::invalid_config(format!(
            "Failed to parse config file {}: {e}",
            path.display()
        ))
    })
}

impl Config {
    /// Apply `TMUX_VCS_SYNC_*` environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns error if environment variable values are invalid
    pub fn apply_env_vars(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns error if a looked-up value is invalid
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup("TMUX_VCS_SYNC_TIMEOUT_SECS") {
            self.timeout_secs = value.parse().map_err(|e| {
                Error::invalid_config(format!("Invalid TMUX_VCS_SYNC_TIMEOUT_SECS value: {e}"))
            })?;
        }

        if let Some(value) = lookup("TMUX_VCS_SYNC_TMUX_BINARY") {
            self.tmux.binary = value;
        }

        if let Some(value) = lookup("TMUX_VCS_SYNC_GIT_BINARY") {
            self.git.binary = value;
        }

        if let Some(value) = lookup("TMUX_VCS_SYNC_GIT_ENABLED") {
            self.git.enabled = value.parse().map_err(|e| {
                Error::invalid_config(format!("Invalid TMUX_VCS_SYNC_GIT_ENABLED value: {e}"))
            })?;
        }

        Ok(self)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns error if any value is out of range or empty
    pub fn validate(&self) -> Result<()> {
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&self.timeout_secs) {
            return Err(Error::invalid_config(format!(
                "timeout_secs must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS}, got {}",
                self.timeout_secs
            )));
        }
        if self.tmux.binary.trim().is_empty() {
            return Err(Error::invalid_config("tmux.binary cannot be empty"));
        }
        if self.git.binary.trim().is_empty() {
            return Err(Error::invalid_config("git.binary cannot be empty"));
        }
        if self
            .tmux
            .socket_name
            .as_deref()
            .is_some_and(|name| name.is_empty() || name.contains('/'))
        {
            return Err(Error::invalid_config(
                "tmux.socket_name must be a bare name; use config_file for paths",
            ));
        }
        Ok(())
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
