//! User configuration and data-directory resolution.
//!
//! Precedence for every setting: command-line flag, environment variable,
//! config file, built-in default.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::launcher::LaunchMode;

/// Overrides the data directory (environments, history).
pub const HOME_ENV: &str = "EASYEXE_HOME";
/// Overrides the config file location.
pub const CONFIG_ENV: &str = "EASYEXE_CONFIG";

const APP_DIR: &str = "easy-exe";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Cannot determine a data directory: set EASYEXE_HOME or HOME")]
    NoDataDir,
}

/// Paths to runtime binaries, overriding discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimePaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wine: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dosbox: Option<PathBuf>,
}

/// Contents of `config.yaml` (or `.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Rule table replacing the built-in one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<PathBuf>,
    #[serde(default)]
    pub runtimes: RuntimePaths,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_mode: Option<LaunchMode>,
}

impl AppConfig {
    /// Load from an explicit path; YAML unless the extension is `.json`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let body = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        let parsed = if is_json {
            serde_json::from_str(&body).map_err(|e| e.to_string())
        } else if body.trim().is_empty() {
            Ok(AppConfig::default())
        } else {
            serde_yaml::from_str(&body).map_err(|e| e.to_string())
        };
        parsed.map_err(|message| ConfigError::Parse { path: path.to_path_buf(), message })
    }

    /// Load the config in effect: `explicit`, else `$EASYEXE_CONFIG`, else the
    /// default location. A missing default file yields the defaults; a missing
    /// explicitly named file is an error.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }
        if let Some(path) = env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            let path = PathBuf::from(path);
            return Ok((Self::load(&path)?, Some(path)));
        }
        match default_config_path() {
            Some(path) if path.is_file() => Ok((Self::load(&path)?, Some(path))),
            _ => Ok((Self::default(), None)),
        }
    }

    /// Data directory: `flag`, then `$EASYEXE_HOME`, then the config file,
    /// then the XDG data directory.
    pub fn data_dir(&self, flag: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = flag {
            return Ok(dir.to_path_buf());
        }
        if let Some(dir) = env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        default_data_dir().ok_or(ConfigError::NoDataDir)
    }
}

/// Paths derived from the data directory.
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub root: PathBuf,
    pub environments_dir: PathBuf,
    pub history_db: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let environments_dir = root.join("environments");
        let history_db = root.join("history.db");
        Self { root, environments_dir, history_db }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    xdg_dir("XDG_CONFIG_HOME", ".config").map(|dir| dir.join(APP_DIR).join("config.yaml"))
}

pub fn default_data_dir() -> Option<PathBuf> {
    xdg_dir("XDG_DATA_HOME", ".local/share").map(|dir| dir.join(APP_DIR))
}

fn xdg_dir(var: &str, home_relative: &str) -> Option<PathBuf> {
    env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").filter(|v| !v.is_empty()).map(|h| PathBuf::from(h).join(home_relative)))
}
