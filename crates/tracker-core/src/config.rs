//! Client configuration
//!
//! Values come from `config.toml` (see [`Config::config_file_path`]) and are
//! then overridden by `TRACKER_*` environment variables. Missing keys take
//! their defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default hosted API endpoint
pub const DEFAULT_API_URL: &str = "http://localhost:5001";

/// Default bound on a single remote request
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

const CONFIG_ENV: &str = "TRACKER_CONFIG";
const DATA_DIR_ENV: &str = "TRACKER_DATA_DIR";
const API_URL_ENV: &str = "TRACKER_API_URL";
const SYNC_ENABLED_ENV: &str = "TRACKER_SYNC_ENABLED";
const TIMEOUT_ENV: &str = "TRACKER_TIMEOUT_SECS";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for local state, session and backups
    pub data_dir: PathBuf,

    /// Base URL of the hosted API
    pub api_url: String,

    /// Run a full sync after local edits
    pub sync_enabled: bool,

    /// Timeout applied to every remote request
    pub request_timeout_secs: u64,

    /// Log file (stderr when unset)
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tracker"),
            api_url: DEFAULT_API_URL.to_string(),
            sync_enabled: false,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            log_file: None,
        }
    }
}

impl Config {
    /// Load from the default file, then the environment
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load from `path` when given on the command line, else the default file
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load from `path` (defaults when it does not exist), apply environment
    /// overrides and create the data directory
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config: Config = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .with_context(|| format!("Invalid config file {:?}", path))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e).with_context(|| format!("Cannot read config file {:?}", path)),
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Apply overrides looked up by variable name
    ///
    /// An empty API URL restores the default. Unparseable timeouts are ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(DATA_DIR_ENV) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup(API_URL_ENV) {
            self.api_url = if url.is_empty() {
                DEFAULT_API_URL.to_string()
            } else {
                url
            };
        }
        if let Some(flag) = lookup(SYNC_ENABLED_ENV) {
            self.sync_enabled = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(secs) = lookup(TIMEOUT_ENV).and_then(|v| v.parse::<u64>().ok()) {
            self.request_timeout_secs = secs.max(1);
        }
    }

    pub fn ensure_data_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("Cannot create data directory {:?}", self.data_dir))
    }

    /// Write as TOML, creating parent directories
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create {:?}", parent))?;
        }
        let content = toml::to_string_pretty(self).context("Cannot encode config")?;
        std::fs::write(path, content).with_context(|| format!("Cannot write {:?}", path))
    }

    /// `TRACKER_CONFIG`, else `<config dir>/tracker/config.toml`
    pub fn config_file_path() -> PathBuf {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tracker")
                .join("config.toml"),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Local key-value state file
    pub fn local_state_path(&self) -> PathBuf {
        self.data_dir.join("local_state.json")
    }

    /// Persisted session cookie
    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("session")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }
}
