//! Configuration system for plurkdump.
//!
//! Layered, lowest priority first:
//!
//! 1. **Compiled defaults**
//! 2. **Config file** - `~/.config/plurkdump/config.toml` (or `--config`)
//! 3. **Environment variables** - `PLURK_*` prefix
//! 4. **CLI arguments** - applied by the command handlers
//!
//! Consumer credentials are deliberately not part of this file; they come
//! from `CONSUMER_KEY` / `CONSUMER_SECRET` (see [`crate::oauth`]).
//!
//! # Example Configuration File
//!
//! ```toml
//! [paths]
//! db = "~/plurks.db"
//! output_dir = "charts"
//!
//! [api]
//! base_url = "https://www.plurk.com"
//! page_size = 100
//!
//! [sync]
//! store_reply_authors = true
//!
//! [report]
//! palette = "tab20"
//! scale = 2.0
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PlurkError, Result};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub api: ApiConfig,
    pub sync: SyncConfig,
    pub report: ReportConfig,
}

/// Where the store and the charts live.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// `SQLite` store. Environment variable: `PLURK_DB`
    pub db: Option<PathBuf>,

    /// Directory charts are written to. Environment variable: `PLURK_OUTPUT_DIR`
    pub output_dir: Option<PathBuf>,
}

/// Remote API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Scheme and host of the API. Environment variable: `PLURK_BASE_URL`
    pub base_url: String,

    /// Plurks requested per timeline page. Environment variable: `PLURK_PAGE_SIZE`
    pub page_size: u32,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    pub user_agent: String,
}

/// Sync loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Stop after this many timeline pages (unbounded when unset).
    pub max_pages: Option<usize>,

    /// Store the authors the responses endpoint sends along with replies.
    pub store_reply_authors: bool,
}

/// Chart settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Color map name. Environment variable: `PLURK_PALETTE`
    pub palette: String,

    /// Multiplier for figure size, fonts and resolution. Environment variable: `PLURK_SCALE`
    pub scale: f64,

    pub title: String,
    pub x_label: String,
    pub y_label: String,

    /// Label every n-th month on the x axis.
    pub label_stride: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: crate::DEFAULT_BASE_URL.to_string(),
            page_size: crate::DEFAULT_PAGE_SIZE,
            timeout_secs: 30,
            user_agent: concat!("plurkdump/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_pages: None,
            store_reply_authors: true,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            palette: "tab20".to_string(),
            scale: 2.0,
            title: "Meten is Weten".to_string(),
            x_label: "Maand".to_string(),
            y_label: "Plurks + Antwoorden".to_string(),
            label_stride: 4,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// With `explicit` set, that file must exist and parse; otherwise the
    /// user config file is optional.
    ///
    /// # Errors
    /// Returns an error if a config file is unreadable or invalid, or an
    /// environment override does not parse.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::user_config_path() {
                Some(path) if path.exists() => Self::load_from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;

        debug!("Configuration loaded: {:?}", config);
        Ok(config)
    }

    /// Parse a TOML configuration file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PlurkError::path_error("read config", path, e))?;
        let config = toml::from_str(&content).map_err(|e| PlurkError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Path of the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("plurkdump").join("config.toml"))
    }

    /// Apply `PLURK_*` overrides read through `lookup`.
    ///
    /// # Errors
    /// Returns [`PlurkError::EnvVarError`] when a numeric override does not parse.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(db) = lookup("PLURK_DB") {
            self.paths.db = Some(PathBuf::from(db));
        }
        if let Some(dir) = lookup("PLURK_OUTPUT_DIR") {
            self.paths.output_dir = Some(PathBuf::from(dir));
        }
        if let Some(base_url) = lookup("PLURK_BASE_URL") {
            self.api.base_url = base_url;
        }
        if let Some(size) = lookup("PLURK_PAGE_SIZE") {
            self.api.page_size = parse_env("PLURK_PAGE_SIZE", &size)?;
        }
        if let Some(palette) = lookup("PLURK_PALETTE") {
            self.report.palette = palette;
        }
        if let Some(scale) = lookup("PLURK_SCALE") {
            self.report.scale = parse_env("PLURK_SCALE", &scale)?;
        }
        Ok(())
    }

    /// Reject values the sync loop or the renderer cannot work with.
    ///
    /// # Errors
    /// Returns [`PlurkError::InvalidArgument`] describing the bad value.
    pub fn validate(&self) -> Result<()> {
        if self.api.page_size == 0 {
            return Err(PlurkError::invalid_argument("api.page_size must be at least 1"));
        }
        if !(self.report.scale.is_finite() && self.report.scale > 0.0) {
            return Err(PlurkError::invalid_argument(format!(
                "report.scale must be a positive number, got {}",
                self.report.scale
            )));
        }
        if self.report.label_stride == 0 {
            return Err(PlurkError::invalid_argument("report.label_stride must be at least 1"));
        }
        url::Url::parse(&self.api.base_url).map_err(|e| {
            PlurkError::invalid_argument(format!("api.base_url '{}': {e}", self.api.base_url))
        })?;
        Ok(())
    }

    /// Store path, falling back to the per-user data directory.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.paths.db.clone().unwrap_or_else(crate::default_db_path)
    }

    /// Chart directory, falling back to the working directory.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.paths
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Write this configuration to `path`, creating parent directories.
    ///
    /// # Errors
    /// Returns an error if the directory or file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PlurkError::path_error("create directory", parent, e))?;
        }
        std::fs::write(path, self.to_toml())
            .map_err(|e| PlurkError::path_error("write config", path, e))?;
        info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Pretty TOML rendering.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| PlurkError::EnvVarError {
        var: var.to_string(),
        reason: e.to_string(),
    })
}
