//! Configuration management for xpromo
//!
//! Handles loading and validation of `xpromo.toml`. Every field has a
//! default, so an absent or partial file is always valid input.
//!
//! Lookup order for the config file:
//! 1. an explicit path (the CLI's `--config`)
//! 2. `$XPROMO_CONFIG`
//! 3. `<config dir>/xpromo/xpromo.toml`
//! 4. built-in defaults

use crate::dismissal::Frequency;
use crate::error::ConfigError;
use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "XPROMO_CONFIG";
pub const CONFIG_FILE_NAME: &str = "xpromo.toml";
const APP_DIR: &str = "xpromo";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XPromoConfig {
    /// Deep-link target settings
    #[serde(default)]
    pub links: LinksConfig,

    /// Cookie names for logged-out identity
    #[serde(default)]
    pub cookies: CookieConfig,

    /// Dismissal windows
    #[serde(default)]
    pub dismissal: DismissalConfig,

    /// Durable store location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LogConfig,
}

/// Deep-link configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinksConfig {
    /// Web origin prefixed to paths for `$og_redirect` (no trailing slash)
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Link service host
    #[serde(default = "default_host")]
    pub host: String,

    /// Link scheme
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Prefix the Android app expects on deep-link paths
    #[serde(default = "default_android_scheme_prefix")]
    pub android_scheme_prefix: String,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            host: default_host(),
            scheme: default_scheme(),
            android_scheme_prefix: default_android_scheme_prefix(),
        }
    }
}

fn default_origin() -> String {
    "https://www.reddit.com".to_string()
}

fn default_host() -> String {
    "reddit.app.link".to_string()
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_android_scheme_prefix() -> String {
    "reddit".to_string()
}

/// Cookie configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieConfig {
    #[serde(default = "default_loid_cookie")]
    pub loid: String,

    #[serde(default = "default_loid_created_cookie")]
    pub loid_created: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            loid: default_loid_cookie(),
            loid_created: default_loid_created_cookie(),
        }
    }
}

fn default_loid_cookie() -> String {
    "loid".to_string()
}

fn default_loid_created_cookie() -> String {
    "loidcreated".to_string()
}

/// Dismissal configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DismissalConfig {
    /// Fallback window of the experiment-assigned check when no experiment
    /// frequency applies. The two-week checks ignore it.
    #[serde(default)]
    pub default_frequency: Frequency,
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON store file path
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
        .join("storage.json")
}

/// Expand a leading `~` to the home directory; other paths are unchanged.
fn expand_tilde(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

impl XPromoConfig {
    /// Parse a TOML document, expand `~` in paths, and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.storage.path = expand_tilde(&config.storage.path);
        if let Some(file) = &config.logging.file {
            config.logging.file = Some(expand_tilde(file));
        }
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.display().to_string(), e.to_string()))?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(config = %path.display(), "Loaded xpromo config");
        Ok(config)
    }

    /// Load using the standard lookup order; defaults when no file exists.
    ///
    /// An explicit path that does not exist is an error. An implicit one is
    /// not.
    pub fn load(explicit: Option<&Path>) -> crate::Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        match resolve_config_path(None) {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Serialize as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeFailed(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let links = &self.links;
        if links.origin.is_empty() {
            return Err(ConfigError::ValidationError(
                "links.origin must not be empty".to_string(),
            ));
        }
        if links.origin.ends_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "links.origin must not end with '/': {}",
                links.origin
            )));
        }
        if links.host.is_empty() {
            return Err(ConfigError::ValidationError(
                "links.host must not be empty".to_string(),
            ));
        }
        if links.scheme.is_empty() {
            return Err(ConfigError::ValidationError(
                "links.scheme must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Config file to load, if one can be found.
///
/// `explicit` is returned unconditionally; the environment and default
/// locations are returned only when the file exists.
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(path));
    }
    let default = default_config_path()?;
    default.exists().then_some(default)
}

/// `<config dir>/xpromo/xpromo.toml`
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE_NAME))
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// JSON lines
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected one of: pretty, json")),
        }
    }
}
