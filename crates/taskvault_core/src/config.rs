//! Runtime configuration for the sync core.
//!
//! # Responsibility
//! - Resolve API endpoint, cache location, timeout and logging settings.
//! - Normalize user-supplied values before any component sees them.
//!
//! # Invariants
//! - `api_base_url` is http(s) and always ends with `/`.
//! - `log_level` is one of `trace|debug|info|warn|error`.

use crate::logging::{default_log_level, normalize_level};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://taskvault-lite.onrender.com/";
pub const CACHE_FILE_NAME: &str = "taskvault_cache.sqlite3";

pub const ENV_API_BASE_URL: &str = "TASKVAULT_API_BASE_URL";
pub const ENV_CACHE_PATH: &str = "TASKVAULT_CACHE_PATH";
pub const ENV_TIMEOUT_SECS: &str = "TASKVAULT_TIMEOUT_SECS";
pub const ENV_LOG_LEVEL: &str = "TASKVAULT_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "TASKVAULT_LOG_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidBaseUrl(String),
    InvalidTimeout(String),
    InvalidLogLevel(String),
    HttpClient(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBaseUrl(value) => {
                write!(f, "api base url must start with http:// or https://, got `{value}`")
            }
            Self::InvalidTimeout(value) => {
                write!(f, "timeout must be a positive number of seconds, got `{value}`")
            }
            Self::InvalidLogLevel(message) => f.write_str(message),
            Self::HttpClient(message) => write!(f, "failed to build http client: {message}"),
        }
    }
}

impl Error for ConfigError {}

/// Settings shared by the gateway, cache and logging bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub api_base_url: String,
    pub cache_path: PathBuf,
    /// No timeout when `None`; hung requests simply stay pending.
    pub request_timeout: Option<Duration>,
    pub log_level: &'static str,
    pub log_dir: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            cache_path: default_cache_path(),
            request_timeout: None,
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

impl CoreConfig {
    /// Reads `TASKVAULT_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env`, with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        if let Some(url) = read(ENV_API_BASE_URL) {
            config.api_base_url = normalize_base_url(&url)?;
        }
        if let Some(path) = read(ENV_CACHE_PATH) {
            config.cache_path = PathBuf::from(path);
        }
        if let Some(raw) = read(ENV_TIMEOUT_SECS) {
            config.request_timeout = Some(parse_timeout_secs(&raw)?);
        }
        if let Some(level) = read(ENV_LOG_LEVEL) {
            config.log_level = normalize_level(&level).map_err(ConfigError::InvalidLogLevel)?;
        }
        if let Some(dir) = read(ENV_LOG_DIR) {
            config.log_dir = Some(PathBuf::from(dir));
        }
        Ok(config)
    }
}

/// Validates scheme and appends the trailing slash relative paths rely on.
pub fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    let has_host = ["http://", "https://"].iter().any(|scheme| {
        trimmed
            .strip_prefix(scheme)
            .is_some_and(|rest| !rest.trim_matches('/').is_empty())
    });
    if !has_host {
        return Err(ConfigError::InvalidBaseUrl(trimmed.to_string()));
    }
    if trimmed.ends_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/"))
    }
}

pub fn parse_timeout_secs(raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidTimeout(raw.trim().to_string())),
    }
}

fn default_cache_path() -> PathBuf {
    std::env::temp_dir().join("taskvault").join(CACHE_FILE_NAME)
}
