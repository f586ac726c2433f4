//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (M360_*)
//! 2. TOML config file (if M360_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (M360_*)
/// 2. TOML config file (if M360_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Prefix shared by every cache generation's store name.
    ///
    /// Set via M360_CACHE_PREFIX environment variable.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Current cache generation. Bumping it is the only way to invalidate
    /// everything cached so far.
    ///
    /// Set via M360_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Same-origin paths stored at install time.
    ///
    /// Set via M360_SEED_PATHS environment variable (e.g. `["/", "/index.html"]`).
    #[serde(default = "default_seed_paths")]
    pub seed_paths: Vec<String>,

    /// Cached document served to navigations when the network is down.
    ///
    /// Set via M360_OFFLINE_FALLBACK environment variable.
    #[serde(default = "default_offline_fallback")]
    pub offline_fallback: String,

    /// Origin of the site whose requests are intercepted.
    ///
    /// Set via M360_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Address the local front listens on.
    ///
    /// Set via M360_LISTEN_ADDR environment variable.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Path to SQLite cache database.
    ///
    /// Set via M360_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for network requests.
    ///
    /// Set via M360_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Network request timeout in milliseconds.
    ///
    /// Set via M360_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum response body size in bytes.
    ///
    /// Set via M360_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_cache_prefix() -> String {
    "monastery360-cache".into()
}

fn default_cache_version() -> String {
    "v1".into()
}

fn default_seed_paths() -> Vec<String> {
    vec!["/".into(), "/index.html".into(), "/placeholder.svg".into()]
}

fn default_offline_fallback() -> String {
    "/".into()
}

fn default_origin() -> String {
    "http://127.0.0.1:8080".into()
}

fn default_listen_addr() -> String {
    "127.0.0.1:8360".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./m360-cache.sqlite")
}

fn default_user_agent() -> String {
    "m360-offline/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_prefix: default_cache_prefix(),
            cache_version: default_cache_version(),
            seed_paths: default_seed_paths(),
            offline_fallback: default_offline_fallback(),
            origin: default_origin(),
            listen_addr: default_listen_addr(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Name of the current cache store, e.g. `monastery360-cache-v1`.
    pub fn store_name(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.cache_version)
    }

    /// Parsed origin. Only valid after `validate()` has passed.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin is not an http(s) URL.
    pub fn origin_url(&self) -> Result<url::Url, ConfigError> {
        let parsed = url::Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;
        match parsed.scheme() {
            "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
            _ => Err(ConfigError::Invalid { field: "origin".into(), reason: "must be an http(s) URL with a host".into() }),
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `M360_`
    /// 2. TOML file from `M360_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("M360_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("M360_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        Self::from_figment(figment)
    }

    /// Extract and validate configuration from an already layered figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
