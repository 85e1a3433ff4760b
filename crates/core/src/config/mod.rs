//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (OFFCACHE_*)
//! 2. TOML config file (if OFFCACHE_CONFIG_FILE set)
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
/// 1. Environment variables (OFFCACHE_*)
/// 2. TOML config file (if OFFCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite cache database.
    ///
    /// Set via OFFCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Current cache version identifier (e.g. "offcache-v1.0").
    ///
    /// Must change whenever the precache list or caching policy changes,
    /// so a new install/activate cycle rolls the store over.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Origin the agent serves, e.g. "https://app.example.com".
    ///
    /// Precache paths are resolved against it and the root-document
    /// caching exception compares against it.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Ordered list of origin-relative paths precached during install.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Path served to failed document navigations when offline.
    ///
    /// Must be a member of `precache` so it is guaranteed cached before
    /// the first offline navigation.
    #[serde(default = "default_offline_path")]
    pub offline_path: String,

    /// URL schemes that bypass interception entirely (browser-internal
    /// extension schemes).
    #[serde(default = "default_excluded_schemes")]
    pub excluded_schemes: Vec<String>,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum number of redirects to follow.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./offcache.sqlite")
}

fn default_cache_name() -> String {
    "offcache-v1.0".into()
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_precache() -> Vec<String> {
    vec![
        "/".into(),
        "/index.html".into(),
        "/offline.html".into(),
        "/style.css".into(),
        "/app.js".into(),
        "/icons/icon-192x192.png".into(),
    ]
}

fn default_offline_path() -> String {
    "/offline.html".into()
}

fn default_excluded_schemes() -> Vec<String> {
    vec!["chrome-extension".into(), "moz-extension".into(), "safari-web-extension".into()]
}

fn default_user_agent() -> String {
    "offcache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_redirects() -> usize {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_name: default_cache_name(),
            origin: default_origin(),
            precache: default_precache(),
            offline_path: default_offline_path(),
            excluded_schemes: default_excluded_schemes(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Origin parsed as a URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin does not parse; `load`
    /// validates this up front, so failures here mean the config was built
    /// by hand with a bad origin.
    pub fn origin_url(&self) -> Result<url::Url, ConfigError> {
        url::Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `OFFCACHE_`
    /// 2. TOML file from `OFFCACHE_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("OFFCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("OFFCACHE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
