//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `cache_name` is empty
    /// - `origin` is not an absolute http(s) URL with a host
    /// - `precache` is empty, or contains a path not starting with `/`
    /// - `offline_path` is not a member of `precache`
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_name.is_empty() {
            return Err(ConfigError::Invalid { field: "cache_name".into(), reason: "must not be empty".into() });
        }

        let origin = self.origin_url()?;
        match origin.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(ConfigError::Invalid {
                    field: "origin".into(),
                    reason: format!("unsupported scheme: {scheme}"),
                });
            }
        }
        if origin.host_str().is_none() {
            return Err(ConfigError::Invalid { field: "origin".into(), reason: "must have a host".into() });
        }

        if self.precache.is_empty() {
            return Err(ConfigError::Invalid { field: "precache".into(), reason: "must not be empty".into() });
        }
        for path in &self.precache {
            if !path.starts_with('/') {
                return Err(ConfigError::Invalid {
                    field: "precache".into(),
                    reason: format!("path must be origin-relative (start with /): {path}"),
                });
            }
        }

        if !self.precache.contains(&self.offline_path) {
            return Err(ConfigError::Invalid {
                field: "offline_path".into(),
                reason: "must be listed in precache so it is cached before first offline navigation".into(),
            });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        Ok(())
    }
}
