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

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

fn check_name_part(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(invalid(field, "must not contain whitespace"));
    }
    Ok(())
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `cache_prefix` or `cache_version` is empty or contains whitespace
    /// - a seed path or `offline_fallback` is not an absolute path
    /// - `offline_fallback` is not one of the seed paths
    /// - `origin` is not an http(s) URL
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_name_part("cache_prefix", &self.cache_prefix)?;
        check_name_part("cache_version", &self.cache_version)?;

        if self.seed_paths.is_empty() {
            return Err(invalid("seed_paths", "must list at least one path"));
        }
        if let Some(bad) = self.seed_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::Invalid {
                field: "seed_paths".into(),
                reason: format!("{bad:?} must start with '/'"),
            });
        }

        if !self.offline_fallback.starts_with('/') {
            return Err(invalid("offline_fallback", "must start with '/'"));
        }
        if !self.seed_paths.contains(&self.offline_fallback) {
            return Err(invalid("offline_fallback", "must be one of seed_paths"));
        }

        self.origin_url()?;

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        let mut unique = self.seed_paths.clone();
        unique.sort();
        unique.dedup();
        if unique.len() != self.seed_paths.len() {
            tracing::warn!(
                seed_count = self.seed_paths.len(),
                unique_count = unique.len(),
                "seed_paths contains duplicates; each path is stored once"
            );
        }

        Ok(())
    }
}
