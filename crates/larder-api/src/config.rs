use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub db_busy_timeout: Duration,
    pub admin_token: Option<String>,
    pub rate_limit_window: Duration,
    pub sync_rate_limit_per_window: u32,
    pub admin_rate_limit_per_window: u32,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_path", &self.database_path)
            .field("db_busy_timeout", &self.db_busy_timeout)
            .field(
                "admin_token",
                &self.admin_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("rate_limit_window", &self.rate_limit_window)
            .field(
                "sync_rate_limit_per_window",
                &self.sync_rate_limit_per_window,
            )
            .field(
                "admin_rate_limit_per_window",
                &self.admin_rate_limit_per_window,
            )
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "LARDER_API_BIND_ADDR", "127.0.0.1:8080");
        let database_path =
            PathBuf::from(value_or_default(&lookup, "LARDER_DATABASE_PATH", "larder.db"));

        let busy_timeout_ms = ranged(&lookup, "LARDER_DB_BUSY_TIMEOUT_MS", "5000", 0, 60_000)?;

        let admin_token = optional_trimmed(&lookup, "LARDER_ADMIN_TOKEN");
        if admin_token.as_ref().is_some_and(|token| token.len() < 16) {
            return Err(ConfigError::Invalid(
                "LARDER_ADMIN_TOKEN must be at least 16 characters".to_string(),
            ));
        }

        let rate_limit_window_secs = ranged(&lookup, "RATE_LIMIT_WINDOW_SECS", "60", 10, 3_600)?;
        let sync_rate_limit_per_window =
            ranged(&lookup, "SYNC_RATE_LIMIT_PER_WINDOW", "120", 1, 5_000)?;
        let admin_rate_limit_per_window =
            ranged(&lookup, "ADMIN_RATE_LIMIT_PER_WINDOW", "20", 1, 1_000)?;

        Ok(Self {
            bind_addr,
            database_path,
            db_busy_timeout: Duration::from_millis(busy_timeout_ms.into()),
            admin_token,
            rate_limit_window: Duration::from_secs(rate_limit_window_secs.into()),
            sync_rate_limit_per_window,
            admin_rate_limit_per_window,
        })
    }
}

fn ranged(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
    min: u32,
    max: u32,
) -> Result<u32, ConfigError> {
    let value = value_or_default(lookup, name, default)
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(format!("{name} must be an integer in [{min}, {max}]")))?;
    if !(min..=max).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{min}, {max}]"
        )));
    }
    Ok(value)
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn config_defaults_without_env() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.database_path, PathBuf::from("larder.db"));
        assert_eq!(config.db_busy_timeout, Duration::from_millis(5_000));
        assert!(config.admin_token.is_none());
        assert_eq!(config.sync_rate_limit_per_window, 120);
        assert_eq!(config.admin_rate_limit_per_window, 20);
    }

    #[test]
    fn config_rejects_out_of_range_values() {
        let err = config_from(&[("RATE_LIMIT_WINDOW_SECS", "5")]).unwrap_err();
        assert!(err.to_string().contains("RATE_LIMIT_WINDOW_SECS"));

        let err = config_from(&[("LARDER_DB_BUSY_TIMEOUT_MS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("LARDER_DB_BUSY_TIMEOUT_MS"));
    }

    #[test]
    fn config_rejects_short_admin_token() {
        let err = config_from(&[("LARDER_ADMIN_TOKEN", "short")]).unwrap_err();
        assert!(err.to_string().contains("LARDER_ADMIN_TOKEN"));
    }

    #[test]
    fn config_redacts_admin_token_in_debug() {
        let config = config_from(&[("LARDER_ADMIN_TOKEN", "sensitive-admin-token")]).unwrap();

        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("sensitive-admin-token"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
