// crates/server/src/config.rs
//! Process configuration from environment variables.
//!
//! Runtime tunables (timeouts, section limits, trend shape) live in the
//! database's system properties instead and are read at call time.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DB_PATH_VAR: &str = "DROPSTATS_DB_PATH";
pub const REFRESH_SECS_VAR: &str = "DROPSTATS_REFRESH_SECS";
pub const REFRESH_DELAY_SECS_VAR: &str = "DROPSTATS_REFRESH_DELAY_SECS";
pub const TREND_REFRESH_SECS_VAR: &str = "DROPSTATS_TREND_REFRESH_SECS";
pub const QUERY_TIMEOUT_SECS_VAR: &str = "DROPSTATS_QUERY_TIMEOUT_SECS";

/// Current-matrix refresh period.
const DEFAULT_REFRESH_SECS: u64 = 3600;
/// Delay before the first refresh after boot.
const DEFAULT_REFRESH_DELAY_SECS: u64 = 600;
const DEFAULT_TREND_REFRESH_SECS: u64 = 86_400;
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Trend bucket width when `trendInterval` is not configured: one day.
pub const DEFAULT_TREND_INTERVAL_MS: i64 = 86_400_000;
/// Trend lookback when `trendRange` is not configured: 60 days.
pub const DEFAULT_TREND_RANGE_MS: i64 = 60 * DEFAULT_TREND_INTERVAL_MS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("Failed to resolve default database path: {0}")]
    DbPath(#[from] dropstats_db::DbError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub db_path: PathBuf,
    pub refresh_interval: Duration,
    pub refresh_delay: Duration,
    pub trend_refresh_interval: Duration,
    /// Fallback for personalized and batch queries without a configured timeout.
    pub query_timeout: Duration,
    /// Wait before re-reading an empty global cache.
    pub retry_delay: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let secs = |var: &'static str, default: u64| -> Result<Duration, ConfigError> {
            match lookup(var) {
                Some(value) => value
                    .trim()
                    .parse()
                    .map(Duration::from_secs)
                    .map_err(|_| ConfigError::InvalidNumber { var, value }),
                None => Ok(Duration::from_secs(default)),
            }
        };

        let db_path = match lookup(DB_PATH_VAR) {
            Some(path) => PathBuf::from(path),
            None => dropstats_db::default_db_path()?,
        };

        Ok(Self {
            db_path,
            refresh_interval: secs(REFRESH_SECS_VAR, DEFAULT_REFRESH_SECS)?,
            refresh_delay: secs(REFRESH_DELAY_SECS_VAR, DEFAULT_REFRESH_DELAY_SECS)?,
            trend_refresh_interval: secs(TREND_REFRESH_SECS_VAR, DEFAULT_TREND_REFRESH_SECS)?,
            query_timeout: secs(QUERY_TIMEOUT_SECS_VAR, DEFAULT_QUERY_TIMEOUT_SECS)?,
            retry_delay: Duration::from_secs(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            (DB_PATH_VAR, "/tmp/drops.db"),
            (REFRESH_SECS_VAR, "60"),
            (REFRESH_DELAY_SECS_VAR, " 0 "),
        ]))
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/drops.db"));
        assert_eq!(config.refresh_interval, Duration::from_secs(60));
        assert_eq!(config.refresh_delay, Duration::ZERO);
        assert_eq!(config.query_timeout, Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS));
        assert_eq!(config.trend_refresh_interval, Duration::from_secs(DEFAULT_TREND_REFRESH_SECS));
    }

    #[test]
    fn test_rejects_malformed_number() {
        let err = ServerConfig::from_lookup(lookup(&[(DB_PATH_VAR, "x.db"), (QUERY_TIMEOUT_SECS_VAR, "-5")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { var: QUERY_TIMEOUT_SECS_VAR, .. }));
    }
}
