//! Database configuration from environment variables.
//!
//! Every variable is optional and falls back to the [`DbConfig::new`]
//! defaults.
//!
//! | Variable                    | Field             | Default      |
//! |-----------------------------|-------------------|--------------|
//! | `LEDGER_DB_PATH`            | `database_path`   | `ledger.db`  |
//! | `LEDGER_MAX_CONNECTIONS`    | `max_connections` | 5            |
//! | `LEDGER_ACQUIRE_TIMEOUT_MS` | `acquire_timeout` | 30000        |
//! | `LEDGER_BUSY_TIMEOUT_MS`    | `busy_timeout`    | 5000         |

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::pool::DbConfig;

pub const DB_PATH_VAR: &str = "LEDGER_DB_PATH";
pub const MAX_CONNECTIONS_VAR: &str = "LEDGER_MAX_CONNECTIONS";
pub const ACQUIRE_TIMEOUT_VAR: &str = "LEDGER_ACQUIRE_TIMEOUT_MS";
pub const BUSY_TIMEOUT_VAR: &str = "LEDGER_BUSY_TIMEOUT_MS";

const DEFAULT_DB_PATH: &str = "ledger.db";

impl DbConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup(DB_PATH_VAR).unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        if path.trim().is_empty() {
            return Err(ConfigError::MissingRequired(DB_PATH_VAR.to_string()));
        }

        let mut config = if path == ":memory:" {
            DbConfig::in_memory()
        } else {
            DbConfig::new(path)
        };

        if let Some(max) = parse_var::<u32>(&lookup, MAX_CONNECTIONS_VAR)? {
            if max == 0 {
                return Err(ConfigError::InvalidValue(MAX_CONNECTIONS_VAR.to_string()));
            }
            let min = config.min_connections.min(max);
            config = config.max_connections(max).min_connections(min);
        }

        if let Some(ms) = parse_var::<u64>(&lookup, ACQUIRE_TIMEOUT_VAR)? {
            config = config.acquire_timeout(Duration::from_millis(ms));
        }

        if let Some(ms) = parse_var::<u64>(&lookup, BUSY_TIMEOUT_VAR)? {
            config = config.busy_timeout(Duration::from_millis(ms));
        }

        Ok(config)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = DbConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.database_path.to_str(), Some(DEFAULT_DB_PATH));
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let config = DbConfig::from_lookup(lookup(&[
            (DB_PATH_VAR, "/var/lib/ledger/ledger.db"),
            (MAX_CONNECTIONS_VAR, "8"),
            (ACQUIRE_TIMEOUT_VAR, "250"),
            (BUSY_TIMEOUT_VAR, " 1000 "),
        ]))
        .unwrap();

        assert_eq!(config.max_connections, 8);
        assert_eq!(config.acquire_timeout, Duration::from_millis(250));
        assert_eq!(config.busy_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_in_memory_path() {
        let config = DbConfig::from_lookup(lookup(&[(DB_PATH_VAR, ":memory:")])).unwrap();
        assert!(config.is_in_memory());
        assert_eq!(config.max_connections, 1);
    }

    #[test]
    fn test_invalid_values() {
        let err = DbConfig::from_lookup(lookup(&[(MAX_CONNECTIONS_VAR, "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref name) if name == MAX_CONNECTIONS_VAR));

        assert!(DbConfig::from_lookup(lookup(&[(MAX_CONNECTIONS_VAR, "0")])).is_err());
        assert!(DbConfig::from_lookup(lookup(&[(ACQUIRE_TIMEOUT_VAR, "-5")])).is_err());

        let err = DbConfig::from_lookup(lookup(&[(DB_PATH_VAR, "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired(_)));
    }
}
