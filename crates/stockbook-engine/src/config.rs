//! Ledger engine configuration.
//!
//! Configuration is loaded from environment variables with fallback to defaults.
//!
//! | Variable                      | Default        |
//! |-------------------------------|----------------|
//! | `STOCKBOOK_DATABASE_PATH`     | `stockbook.db` |
//! | `STOCKBOOK_MAX_CONNECTIONS`   | `5`            |
//! | `STOCKBOOK_TAX_RATE_BPS`      | `1600` (16%)   |
//! | `STOCKBOOK_LOCK_TIMEOUT_MS`   | `5000`         |
//! | `STOCKBOOK_COMMIT_ATTEMPTS`   | `3`            |
//! | `STOCKBOOK_NUMBER_ATTEMPTS`   | `5`            |

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use stockbook_core::validation::validate_tax_rate_bps;
use stockbook_core::{TaxRate, DEFAULT_TAX_RATE_BPS};
use stockbook_db::DbConfig;

/// Ledger engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// SQLite database file, or `:memory:`
    pub database_path: PathBuf,

    /// Pool size
    pub max_connections: u32,

    /// Sales and purchase-order tax, in basis points
    pub tax_rate_bps: u32,

    /// How long an operation waits for its keys before giving up (retryable)
    pub lock_timeout_ms: u64,

    /// Attempts per unit of work when storage reports contention
    pub commit_attempts: u32,

    /// Attempts at a fresh ticket / PO number after a collision
    pub number_attempts: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            database_path: PathBuf::from("stockbook.db"),
            max_connections: 5,
            tax_rate_bps: DEFAULT_TAX_RATE_BPS,
            lock_timeout_ms: 5_000,
            commit_attempts: 3,
            number_attempts: 5,
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup (environment, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = LedgerConfig::default();

        let config = LedgerConfig {
            database_path: lookup("STOCKBOOK_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),

            max_connections: parse_or(&lookup, "STOCKBOOK_MAX_CONNECTIONS", defaults.max_connections)?,

            tax_rate_bps: parse_or(&lookup, "STOCKBOOK_TAX_RATE_BPS", defaults.tax_rate_bps)?,

            lock_timeout_ms: parse_or(&lookup, "STOCKBOOK_LOCK_TIMEOUT_MS", defaults.lock_timeout_ms)?,

            commit_attempts: parse_or(&lookup, "STOCKBOOK_COMMIT_ATTEMPTS", defaults.commit_attempts)?,

            number_attempts: parse_or(&lookup, "STOCKBOOK_NUMBER_ATTEMPTS", defaults.number_attempts)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// In-memory database, default everything else. For tests and demos.
    pub fn in_memory() -> Self {
        LedgerConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if validate_tax_rate_bps(self.tax_rate_bps).is_err() {
            return Err(ConfigError::InvalidValue("STOCKBOOK_TAX_RATE_BPS".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("STOCKBOOK_MAX_CONNECTIONS".to_string()));
        }
        if self.commit_attempts == 0 {
            return Err(ConfigError::InvalidValue("STOCKBOOK_COMMIT_ATTEMPTS".to_string()));
        }
        if self.number_attempts == 0 {
            return Err(ConfigError::InvalidValue("STOCKBOOK_NUMBER_ATTEMPTS".to_string()));
        }
        Ok(())
    }

    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Pool configuration for this ledger.
    pub fn db_config(&self) -> DbConfig {
        if self.database_path.as_os_str() == ":memory:" {
            DbConfig::in_memory()
        } else {
            DbConfig::new(&self.database_path).max_connections(self.max_connections)
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.tax_rate().bps(), 1600);
        assert_eq!(config.lock_timeout(), Duration::from_secs(5));
        assert_eq!(config.commit_attempts, 3);
        assert_eq!(config.database_path, PathBuf::from("stockbook.db"));
    }

    #[test]
    fn test_overrides() {
        let config = LedgerConfig::from_lookup(lookup(&[
            ("STOCKBOOK_DATABASE_PATH", "/data/ledger.db"),
            ("STOCKBOOK_TAX_RATE_BPS", "800"),
            ("STOCKBOOK_LOCK_TIMEOUT_MS", " 250 "),
        ]))
        .unwrap();
        assert_eq!(config.tax_rate().bps(), 800);
        assert_eq!(config.lock_timeout(), Duration::from_millis(250));
        assert!(!config.db_config().is_in_memory());
    }

    #[test]
    fn test_invalid_values() {
        let err = LedgerConfig::from_lookup(lookup(&[("STOCKBOOK_COMMIT_ATTEMPTS", "many")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for STOCKBOOK_COMMIT_ATTEMPTS");

        assert!(LedgerConfig::from_lookup(lookup(&[("STOCKBOOK_TAX_RATE_BPS", "20000")])).is_err());
        assert!(LedgerConfig::from_lookup(lookup(&[("STOCKBOOK_NUMBER_ATTEMPTS", "0")])).is_err());
    }

    #[test]
    fn test_in_memory() {
        assert!(LedgerConfig::in_memory().db_config().is_in_memory());
    }
}
