//! Runtime configuration, read from the environment.

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Ledger settings.
///
/// | variable | default |
/// |---|---|
/// | `DATABASE_URL` | unset (in-memory store) |
/// | `STOCKLEDGER_DB_MAX_CONNECTIONS` | 5 |
/// | `STOCKLEDGER_MAX_CONFLICT_RETRIES` | 3 |
/// | `STOCKLEDGER_LOCK_TIMEOUT_MS` | 5000 |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// How many times a whole operation is re-run after a lock conflict.
    pub max_conflict_retries: u32,
    pub lock_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let db_max_connections = match get("STOCKLEDGER_DB_MAX_CONNECTIONS") {
            Some(raw) => parse_positive::<u32>("STOCKLEDGER_DB_MAX_CONNECTIONS", &raw)?,
            None => defaults.db_max_connections,
        };

        let max_conflict_retries = match get("STOCKLEDGER_MAX_CONFLICT_RETRIES") {
            Some(raw) => parse("STOCKLEDGER_MAX_CONFLICT_RETRIES", &raw)?,
            None => defaults.max_conflict_retries,
        };

        let lock_timeout = match get("STOCKLEDGER_LOCK_TIMEOUT_MS") {
            // Postgres reads a zero lock_timeout as "wait forever".
            Some(raw) => Duration::from_millis(parse_positive("STOCKLEDGER_LOCK_TIMEOUT_MS", &raw)?),
            None => defaults.lock_timeout,
        };

        Ok(Self {
            database_url: get("DATABASE_URL").map(|v| v.trim().to_string()),
            db_max_connections,
            max_conflict_retries,
            lock_timeout,
        })
    }
}

fn parse<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_positive<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    let value: T = parse(name, raw)?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            name,
            value: raw.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = LedgerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
    }

    #[test]
    fn values_are_read() {
        let config = LedgerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/stock"),
            ("STOCKLEDGER_DB_MAX_CONNECTIONS", "12"),
            ("STOCKLEDGER_MAX_CONFLICT_RETRIES", "0"),
            ("STOCKLEDGER_LOCK_TIMEOUT_MS", " 250 "),
        ]))
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/stock"));
        assert_eq!(config.db_max_connections, 12);
        assert_eq!(config.max_conflict_retries, 0);
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
    }

    #[test]
    fn blank_database_url_is_unset() {
        let config = LedgerConfig::from_lookup(lookup(&[("DATABASE_URL", "  ")])).unwrap();
        assert_eq!(config.database_url, None);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = LedgerConfig::from_lookup(lookup(&[("STOCKLEDGER_LOCK_TIMEOUT_MS", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "STOCKLEDGER_LOCK_TIMEOUT_MS", .. }));

        let err = LedgerConfig::from_lookup(lookup(&[("STOCKLEDGER_DB_MAX_CONNECTIONS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "STOCKLEDGER_DB_MAX_CONNECTIONS", .. }));
    }

    #[test]
    fn zero_lock_timeout_is_rejected() {
        let err = LedgerConfig::from_lookup(lookup(&[("STOCKLEDGER_LOCK_TIMEOUT_MS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "STOCKLEDGER_LOCK_TIMEOUT_MS", .. }));
        assert!(err.to_string().contains("at least 1"));
    }
}
