//! Store and logging configuration.
//!
//! # Responsibility
//! - Describe where the database lives and how the pool is sized.
//! - Read overrides from `CONDUIT_*` environment variables.
//!
//! # Invariants
//! - Unset variables keep their defaults; malformed ones are rejected.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

const ENV_DATABASE_PATH: &str = "CONDUIT_DATABASE_PATH";
const ENV_MAX_CONNECTIONS: &str = "CONDUIT_DB_MAX_CONNECTIONS";
const ENV_CONNECTION_TIMEOUT_MS: &str = "CONDUIT_DB_CONNECTION_TIMEOUT_MS";
const ENV_BUSY_TIMEOUT_MS: &str = "CONDUIT_DB_BUSY_TIMEOUT_MS";
const ENV_LOG_LEVEL: &str = "CONDUIT_LOG_LEVEL";
const ENV_LOG_DIR: &str = "CONDUIT_LOG_DIR";

const DEFAULT_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration parse error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid value `{value}` for {key}: {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Database placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    /// Private in-memory database, gone when the store is dropped.
    Memory,
}

impl DatabaseLocation {
    pub fn mode(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Memory => "memory",
        }
    }
}

/// Pool and connection settings for [`crate::db::open_store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub location: DatabaseLocation,
    /// Upper bound of pooled connections. Ignored for in-memory stores.
    pub max_connections: u32,
    /// How long a checkout waits for a free connection.
    pub connection_timeout: Duration,
    /// How long SQLite retries a locked database before failing.
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: DatabaseLocation::File(PathBuf::from("conduit.sqlite3")),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

impl StoreConfig {
    /// Builds a config for a database file, other settings defaulted.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: DatabaseLocation::File(path.into()),
            ..Self::default()
        }
    }

    /// Reads `CONDUIT_DATABASE_PATH` (`:memory:` selects an in-memory store),
    /// `CONDUIT_DB_MAX_CONNECTIONS`, `CONDUIT_DB_CONNECTION_TIMEOUT_MS` and
    /// `CONDUIT_DB_BUSY_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            let trimmed = path.trim();
            config.location = match trimmed {
                "" => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_DATABASE_PATH,
                        value: path.clone(),
                        reason: "path cannot be empty",
                    })
                }
                ":memory:" => DatabaseLocation::Memory,
                other => DatabaseLocation::File(PathBuf::from(other)),
            };
        }

        if let Some(value) = lookup(ENV_MAX_CONNECTIONS) {
            config.max_connections = match value.trim().parse::<u32>() {
                Ok(parsed) if parsed > 0 => parsed,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_MAX_CONNECTIONS,
                        value,
                        reason: "expected a positive integer",
                    })
                }
            };
        }

        if let Some(value) = lookup(ENV_CONNECTION_TIMEOUT_MS) {
            config.connection_timeout = parse_millis(ENV_CONNECTION_TIMEOUT_MS, value)?;
        }

        if let Some(value) = lookup(ENV_BUSY_TIMEOUT_MS) {
            config.busy_timeout = parse_millis(ENV_BUSY_TIMEOUT_MS, value)?;
        }

        Ok(config)
    }
}

/// Logging settings for [`crate::logging::init_logging`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// One of `trace|debug|info|warn|error`.
    pub level: String,
    /// Rolling log file directory; `None` logs to stderr.
    pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            directory: None,
        }
    }
}

impl LogConfig {
    /// Reads `CONDUIT_LOG_LEVEL` and `CONDUIT_LOG_DIR`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|value| !value.trim().is_empty()) {
            config.level = level;
        }
        config.directory = lookup(ENV_LOG_DIR)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);
        config
    }
}

fn parse_millis(key: &'static str, value: String) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(millis) => Ok(Duration::from_millis(millis)),
        Err(_) => Err(ConfigError::InvalidValue {
            key,
            value,
            reason: "expected milliseconds as an unsigned integer",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, DatabaseLocation, LogConfig, StoreConfig};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_keeps_defaults() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn environment_overrides_pool_settings() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("CONDUIT_DATABASE_PATH", "/var/lib/conduit/db.sqlite3"),
            ("CONDUIT_DB_MAX_CONNECTIONS", "16"),
            ("CONDUIT_DB_CONNECTION_TIMEOUT_MS", "250"),
            ("CONDUIT_DB_BUSY_TIMEOUT_MS", "1000"),
        ]))
        .unwrap();

        assert_eq!(
            config.location,
            DatabaseLocation::File(PathBuf::from("/var/lib/conduit/db.sqlite3"))
        );
        assert_eq!(config.max_connections, 16);
        assert_eq!(config.connection_timeout, Duration::from_millis(250));
        assert_eq!(config.busy_timeout, Duration::from_secs(1));
    }

    #[test]
    fn memory_marker_selects_in_memory_store() {
        let config = StoreConfig::from_lookup(lookup(&[("CONDUIT_DATABASE_PATH", ":memory:")]))
            .unwrap();
        assert_eq!(config.location, DatabaseLocation::Memory);
    }

    #[test]
    fn zero_connections_is_rejected() {
        let err = StoreConfig::from_lookup(lookup(&[("CONDUIT_DB_MAX_CONNECTIONS", "0")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "CONDUIT_DB_MAX_CONNECTIONS",
                ..
            }
        ));
    }

    #[test]
    fn malformed_timeout_is_rejected() {
        let err = StoreConfig::from_lookup(lookup(&[("CONDUIT_DB_BUSY_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("CONDUIT_DB_BUSY_TIMEOUT_MS"));
    }

    #[test]
    fn log_config_reads_level_and_directory() {
        let config = LogConfig::from_lookup(lookup(&[
            ("CONDUIT_LOG_LEVEL", "warn"),
            ("CONDUIT_LOG_DIR", "/tmp/conduit-logs"),
        ]));
        assert_eq!(config.level, "warn");
        assert_eq!(config.directory, Some(PathBuf::from("/tmp/conduit-logs")));
    }
}
