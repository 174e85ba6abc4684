//! Connection-string configuration.
//!
//! # Responsibility
//! - Parse ADO-style `key=value;` connection strings into `DatabaseConfig`.
//! - Derive the catalog name and data directory used by administrative
//!   script statements.
//!
//! # Invariants
//! - Keys are case-insensitive and whitespace tolerant.
//! - Unknown keys are rejected instead of silently ignored.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable consulted by [`DatabaseConfig::from_env`].
pub const CONNECTION_ENV_VAR: &str = "SQLREPO_CONNECTION";

const MEMORY_SOURCE: &str = ":memory:";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MalformedPair(String),
    UnknownKey(String),
    InvalidValue { key: String, value: String },
    MissingDataSource,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedPair(pair) => {
                write!(f, "malformed connection string segment `{pair}`; expected key=value")
            }
            Self::UnknownKey(key) => write!(f, "unknown connection string key `{key}`"),
            Self::InvalidValue { key, value } => {
                write!(f, "invalid value `{value}` for connection string key `{key}`")
            }
            Self::MissingDataSource => write!(f, "connection string has no `Data Source`"),
        }
    }
}

impl Error for ConfigError {}

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Memory,
    File(PathBuf),
}

/// Locking behavior used when a transaction begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionMode {
    Deferred,
    /// Takes the write lock up front, the closest SQLite analogue to a
    /// serializable test transaction.
    #[default]
    Immediate,
    Exclusive,
}

impl TransactionMode {
    pub fn begin_sql(self) -> &'static str {
        match self {
            Self::Deferred => "BEGIN DEFERRED;",
            Self::Immediate => "BEGIN IMMEDIATE;",
            Self::Exclusive => "BEGIN EXCLUSIVE;",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Deferred => "deferred",
            Self::Immediate => "immediate",
            Self::Exclusive => "exclusive",
        }
    }
}

/// How a testing transaction is resolved when nobody resolves it explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    Committed,
    #[default]
    RolledBack,
}

impl Resolution {
    fn as_str(self) -> &'static str {
        match self {
            Self::Committed => "commit",
            Self::RolledBack => "rollback",
        }
    }
}

/// Parsed database connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub source: DataSource,
    pub busy_timeout: Duration,
    pub foreign_keys: bool,
    pub transaction_mode: TransactionMode,
    pub default_resolution: Resolution,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl DatabaseConfig {
    /// Configuration for a private in-memory database.
    pub fn in_memory() -> Self {
        Self {
            source: DataSource::Memory,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            foreign_keys: true,
            transaction_mode: TransactionMode::default(),
            default_resolution: Resolution::default(),
        }
    }

    /// Configuration for a database file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: DataSource::File(path.into()),
            ..Self::in_memory()
        }
    }

    /// Reads the connection string from `SQLREPO_CONNECTION`, falling back to
    /// an in-memory database when the variable is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(CONNECTION_ENV_VAR) {
            Ok(value) if !value.trim().is_empty() => Self::parse(&value),
            _ => Ok(Self::in_memory()),
        }
    }

    /// Parses a connection string such as
    /// `Data Source=/tmp/people.db;Busy Timeout=2000;Default Resolution=commit`.
    ///
    /// # Errors
    /// - `MalformedPair` when a segment has no `=`.
    /// - `UnknownKey` for keys outside the supported set.
    /// - `InvalidValue` when a value cannot be interpreted.
    /// - `MissingDataSource` when no data source is given.
    pub fn parse(connection_string: &str) -> Result<Self, ConfigError> {
        let mut config = Self::in_memory();
        let mut saw_source = false;

        for segment in connection_string.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (raw_key, raw_value) = segment
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedPair(segment.to_string()))?;
            let key = normalize_key(raw_key);
            let value = raw_value.trim();

            match key.as_str() {
                "datasource" | "database" | "initialcatalog" => {
                    if value.is_empty() {
                        return Err(invalid(raw_key, value));
                    }
                    config.source = if value.eq_ignore_ascii_case(MEMORY_SOURCE) {
                        DataSource::Memory
                    } else {
                        DataSource::File(PathBuf::from(value))
                    };
                    saw_source = true;
                }
                "busytimeout" => {
                    let millis = value
                        .parse::<u64>()
                        .map_err(|_| invalid(raw_key, value))?;
                    config.busy_timeout = Duration::from_millis(millis);
                }
                "foreignkeys" => {
                    config.foreign_keys = parse_bool(value).ok_or_else(|| invalid(raw_key, value))?;
                }
                "transactionmode" => {
                    config.transaction_mode = match value.to_ascii_lowercase().as_str() {
                        "deferred" => TransactionMode::Deferred,
                        "immediate" => TransactionMode::Immediate,
                        "exclusive" => TransactionMode::Exclusive,
                        _ => return Err(invalid(raw_key, value)),
                    };
                }
                "defaultresolution" => {
                    config.default_resolution = match value.to_ascii_lowercase().as_str() {
                        "commit" | "committed" => Resolution::Committed,
                        "rollback" | "rolledback" => Resolution::RolledBack,
                        _ => return Err(invalid(raw_key, value)),
                    };
                }
                _ => return Err(ConfigError::UnknownKey(raw_key.trim().to_string())),
            }
        }

        if !saw_source {
            return Err(ConfigError::MissingDataSource);
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_transaction_mode(mut self, mode: TransactionMode) -> Self {
        self.transaction_mode = mode;
        self
    }

    #[must_use]
    pub fn with_default_resolution(mut self, resolution: Resolution) -> Self {
        self.default_resolution = resolution;
        self
    }

    pub fn is_memory(&self) -> bool {
        matches!(self.source, DataSource::Memory)
    }

    /// Catalog name: the file stem for file databases, `memory` otherwise.
    pub fn database_name(&self) -> String {
        match &self.source {
            DataSource::Memory => "memory".to_string(),
            DataSource::File(path) => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    /// Directory that holds database files, used for create/drop database.
    pub fn data_dir(&self) -> Option<&Path> {
        match &self.source {
            DataSource::Memory => None,
            DataSource::File(path) => Some(
                path.parent()
                    .filter(|parent| !parent.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new(".")),
            ),
        }
    }

    /// Renders the config back into connection-string form.
    pub fn to_connection_string(&self) -> String {
        let source = match &self.source {
            DataSource::Memory => MEMORY_SOURCE.to_string(),
            DataSource::File(path) => path.display().to_string(),
        };
        format!(
            "Data Source={source};Busy Timeout={};Foreign Keys={};Transaction Mode={};Default Resolution={}",
            self.busy_timeout.as_millis(),
            self.foreign_keys,
            self.transaction_mode.as_str(),
            self.default_resolution.as_str()
        )
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '_')
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.trim().to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ConfigError, DataSource, DatabaseConfig, Resolution, TransactionMode, CONNECTION_ENV_VAR,
    };
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    #[test]
    fn parse_reads_all_supported_keys() {
        let config = DatabaseConfig::parse(
            " data source = /tmp/people.db ; Busy Timeout=250;FOREIGN KEYS=off;\
             Transaction Mode=Exclusive;Default Resolution=commit;",
        )
        .unwrap();

        assert_eq!(config.source, DataSource::File(PathBuf::from("/tmp/people.db")));
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert!(!config.foreign_keys);
        assert_eq!(config.transaction_mode, TransactionMode::Exclusive);
        assert_eq!(config.default_resolution, Resolution::Committed);
    }

    #[test]
    fn parse_accepts_initial_catalog_alias_and_memory_source() {
        let config = DatabaseConfig::parse("Initial Catalog=:memory:").unwrap();
        assert!(config.is_memory());
        assert_eq!(config.database_name(), "memory");
        assert!(config.data_dir().is_none());
    }

    #[test]
    fn parse_rejects_unknown_keys_and_bad_values() {
        assert_eq!(
            DatabaseConfig::parse("Data Source=a.db;Server=localhost"),
            Err(ConfigError::UnknownKey("Server".to_string()))
        );
        assert!(matches!(
            DatabaseConfig::parse("Data Source=a.db;Busy Timeout=soon"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            DatabaseConfig::parse("Data Source"),
            Err(ConfigError::MalformedPair(_))
        ));
        assert_eq!(
            DatabaseConfig::parse("Busy Timeout=10"),
            Err(ConfigError::MissingDataSource)
        );
    }

    #[test]
    fn database_name_and_data_dir_follow_the_file_path() {
        let config = DatabaseConfig::file("/var/data/a5921a9c.db");
        assert_eq!(config.database_name(), "a5921a9c");
        assert_eq!(config.data_dir(), Some(Path::new("/var/data")));

        let relative = DatabaseConfig::file("people.db");
        assert_eq!(relative.data_dir(), Some(Path::new(".")));
    }

    #[test]
    fn connection_string_roundtrips() {
        let config = DatabaseConfig::file("/tmp/x.db")
            .with_busy_timeout(Duration::from_millis(42))
            .with_default_resolution(Resolution::Committed);
        let reparsed = DatabaseConfig::parse(&config.to_connection_string()).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn from_env_parses_variable_and_falls_back_to_memory() {
        let connection = "Data Source=/tmp/env.db;Busy Timeout=75";
        std::env::set_var(CONNECTION_ENV_VAR, connection);
        let config = DatabaseConfig::from_env().unwrap();
        assert_eq!(config.source, DataSource::File(PathBuf::from("/tmp/env.db")));
        assert_eq!(config.busy_timeout, Duration::from_millis(75));

        std::env::set_var(CONNECTION_ENV_VAR, "   ");
        assert!(DatabaseConfig::from_env().unwrap().is_memory());

        std::env::set_var(CONNECTION_ENV_VAR, "Server=localhost");
        assert!(matches!(
            DatabaseConfig::from_env(),
            Err(ConfigError::UnknownKey(_))
        ));

        std::env::remove_var(CONNECTION_ENV_VAR);
        let fallback = DatabaseConfig::from_env().unwrap();
        assert_eq!(fallback, DatabaseConfig::in_memory());
    }
}
