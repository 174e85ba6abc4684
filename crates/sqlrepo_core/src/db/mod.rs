//! SQLite storage bootstrap, schema migrations and administrative utilities.
//!
//! # Responsibility
//! - Open and configure SQLite connections from a `DatabaseConfig`.
//! - Apply schema migrations in deterministic order.
//! - Execute GO-separated SQL scripts and maintain sequence generators.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Repository code must not touch application data before migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod executor;
pub mod migrations;
mod open;
pub mod sequence;

pub use executor::{classify, split_batches, ScriptExecutor, Statement};
pub use open::{open_db, open_db_in_memory, open_with_config};
pub use sequence::{SequenceKind, SequenceReset, SequenceResetter};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// Administrative statement issued against a database with no data directory.
    AdminUnsupported(String),
    UnknownSequence(String),
    InvalidSequenceBinding {
        sequence: String,
        table: String,
        column: String,
    },
    /// `BEGIN` issued on a connection that already has an open transaction.
    TransactionAlreadyActive,
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::AdminUnsupported(statement) => write!(
                f,
                "administrative statement requires a file-backed database: {statement}"
            ),
            Self::UnknownSequence(name) => write!(f, "sequence `{name}` does not exist"),
            Self::InvalidSequenceBinding {
                sequence,
                table,
                column,
            } => write!(
                f,
                "cannot bind sequence `{sequence}` to missing column `{table}.{column}`"
            ),
            Self::TransactionAlreadyActive => {
                write!(f, "connection already has an active transaction")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<std::io::Error> for DbError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Quotes an SQL identifier with double quotes.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Returns whether `table` exists in the main schema.
pub(crate) fn table_exists(conn: &rusqlite::Connection, table: &str) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
