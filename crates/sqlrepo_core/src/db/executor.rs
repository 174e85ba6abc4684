//! GO-separated SQL script execution.
//!
//! # Responsibility
//! - Split multi-statement scripts on `GO` batch separator lines.
//! - Route `CREATE DATABASE` / `DROP DATABASE` batches to the data directory
//!   and every other batch to the target connection.
//!
//! # Invariants
//! - Batches run in script order; the first failure stops the script.
//! - Empty batches are never sent to SQLite.

use super::{DbError, DbResult};
use crate::config::{DataSource, DatabaseConfig};
use log::{debug, error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

// Separator characters never cross a line break.
static BATCH_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[^\w\r\n]*go[^\w\r\n]*;?[^\w\r\n]*\r?$")
        .expect("batch separator pattern is valid")
});

static ADMIN_STATEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)^\s*(create|drop)\s+database\s+(if\s+(not\s+)?exists\s+)?([\[\]"`\w.\-]+)\s*;?\s*$"#,
    )
    .expect("admin statement pattern is valid")
});

const DEFAULT_DB_EXTENSION: &str = "db";

/// One classified script batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    CreateDatabase { name: String, if_not_exists: bool },
    DropDatabase { name: String, if_exists: bool },
    Sql(String),
}

/// Splits a script into batches on lines that contain only `GO`.
pub fn split_batches(script: &str) -> Vec<String> {
    BATCH_SEPARATOR
        .split(script)
        .map(str::trim)
        .filter(|batch| !batch.is_empty())
        .map(str::to_string)
        .collect()
}

/// Classifies a batch as administrative or as plain SQL.
pub fn classify(batch: &str) -> Statement {
    let Some(captures) = ADMIN_STATEMENT.captures(batch) else {
        return Statement::Sql(batch.to_string());
    };

    let name = captures[4]
        .trim_matches(|ch| matches!(ch, '[' | ']' | '"' | '`'))
        .to_string();
    let guarded = captures.get(2).is_some();
    if captures[1].eq_ignore_ascii_case("create") {
        Statement::CreateDatabase {
            name,
            if_not_exists: guarded && captures.get(3).is_some(),
        }
    } else {
        Statement::DropDatabase {
            name,
            if_exists: guarded && captures.get(3).is_none(),
        }
    }
}

/// Executes scripts for one configured database.
#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    source: DataSource,
    busy_timeout: Duration,
    data_dir: Option<PathBuf>,
    extension: String,
}

/// Connection that receives non-administrative batches.
enum Target<'a> {
    Borrowed(&'a Connection),
    /// Opened on the first SQL batch, closed before a drop database.
    Lazy(Option<Connection>),
}

impl ScriptExecutor {
    pub fn new(config: &DatabaseConfig) -> Self {
        let extension = match &config.source {
            DataSource::File(path) => path
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned())
                .unwrap_or_else(|| DEFAULT_DB_EXTENSION.to_string()),
            DataSource::Memory => DEFAULT_DB_EXTENSION.to_string(),
        };
        Self {
            source: config.source.clone(),
            busy_timeout: config.busy_timeout,
            data_dir: config.data_dir().map(Path::to_path_buf),
            extension,
        }
    }

    /// Runs every batch of `script` on `conn`, returning how many batches ran.
    ///
    /// # Errors
    /// - `AdminUnsupported` for create/drop database without a data directory.
    /// - `Io` when a database file cannot be created or removed.
    /// - `Sqlite` for any failing SQL batch.
    pub fn execute(&self, conn: &Connection, script: &str) -> DbResult<usize> {
        self.execute_batches(&mut Target::Borrowed(conn), script)
    }

    /// Runs `script` against the configured database, opening the target
    /// connection only when the first SQL batch needs it.
    ///
    /// This lets a script create the database it then populates.
    pub fn run(&self, script: &str) -> DbResult<usize> {
        let mut target = Target::Lazy(None);
        let result = self.execute_batches(&mut target, script);
        if let Target::Lazy(Some(conn)) = target {
            conn.close().map_err(|(_, err)| err)?;
        }
        result
    }

    /// Reads and runs a script file on `conn`.
    pub fn execute_file(&self, conn: &Connection, path: impl AsRef<Path>) -> DbResult<usize> {
        let script = std::fs::read_to_string(path.as_ref())?;
        self.execute(conn, &script)
    }

    /// Path of the file that backs database `name`.
    pub fn database_path(&self, name: &str) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .map(|dir| dir.join(format!("{name}.{}", self.extension)))
    }

    fn execute_batches(&self, target: &mut Target<'_>, script: &str) -> DbResult<usize> {
        let started_at = Instant::now();
        let batches = split_batches(script);
        info!(
            "event=script_execute module=db status=start batches={}",
            batches.len()
        );

        for (index, batch) in batches.iter().enumerate() {
            if let Err(err) = self.execute_statement(target, classify(batch)) {
                error!(
                    "event=script_execute module=db status=error batch={} duration_ms={} error={}",
                    index,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err);
            }
        }

        info!(
            "event=script_execute module=db status=ok batches={} duration_ms={}",
            batches.len(),
            started_at.elapsed().as_millis()
        );
        Ok(batches.len())
    }

    fn execute_statement(&self, target: &mut Target<'_>, statement: Statement) -> DbResult<()> {
        match statement {
            Statement::Sql(sql) => {
                debug!("event=script_batch module=db target=database");
                match target {
                    Target::Borrowed(conn) => conn.execute_batch(&sql)?,
                    Target::Lazy(slot) => {
                        if slot.is_none() {
                            *slot = Some(self.open_target()?);
                        }
                        if let Some(conn) = slot {
                            conn.execute_batch(&sql)?;
                        }
                    }
                }
            }
            Statement::CreateDatabase {
                name,
                if_not_exists,
            } => {
                let path = self.admin_path(&name, "create database")?;
                if path.exists() {
                    if if_not_exists {
                        return Ok(());
                    }
                    return Err(DbError::Io(std::io::Error::new(
                        ErrorKind::AlreadyExists,
                        format!("database `{name}` already exists at {}", path.display()),
                    )));
                }
                debug!("event=script_batch module=db target=admin action=create database={name}");
                let created = Connection::open(&path)?;
                // Writing the header forces SQLite to materialize the file.
                created.execute_batch("PRAGMA user_version = 0;")?;
                created.close().map_err(|(_, err)| err)?;
            }
            Statement::DropDatabase { name, if_exists } => {
                let path = self.admin_path(&name, "drop database")?;
                if let Target::Lazy(slot) = target {
                    if let Some(conn) = slot.take() {
                        conn.close().map_err(|(_, err)| err)?;
                    }
                }
                if !path.exists() {
                    if if_exists {
                        return Ok(());
                    }
                    return Err(DbError::Io(std::io::Error::new(
                        ErrorKind::NotFound,
                        format!("database `{name}` does not exist at {}", path.display()),
                    )));
                }
                debug!("event=script_batch module=db target=admin action=drop database={name}");
                std::fs::remove_file(&path)?;
                for suffix in ["-journal", "-wal", "-shm"] {
                    let mut sidecar = path.clone().into_os_string();
                    sidecar.push(suffix);
                    let sidecar = PathBuf::from(sidecar);
                    if sidecar.exists() {
                        std::fs::remove_file(sidecar)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn open_target(&self) -> DbResult<Connection> {
        let conn = match &self.source {
            DataSource::Memory => Connection::open_in_memory()?,
            DataSource::File(path) => Connection::open(path)?,
        };
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    fn admin_path(&self, name: &str, action: &str) -> DbResult<PathBuf> {
        self.database_path(name)
            .ok_or_else(|| DbError::AdminUnsupported(format!("{action} {name}")))
    }
}
