//! Generic repository over any `Entity`.
//!
//! # Responsibility
//! - Provide create/update/delete/get-by-id/paged-query over one table.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Write paths check the key and call `Entity::validate()` before any SQL
//!   mutation runs.
//! - Updating or deleting a key that matches no row is a `MissingEntity`
//!   error carrying the exact key tuple.
//! - Every call is a single round trip with no retry or caching.

use super::filter::Filter;
use crate::db::migrations::latest_version;
use crate::db::sequence::next_value;
use crate::db::{quote_ident, DbError};
use crate::model::entity::{Entity, KeyGeneration};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for entity persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// No row matches the key tuple.
    MissingEntity {
        entity: &'static str,
        keys: Vec<Value>,
    },
    /// The entity has no key yet, so it cannot be updated or deleted.
    UnsavedEntity {
        entity: &'static str,
        operation: &'static str,
    },
    Validation {
        entity: &'static str,
        message: String,
    },
    KeyArity {
        entity: &'static str,
        expected: usize,
        actual: usize,
    },
    UnknownColumn {
        table: &'static str,
        column: String,
    },
    InvalidPage {
        page: u32,
        page_size: u32,
    },
    /// Raw JSON query did not start with `SELECT`.
    MalformedQuery(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    Db(DbError),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingEntity { entity, keys } => write!(
                f,
                "Cannot find {entity} object with key value = {}",
                format_keys(keys)
            ),
            Self::UnsavedEntity { entity, operation } => {
                write!(f, "Cannot {operation} a {entity} that has no key")
            }
            Self::Validation { entity, message } => write!(f, "invalid {entity}: {message}"),
            Self::KeyArity {
                entity,
                expected,
                actual,
            } => write!(
                f,
                "{entity} key has {expected} column(s), got {actual} value(s)"
            ),
            Self::UnknownColumn { table, column } => {
                write!(f, "unknown column `{column}` on table `{table}`")
            }
            Self::InvalidPage { page, page_size } => write!(
                f,
                "invalid page request: page={page} page_size={page_size}; both must be >= 1"
            ),
            Self::MalformedQuery(message) => write!(f, "{message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} is older than required {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "required table `{table}` is missing"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "required column `{table}.{column}` is missing")
            }
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Renders a key tuple as `[1]` or `[1,abc]`.
pub fn format_keys(keys: &[Value]) -> String {
    let rendered: Vec<String> = keys
        .iter()
        .map(|value| match value {
            Value::Null => "null".to_string(),
            Value::Integer(int) => int.to_string(),
            Value::Real(real) => real.to_string(),
            Value::Text(text) => text.clone(),
            Value::Blob(bytes) => format!("<{} bytes>", bytes.len()),
        })
        .collect();
    format!("[{}]", rendered.join(","))
}

/// SQLite-backed repository for entity type `E`.
pub struct SqlRepo<'conn, E: Entity> {
    conn: &'conn Connection,
    _entity: PhantomData<E>,
}

impl<'conn, E: Entity> SqlRepo<'conn, E> {
    /// Constructs a repository from a migrated connection that holds the
    /// entity's table and columns.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready::<E>(conn)?;
        Ok(Self {
            conn,
            _entity: PhantomData,
        })
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    /// Inserts `entity`, generating its key when the entity has none.
    ///
    /// Returns the entity with its key populated.
    pub fn create(&self, mut entity: E) -> RepoResult<E> {
        validate(&entity)?;

        let include_key = match (E::key_generation(), entity.key_values()) {
            (_, Some(_)) => true,
            (KeyGeneration::Sequence(sequence), None) => {
                let key = next_value(self.conn, sequence)?;
                entity.set_generated_key(key);
                true
            }
            (KeyGeneration::Autoincrement, None) => false,
            (KeyGeneration::Assigned, None) => {
                return Err(RepoError::UnsavedEntity {
                    entity: E::entity_name(),
                    operation: "create",
                });
            }
        };

        let mut columns: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if include_key {
            let keys = entity.key_values().unwrap_or_default();
            check_arity::<E>(&keys)?;
            columns.extend_from_slice(E::key_columns());
            values.extend(keys);
        }
        columns.extend_from_slice(E::columns());
        values.extend(entity.to_values());

        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES;", quote_ident(E::table_name()))
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({});",
                quote_ident(E::table_name()),
                join_idents(&columns),
                placeholders(columns.len())
            )
        };
        self.conn.execute(&sql, params_from_iter(values))?;

        if !include_key {
            entity.set_generated_key(self.conn.last_insert_rowid());
        }
        debug!(
            "event=entity_create module=repo status=ok entity={}",
            E::entity_name()
        );
        Ok(entity)
    }

    /// Writes every non-key column of `entity` to the row with its key.
    pub fn update(&self, entity: &E) -> RepoResult<()> {
        let keys = require_keys(entity, "update")?;
        validate(entity)?;

        if E::columns().is_empty() {
            return if self.exists(&keys)? {
                Ok(())
            } else {
                Err(missing::<E>(keys))
            };
        }

        let assignments: Vec<String> = E::columns()
            .iter()
            .map(|column| format!("{} = ?", quote_ident(column)))
            .collect();
        let sql = format!(
            "UPDATE {} SET {}{};",
            quote_ident(E::table_name()),
            assignments.join(", "),
            key_predicate::<E>()
        );

        let mut values = entity.to_values();
        values.extend(keys.iter().cloned());
        let changed = self.conn.execute(&sql, params_from_iter(values))?;
        if changed == 0 {
            return Err(missing::<E>(keys));
        }

        debug!(
            "event=entity_update module=repo status=ok entity={}",
            E::entity_name()
        );
        Ok(())
    }

    /// Deletes the row that backs `entity`.
    pub fn delete(&self, entity: &E) -> RepoResult<()> {
        let keys = require_keys(entity, "delete")?;
        self.delete_by_key(&keys)
    }

    /// Deletes the row with the given key tuple.
    ///
    /// # Errors
    /// - `MissingEntity` when no row matches `keys`.
    pub fn delete_by_key(&self, keys: &[Value]) -> RepoResult<()> {
        check_arity::<E>(keys)?;
        if !self.exists(keys)? {
            return Err(missing::<E>(keys.to_vec()));
        }

        let sql = format!(
            "DELETE FROM {}{};",
            quote_ident(E::table_name()),
            key_predicate::<E>()
        );
        self.conn.execute(&sql, params_from_iter(keys.iter()))?;

        debug!(
            "event=entity_delete module=repo status=ok entity={} key={}",
            E::entity_name(),
            format_keys(keys)
        );
        Ok(())
    }

    pub fn get_by_id(&self, keys: &[Value]) -> RepoResult<Option<E>> {
        check_arity::<E>(keys)?;
        let sql = format!("{}{};", select_sql::<E>(), key_predicate::<E>());
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(keys.iter()))?;
        if let Some(row) = rows.next()? {
            return Ok(Some(E::from_row(row)?));
        }
        Ok(None)
    }

    pub fn exists(&self, keys: &[Value]) -> RepoResult<bool> {
        check_arity::<E>(keys)?;
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {}{});",
            quote_ident(E::table_name()),
            key_predicate::<E>()
        );
        let exists: i64 = self
            .conn
            .query_row(&sql, params_from_iter(keys.iter()), |row| row.get(0))?;
        Ok(exists == 1)
    }

    /// Every row, in key order.
    pub fn get_all(&self) -> RepoResult<Vec<E>> {
        self.fetch(&Filter::all(), None)
    }

    /// Every row matching `filter`, in key order.
    pub fn find(&self, filter: &Filter) -> RepoResult<Vec<E>> {
        self.fetch(filter, None)
    }

    /// One page of the rows matching `filter`, in key order.
    ///
    /// `page` is 1-based; page `n` skips `(n - 1) * page_size` rows.
    pub fn get_by_query(&self, filter: &Filter, page: u32, page_size: u32) -> RepoResult<Vec<E>> {
        if page == 0 || page_size == 0 {
            return Err(RepoError::InvalidPage { page, page_size });
        }
        let offset = i64::from(page - 1) * i64::from(page_size);
        self.fetch(filter, Some((i64::from(page_size), offset)))
    }

    pub fn count(&self, filter: &Filter) -> RepoResult<u64> {
        let (where_clause, values) = filter.to_where_clause(E::table_name(), &all_columns::<E>())?;
        let sql = format!(
            "SELECT COUNT(*) FROM {}{where_clause};",
            quote_ident(E::table_name())
        );
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(values), |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Runs a `SELECT` whose single value is a JSON document and returns it.
    ///
    /// Semicolons are stripped and the statement must begin with `SELECT`.
    /// This is a shape check, not an injection defense; never pass untrusted
    /// input.
    pub fn get_json(&self, sql: &str) -> RepoResult<Option<String>> {
        let cleaned = sql.replace(';', "");
        let cleaned = cleaned.trim_start();
        let starts_with_select = cleaned
            .get(..6)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("select"));
        if !starts_with_select {
            return Err(RepoError::MalformedQuery(
                "get_json SQL must begin with SELECT".to_string(),
            ));
        }

        let wrapped = format!("SELECT ({cleaned}) AS json;");
        let json: Option<String> = self.conn.query_row(&wrapped, [], |row| row.get(0))?;
        Ok(json)
    }

    fn fetch(&self, filter: &Filter, page: Option<(i64, i64)>) -> RepoResult<Vec<E>> {
        let (where_clause, mut values) =
            filter.to_where_clause(E::table_name(), &all_columns::<E>())?;
        let mut sql = format!(
            "{}{where_clause} ORDER BY {}",
            select_sql::<E>(),
            join_idents(E::key_columns())
        );
        if let Some((limit, offset)) = page {
            sql.push_str(" LIMIT ? OFFSET ?");
            values.push(Value::Integer(limit));
            values.push(Value::Integer(offset));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(values))?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next()? {
            entities.push(E::from_row(row)?);
        }
        Ok(entities)
    }
}

fn ensure_connection_ready<E: Entity>(conn: &Connection) -> RepoResult<()> {
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let expected_version = latest_version();
    if actual_version < expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let table = E::table_name();
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", quote_ident(table)))?;
    let present = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<Result<Vec<_>, _>>()?;
    if present.is_empty() {
        return Err(RepoError::MissingRequiredTable(table));
    }

    for &column in E::key_columns().iter().chain(E::columns()) {
        if !present.iter().any(|name| name.eq_ignore_ascii_case(column)) {
            return Err(RepoError::MissingRequiredColumn { table, column });
        }
    }
    Ok(())
}

fn validate<E: Entity>(entity: &E) -> RepoResult<()> {
    entity.validate().map_err(|message| RepoError::Validation {
        entity: E::entity_name(),
        message,
    })
}

fn require_keys<E: Entity>(entity: &E, operation: &'static str) -> RepoResult<Vec<Value>> {
    let keys = entity.key_values().ok_or(RepoError::UnsavedEntity {
        entity: E::entity_name(),
        operation,
    })?;
    check_arity::<E>(&keys)?;
    Ok(keys)
}

fn check_arity<E: Entity>(keys: &[Value]) -> RepoResult<()> {
    let expected = E::key_columns().len();
    if keys.len() != expected {
        return Err(RepoError::KeyArity {
            entity: E::entity_name(),
            expected,
            actual: keys.len(),
        });
    }
    Ok(())
}

fn missing<E: Entity>(keys: Vec<Value>) -> RepoError {
    RepoError::MissingEntity {
        entity: E::entity_name(),
        keys,
    }
}

fn all_columns<E: Entity>() -> Vec<&'static str> {
    E::key_columns()
        .iter()
        .chain(E::columns())
        .copied()
        .collect()
}

fn select_sql<E: Entity>() -> String {
    format!(
        "SELECT {} FROM {}",
        join_idents(&all_columns::<E>()),
        quote_ident(E::table_name())
    )
}

fn key_predicate<E: Entity>() -> String {
    let parts: Vec<String> = E::key_columns()
        .iter()
        .map(|column| format!("{} = ?", quote_ident(column)))
        .collect();
    format!(" WHERE {}", parts.join(" AND "))
}

fn join_idents(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
