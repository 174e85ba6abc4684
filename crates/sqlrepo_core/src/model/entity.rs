//! Capability set a record needs to be stored by `SqlRepo`.
//!
//! # Invariants
//! - `columns()` and `to_values()` use the same order.
//! - `key_values()` returns `None` until the record has been persisted or
//!   given an assigned key.

use rusqlite::types::Value;
use rusqlite::Row;

/// How primary-key values are produced on create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyGeneration {
    /// SQLite rowid, read back from `last_insert_rowid()`.
    Autoincrement,
    /// Drawn from a named generator before the insert.
    Sequence(&'static str),
    /// Supplied by the caller.
    Assigned,
}

/// A plain record mapped to one table.
pub trait Entity: Sized {
    /// Type name used in error messages.
    fn entity_name() -> &'static str;

    fn table_name() -> &'static str;

    fn key_columns() -> &'static [&'static str];

    /// Non-key columns, in insert/update order.
    fn columns() -> &'static [&'static str];

    fn key_generation() -> KeyGeneration {
        KeyGeneration::Assigned
    }

    fn key_values(&self) -> Option<Vec<Value>>;

    /// Stores a generated single-column key.
    fn set_generated_key(&mut self, key: i64);

    fn to_values(&self) -> Vec<Value>;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Checked before every write.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}
