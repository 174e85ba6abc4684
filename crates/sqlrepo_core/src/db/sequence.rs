//! Sequence generators and the resetter that realigns them with live data.
//!
//! # Responsibility
//! - Maintain named generators in `sequence_generators` and record which
//!   columns they feed in `sequence_bindings`.
//! - Realign every generator (named and `AUTOINCREMENT`) so that its next
//!   value is one greater than the largest key currently stored.
//!
//! # Invariants
//! - After `SequenceResetter::reset_all`, `next_value = max(key) + 1` for every
//!   generator feeding a single column, and `1` for generators over empty
//!   tables.
//! - A generator bound to several columns is reset to the overall maximum of
//!   those columns. This is wrong when the tables are meant to have disjoint
//!   key ranges; it is a known limitation, not a guarantee.

use super::{quote_ident, table_exists, DbError, DbResult};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::time::Instant;

/// Origin of a sequence generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SequenceKind {
    /// Row in `sequence_generators`.
    Named,
    /// SQLite `sqlite_sequence` counter of an `AUTOINCREMENT` table.
    Autoincrement,
}

/// One generator touched by a reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceReset {
    pub name: String,
    pub kind: SequenceKind,
    /// Value the generator hands out next.
    pub next_value: i64,
}

/// Creates a named generator starting at `start`.
pub fn create_sequence(conn: &Connection, name: &str, start: i64) -> DbResult<()> {
    conn.execute(
        "INSERT INTO sequence_generators (name, next_value) VALUES (?1, ?2);",
        params![name, start.max(1)],
    )?;
    Ok(())
}

/// Records that `table.column` takes its default from generator `name`.
///
/// # Errors
/// - `UnknownSequence` when the generator does not exist.
/// - `InvalidSequenceBinding` when the table or column does not exist.
pub fn bind_sequence(conn: &Connection, name: &str, table: &str, column: &str) -> DbResult<()> {
    if current_value(conn, name)?.is_none() {
        return Err(DbError::UnknownSequence(name.to_string()));
    }
    if !column_exists(conn, table, column)? {
        return Err(DbError::InvalidSequenceBinding {
            sequence: name.to_string(),
            table: table.to_string(),
            column: column.to_string(),
        });
    }
    conn.execute(
        "INSERT OR IGNORE INTO sequence_bindings (sequence_name, table_name, column_name)
         VALUES (?1, ?2, ?3);",
        params![name, table, column],
    )?;
    Ok(())
}

/// Returns the value generator `name` will hand out next, if it exists.
pub fn current_value(conn: &Connection, name: &str) -> DbResult<Option<i64>> {
    let value = conn
        .query_row(
            "SELECT next_value FROM sequence_generators WHERE name = ?1;",
            [name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

/// Draws the next value from generator `name` and advances it.
pub fn next_value(conn: &Connection, name: &str) -> DbResult<i64> {
    let value = conn
        .query_row(
            "UPDATE sequence_generators
             SET next_value = next_value + 1
             WHERE name = ?1
             RETURNING next_value - 1;",
            [name],
            |row| row.get(0),
        )
        .optional()?;
    value.ok_or_else(|| DbError::UnknownSequence(name.to_string()))
}

/// Realigns sequence generators with the data currently stored.
pub struct SequenceResetter;

impl SequenceResetter {
    /// Resets every named and `AUTOINCREMENT` generator in the database.
    ///
    /// # Side effects
    /// - Rewrites `sequence_generators.next_value` for every bound generator.
    /// - Rewrites `sqlite_sequence.seq` for every autoincrement table.
    /// - Emits a `sequence_reset` logging event.
    pub fn reset_all(conn: &Connection) -> DbResult<Vec<SequenceReset>> {
        let started_at = Instant::now();
        let mut resets = reset_named(conn)?;
        resets.extend(reset_autoincrement(conn)?);

        info!(
            "event=sequence_reset module=db status=ok generators={} duration_ms={}",
            resets.len(),
            started_at.elapsed().as_millis()
        );
        Ok(resets)
    }
}

fn reset_named(conn: &Connection) -> DbResult<Vec<SequenceReset>> {
    if !table_exists(conn, "sequence_bindings")? {
        return Ok(Vec::new());
    }

    let bindings = {
        let mut stmt = conn.prepare(
            "SELECT b.sequence_name, b.table_name, b.column_name
             FROM sequence_bindings b
             INNER JOIN sequence_generators g ON g.name = b.sequence_name
             ORDER BY b.sequence_name, b.table_name, b.column_name;",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    // Overall max per generator across every column it feeds.
    let mut next_by_sequence: BTreeMap<String, i64> = BTreeMap::new();
    for (sequence, table, column) in bindings {
        let next = next_key_value(conn, &table, &column)?;
        debug!(
            "event=sequence_probe module=db sequence={sequence} table={table} column={column} next={next}"
        );
        let entry = next_by_sequence.entry(sequence).or_insert(1);
        *entry = (*entry).max(next);
    }

    let mut resets = Vec::with_capacity(next_by_sequence.len());
    for (name, next_value) in next_by_sequence {
        conn.execute(
            "UPDATE sequence_generators SET next_value = ?2 WHERE name = ?1;",
            params![name, next_value],
        )?;
        resets.push(SequenceReset {
            name,
            kind: SequenceKind::Named,
            next_value,
        });
    }
    Ok(resets)
}

fn reset_autoincrement(conn: &Connection) -> DbResult<Vec<SequenceReset>> {
    if !table_exists(conn, "sqlite_sequence")? {
        return Ok(Vec::new());
    }

    let tables = {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_sequence ORDER BY name;")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    let mut resets = Vec::with_capacity(tables.len());
    for table in tables {
        if !table_exists(conn, &table)? {
            continue;
        }
        let Some(column) = rowid_alias_column(conn, &table)? else {
            continue;
        };
        let next_value = next_key_value(conn, &table, &column)?;
        conn.execute(
            "UPDATE sqlite_sequence SET seq = ?2 WHERE name = ?1;",
            params![table, next_value - 1],
        )?;
        resets.push(SequenceReset {
            name: table,
            kind: SequenceKind::Autoincrement,
            next_value,
        });
    }
    Ok(resets)
}

/// `MAX(column) + 1`, or `1` for an empty table.
fn next_key_value(conn: &Connection, table: &str, column: &str) -> DbResult<i64> {
    let sql = format!(
        "SELECT COALESCE(MAX({}), 0) + 1 FROM {};",
        quote_ident(column),
        quote_ident(table)
    );
    let next: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(next.max(1))
}

/// Single-column `INTEGER` primary key of `table`, which aliases the rowid.
fn rowid_alias_column(conn: &Connection, table: &str) -> DbResult<Option<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", quote_ident(table)))?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>("name")?,
            row.get::<_, String>("type")?,
            row.get::<_, i64>("pk")?,
        ))
    })?;

    let mut key_columns = Vec::new();
    for row in rows {
        let (name, declared_type, pk) = row?;
        if pk > 0 {
            key_columns.push((name, declared_type));
        }
    }

    match key_columns.as_slice() {
        [(name, declared_type)] if declared_type.eq_ignore_ascii_case("integer") => {
            Ok(Some(name.clone()))
        }
        _ => Ok(None),
    }
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> DbResult<bool> {
    if !table_exists(conn, table)? {
        return Ok(false);
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", quote_ident(table)))?;
    let names = stmt.query_map([], |row| row.get::<_, String>("name"))?;
    for name in names {
        if name?.eq_ignore_ascii_case(column) {
            return Ok(true);
        }
    }
    Ok(false)
}
