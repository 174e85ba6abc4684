//! Transaction wrapper that isolates one test and resolves on teardown.
//!
//! # Responsibility
//! - Hold one connection inside an explicit transaction for a test body.
//! - Resolve the transaction (commit or rollback) exactly once, either
//!   explicitly or when the wrapper is dropped.
//! - Realign sequence generators after every rollback so that later runs
//!   see deterministic key values.
//!
//! # Invariants
//! - State moves `Begun -> Committed` or `Begun -> RolledBack`; only
//!   `restart` leaves a terminal state, and it always re-enters `Begun`.
//! - At most one non-terminal transaction exists per connection.
//! - Dropping a `Begun` wrapper never panics; resolution failures are logged.

use crate::config::{Resolution, TransactionMode};
use crate::db::{DbError, SequenceResetter};
use log::{error, info, warn};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

pub type TxResult<T> = Result<T, TransactionError>;

/// Lifecycle of a testing transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Begun,
    Committed,
    RolledBack,
}

#[derive(Debug)]
pub enum TransactionError {
    /// Commit or rollback requested on a resolved transaction.
    NotActive { state: TransactionState },
    /// SQLite already rolled the transaction back (`OR ROLLBACK` conflict,
    /// `RAISE(ROLLBACK)`, full disk), so a commit had nothing to commit.
    RolledBackByEngine,
    Db(DbError),
}

impl Display for TransactionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotActive { state } => {
                write!(f, "transaction is not active (state: {state:?})")
            }
            Self::RolledBackByEngine => {
                write!(f, "transaction was rolled back by SQLite before commit")
            }
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TransactionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotActive { .. } | Self::RolledBackByEngine => None,
            Self::Db(err) => Some(err),
        }
    }
}

impl From<DbError> for TransactionError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for TransactionError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Explicit transaction bound to an owned connection.
///
/// Repositories borrow the connection through [`TestingTransaction::connection`],
/// so every statement they issue runs inside the transaction.
pub struct TestingTransaction {
    // Only `finish` takes the connection, and it consumes the wrapper.
    conn: Option<Connection>,
    state: TransactionState,
    transaction_id: Uuid,
    default_resolution: Resolution,
    mode: TransactionMode,
}

impl TestingTransaction {
    /// Begins a transaction that rolls back unless resolved otherwise.
    pub fn begin(conn: Connection) -> TxResult<Self> {
        Self::begin_with(conn, Resolution::RolledBack, TransactionMode::default())
    }

    /// Begins a transaction with an explicit default resolution and locking mode.
    ///
    /// # Errors
    /// - `DbError::TransactionAlreadyActive` when `conn` is already inside a
    ///   transaction.
    pub fn begin_with(
        conn: Connection,
        default_resolution: Resolution,
        mode: TransactionMode,
    ) -> TxResult<Self> {
        let transaction_id = begin_on(&conn, mode)?;
        Ok(Self {
            conn: Some(conn),
            state: TransactionState::Begun,
            transaction_id,
            default_resolution,
            mode,
        })
    }

    pub fn connection(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("connection is held until finish() consumes the transaction")
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Identifier of the current transaction; changes on every restart.
    pub fn transaction_id(&self) -> Uuid {
        self.transaction_id
    }

    pub fn default_resolution(&self) -> Resolution {
        self.default_resolution
    }

    /// Commits the transaction.
    ///
    /// # Errors
    /// - `RolledBackByEngine` when SQLite already ended the transaction; the
    ///   wrapper is then resolved as rolled back.
    pub fn commit(&mut self) -> TxResult<()> {
        self.ensure_begun()?;
        if self.connection().is_autocommit() {
            warn!(
                "event=tx_commit module=testing status=aborted tx_id={}",
                self.transaction_id
            );
            self.rollback()?;
            return Err(TransactionError::RolledBackByEngine);
        }
        let started_at = Instant::now();
        self.connection().execute_batch("COMMIT;")?;
        self.state = TransactionState::Committed;
        info!(
            "event=tx_commit module=testing status=ok tx_id={} duration_ms={}",
            self.transaction_id,
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Rolls back, then resets every sequence generator from live data.
    ///
    /// A transaction SQLite already rolled back is only marked resolved.
    pub fn rollback(&mut self) -> TxResult<()> {
        self.ensure_begun()?;
        let started_at = Instant::now();
        let ended_by_engine = self.connection().is_autocommit();
        if !ended_by_engine {
            self.connection().execute_batch("ROLLBACK;")?;
        }
        self.state = TransactionState::RolledBack;

        let resets = SequenceResetter::reset_all(self.connection())?;
        info!(
            "event=tx_rollback module=testing status=ok tx_id={} ended_by_engine={} sequences_reset={} duration_ms={}",
            self.transaction_id,
            ended_by_engine,
            resets.len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Resolves the current transaction if needed and begins a new one on the
    /// same connection.
    pub fn restart(&mut self) -> TxResult<()> {
        self.resolve_pending()?;
        self.transaction_id = begin_on(self.connection(), self.mode)?;
        self.state = TransactionState::Begun;
        Ok(())
    }

    /// Resolves the current transaction, swaps in `conn` and begins a new
    /// transaction on it. Returns the previous connection.
    pub fn restart_with(&mut self, conn: Connection) -> TxResult<Connection> {
        self.resolve_pending()?;
        let transaction_id = begin_on(&conn, self.mode)?;
        let previous = self.conn.replace(conn);
        self.transaction_id = transaction_id;
        self.state = TransactionState::Begun;
        Ok(previous.expect("connection is held until finish() consumes the transaction"))
    }

    /// Resolves the transaction per the default resolution and hands the
    /// connection back.
    pub fn finish(mut self) -> TxResult<Connection> {
        self.resolve_pending()?;
        Ok(self
            .conn
            .take()
            .expect("connection is held until finish() consumes the transaction"))
    }

    fn resolve_pending(&mut self) -> TxResult<()> {
        if self.state != TransactionState::Begun {
            return Ok(());
        }
        match self.default_resolution {
            Resolution::Committed => self.commit(),
            Resolution::RolledBack => self.rollback(),
        }
    }

    fn ensure_begun(&self) -> TxResult<()> {
        if self.state == TransactionState::Begun {
            Ok(())
        } else {
            Err(TransactionError::NotActive { state: self.state })
        }
    }
}

impl Drop for TestingTransaction {
    fn drop(&mut self) {
        if self.conn.is_none() {
            return;
        }
        if let Err(err) = self.resolve_pending() {
            error!(
                "event=tx_teardown module=testing status=error tx_id={} error={}",
                self.transaction_id, err
            );
        }
    }
}

fn begin_on(conn: &Connection, mode: TransactionMode) -> TxResult<Uuid> {
    if !conn.is_autocommit() {
        return Err(DbError::TransactionAlreadyActive.into());
    }
    conn.execute_batch(mode.begin_sql())?;
    let transaction_id = Uuid::new_v4();
    info!("event=tx_begin module=testing status=ok tx_id={transaction_id}");
    Ok(transaction_id)
}
