//! Generic SQLite repository layer with auto-rollback test transactions.
//!
//! Repositories run every statement on a borrowed connection; wrap that
//! connection in a `TestingTransaction` (or a `TestScope`) and everything a
//! test writes is discarded on teardown, with sequence generators realigned
//! afterward.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod testing;

pub use config::{ConfigError, DataSource, DatabaseConfig, Resolution, TransactionMode};
pub use db::{DbError, DbResult, ScriptExecutor, SequenceReset, SequenceResetter};
pub use logging::{default_log_level, init_logging, logging_status, LogConfig, LogTarget};
pub use model::entity::{Entity, KeyGeneration};
pub use model::person::{Person, PersonId};
pub use repo::filter::Filter;
pub use repo::person_repo::PersonRepository;
pub use repo::sql_repo::{RepoError, RepoResult, SqlRepo};
pub use testing::{
    DatabaseFixture, TestScope, TestingTransaction, TransactionError, TransactionState, TxResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
