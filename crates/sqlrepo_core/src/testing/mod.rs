//! Auto-rollback test support.
//!
//! # Responsibility
//! - Wrap each test in a database transaction that is resolved on teardown.
//! - Reset sequence generators after rollback so key values stay
//!   deterministic across runs.
//!
//! # Invariants
//! - SQLite transactions are scoped to one connection, so isolation never
//!   touches other connections to the same database.

pub mod fixture;
pub mod transaction;

pub use fixture::{DatabaseFixture, TestScope};
pub use transaction::{TestingTransaction, TransactionError, TransactionState, TxResult};
