//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Provide a generic CRUD repository over any `Entity`.
//! - Isolate SQLite query details from callers and test fixtures.
//!
//! # Invariants
//! - Repository writes must enforce `Entity::validate()` before persistence.
//! - Repository APIs return semantic errors (`MissingEntity`,
//!   `UnsavedEntity`) in addition to DB transport errors.

pub mod filter;
pub mod person_repo;
pub mod sql_repo;
