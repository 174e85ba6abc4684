//! Entity capability trait and the person reference model.
//!
//! # Responsibility
//! - Define the fixed capability set (`has-primary-key`, `maps-to-table`)
//!   that the generic repository is written against.
//! - Provide `Person` as the reference entity used by the CLI and tests.

pub mod entity;
pub mod person;
