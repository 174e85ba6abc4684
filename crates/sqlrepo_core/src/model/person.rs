//! Person reference entity.
//!
//! # Invariants
//! - `person_id` is fed by the `seq_person` generator when left empty.
//! - Names never exceed `NAME_MAX_CHARS` characters.

use super::entity::{Entity, KeyGeneration};
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

pub const NAME_MAX_CHARS: usize = 30;

pub type PersonId = i64;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub person_id: Option<PersonId>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Person {
    /// Creates an unsaved person; the key is assigned on create.
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            person_id: None,
            first_name: Some(first_name.into()),
            last_name: Some(last_name.into()),
        }
    }
}

impl Entity for Person {
    fn entity_name() -> &'static str {
        "Person"
    }

    fn table_name() -> &'static str {
        "person"
    }

    fn key_columns() -> &'static [&'static str] {
        &["person_id"]
    }

    fn columns() -> &'static [&'static str] {
        &["first_name", "last_name"]
    }

    fn key_generation() -> KeyGeneration {
        KeyGeneration::Sequence("seq_person")
    }

    fn key_values(&self) -> Option<Vec<Value>> {
        self.person_id.map(|id| vec![Value::Integer(id)])
    }

    fn set_generated_key(&mut self, key: i64) {
        self.person_id = Some(key);
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.first_name.clone()),
            Value::from(self.last_name.clone()),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            person_id: row.get("person_id")?,
            first_name: row.get("first_name")?,
            last_name: row.get("last_name")?,
        })
    }

    fn validate(&self) -> Result<(), String> {
        for (field, value) in [("first_name", &self.first_name), ("last_name", &self.last_name)] {
            if let Some(value) = value {
                if value.chars().count() > NAME_MAX_CHARS {
                    return Err(format!("{field} exceeds {NAME_MAX_CHARS} characters"));
                }
            }
        }
        Ok(())
    }
}
