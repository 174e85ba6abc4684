//! Column predicates for paged repository queries.
//!
//! Conditions are AND-ed together. Column names are checked against the
//! entity's column list and values are always bound as parameters.

use super::sql_repo::{RepoError, RepoResult};
use crate::db::quote_ident;
use rusqlite::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    IsNull,
    IsNotNull,
}

impl Op {
    fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Condition {
    column: String,
    op: Op,
    value: Option<Value>,
}

/// Predicate over an entity's columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// Filter that matches every row.
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(column, Op::Eq, Some(value.into()))
    }

    #[must_use]
    pub fn ne(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(column, Op::Ne, Some(value.into()))
    }

    #[must_use]
    pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(column, Op::Lt, Some(value.into()))
    }

    #[must_use]
    pub fn le(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(column, Op::Le, Some(value.into()))
    }

    #[must_use]
    pub fn gt(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(column, Op::Gt, Some(value.into()))
    }

    #[must_use]
    pub fn ge(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(column, Op::Ge, Some(value.into()))
    }

    /// SQL `LIKE` with `%`/`_` wildcards.
    #[must_use]
    pub fn like(self, column: &str, pattern: impl Into<String>) -> Self {
        self.with(column, Op::Like, Some(Value::Text(pattern.into())))
    }

    #[must_use]
    pub fn is_null(self, column: &str) -> Self {
        self.with(column, Op::IsNull, None)
    }

    #[must_use]
    pub fn is_not_null(self, column: &str) -> Self {
        self.with(column, Op::IsNotNull, None)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    fn with(mut self, column: &str, op: Op, value: Option<Value>) -> Self {
        self.conditions.push(Condition {
            column: column.to_string(),
            op,
            value,
        });
        self
    }

    /// Renders ` WHERE ...` (or an empty string) plus bind values.
    pub(crate) fn to_where_clause(
        &self,
        table: &'static str,
        allowed: &[&str],
    ) -> RepoResult<(String, Vec<Value>)> {
        if self.conditions.is_empty() {
            return Ok((String::new(), Vec::new()));
        }

        let mut parts = Vec::with_capacity(self.conditions.len());
        let mut values = Vec::new();
        for condition in &self.conditions {
            let column = allowed
                .iter()
                .find(|known| known.eq_ignore_ascii_case(&condition.column))
                .ok_or_else(|| RepoError::UnknownColumn {
                    table,
                    column: condition.column.clone(),
                })?;

            match &condition.value {
                Some(value) => {
                    parts.push(format!("{} {} ?", quote_ident(column), condition.op.sql()));
                    values.push(value.clone());
                }
                None => parts.push(format!("{} {}", quote_ident(column), condition.op.sql())),
            }
        }

        Ok((format!(" WHERE {}", parts.join(" AND ")), values))
    }
}
