//! Person repository on top of the generic `SqlRepo`.

use crate::model::person::{Person, PersonId};
use crate::repo::filter::Filter;
use crate::repo::sql_repo::{RepoResult, SqlRepo};
use rusqlite::types::Value;
use rusqlite::Connection;

/// Person-specific queries plus the generic CRUD surface.
pub struct PersonRepository<'conn> {
    inner: SqlRepo<'conn, Person>,
}

impl<'conn> PersonRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        Ok(Self {
            inner: SqlRepo::try_new(conn)?,
        })
    }

    pub fn create(&self, person: Person) -> RepoResult<Person> {
        self.inner.create(person)
    }

    pub fn update(&self, person: &Person) -> RepoResult<()> {
        self.inner.update(person)
    }

    pub fn delete(&self, id: PersonId) -> RepoResult<()> {
        self.inner.delete_by_key(&[Value::Integer(id)])
    }

    pub fn get_by_id(&self, id: PersonId) -> RepoResult<Option<Person>> {
        self.inner.get_by_id(&[Value::Integer(id)])
    }

    pub fn get_by_last_name(&self, last_name: &str) -> RepoResult<Vec<Person>> {
        let filter = Filter::all().eq("last_name", last_name.to_string());
        self.inner.find(&filter)
    }

    pub fn get_all(&self) -> RepoResult<Vec<Person>> {
        self.inner.get_all()
    }

    /// Access to the generic repository for paged queries and JSON reads.
    pub fn sql(&self) -> &SqlRepo<'conn, Person> {
        &self.inner
    }
}
