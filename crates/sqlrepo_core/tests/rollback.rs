use sqlrepo_core::db::open_with_config;
use sqlrepo_core::db::sequence::current_value;
use sqlrepo_core::{DatabaseConfig, DatabaseFixture, Person, PersonRepository, TransactionState};
use std::panic::{self, AssertUnwindSafe};
use tempfile::TempDir;

fn people_fixture() -> (TempDir, DatabaseFixture) {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig::file(dir.path().join("people.db"));
    let fixture = DatabaseFixture::setup(
        config,
        include_str!("fixtures/create.sql"),
        include_str!("fixtures/drop.sql"),
    )
    .unwrap();
    (dir, fixture)
}

fn expected_people(json: &str) -> Vec<Person> {
    serde_json::from_str(json).unwrap()
}

fn count_people(config: &DatabaseConfig) -> usize {
    let conn = open_with_config(config).unwrap();
    let repo = PersonRepository::try_new(&conn).unwrap();
    repo.get_all().unwrap().len()
}

#[test]
fn insert_and_update_is_repeatable_across_runs() {
    let (_dir, fixture) = people_fixture();

    for _run in 0..2 {
        let scope = fixture.unit_scope().unwrap();
        let repo = PersonRepository::try_new(scope.connection()).unwrap();
        repo.create(Person::new("Jane", "Smith")).unwrap();
        repo.create(Person::new("John", "Smith")).unwrap();
        repo.create(Person::new("Bob", "Jones")).unwrap();

        let mut smiths = repo.get_by_last_name("Smith").unwrap();
        assert_eq!(smiths.len(), 2);
        smiths[1].first_name = Some("Stu".to_string());
        repo.update(&smiths[1]).unwrap();

        let reloaded = repo.get_by_last_name("Smith").unwrap();
        assert_eq!(
            reloaded,
            expected_people(include_str!("fixtures/insert_and_update.json"))
        );
    }

    let scope = fixture.unit_scope().unwrap();
    let repo = PersonRepository::try_new(scope.connection()).unwrap();
    assert!(repo.get_by_last_name("Smith").unwrap().is_empty());
}

#[test]
fn insert_and_delete_keeps_insertion_order() {
    let (_dir, fixture) = people_fixture();
    let scope = fixture.unit_scope().unwrap();
    let repo = PersonRepository::try_new(scope.connection()).unwrap();

    repo.create(Person::new("Juan", "Rodriquez")).unwrap();
    let lee = repo.create(Person::new("Sue", "Lee")).unwrap();
    repo.create(Person::new("Christa", "Evans")).unwrap();
    repo.delete(lee.person_id.unwrap()).unwrap();

    assert_eq!(
        repo.get_all().unwrap(),
        expected_people(include_str!("fixtures/insert_and_delete.json"))
    );
}

#[test]
fn panicking_test_body_still_rolls_back() {
    let (_dir, fixture) = people_fixture();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let scope = fixture.unit_scope().unwrap();
        let repo = PersonRepository::try_new(scope.connection()).unwrap();
        repo.create(Person::new("Jane", "Smith")).unwrap();
        repo.create(Person::new("John", "Smith")).unwrap();
        panic!("test body failed after writing");
    }));
    assert!(outcome.is_err());

    let scope = fixture.unit_scope().unwrap();
    let repo = PersonRepository::try_new(scope.connection()).unwrap();
    assert!(repo.get_all().unwrap().is_empty());
    let next = current_value(scope.connection(), "seq_person").unwrap();
    assert_eq!(next, Some(1));
}

#[test]
fn rollback_realigns_sequence_with_committed_rows() {
    let (_dir, fixture) = people_fixture();

    let committed = fixture.integration_scope().unwrap();
    {
        let repo = PersonRepository::try_new(committed.connection()).unwrap();
        for (first, last) in [("Ada", "Byron"), ("Alan", "Turing"), ("Edsger", "Dijkstra")] {
            repo.create(Person::new(first, last)).unwrap();
        }
    }
    let conn = committed.finish().unwrap();
    // Simulate a generator that drifted ahead of the data.
    conn.execute(
        "UPDATE sequence_generators SET next_value = 100 WHERE name = 'seq_person';",
        [],
    )
    .unwrap();
    drop(conn);

    let mut scope = fixture.unit_scope().unwrap();
    {
        let repo = PersonRepository::try_new(scope.connection()).unwrap();
        let created = repo.create(Person::new("Grace", "Hopper")).unwrap();
        assert_eq!(created.person_id, Some(100));
    }
    scope.transaction().rollback().unwrap();

    assert_eq!(scope.state(), TransactionState::RolledBack);
    let next = current_value(scope.connection(), "seq_person").unwrap();
    assert_eq!(next, Some(4));
    assert_eq!(count_people(fixture.config()), 3);
}

#[test]
fn uncommitted_writes_are_invisible_to_other_connections() {
    let (_dir, fixture) = people_fixture();
    let scope = fixture.unit_scope().unwrap();
    let repo = PersonRepository::try_new(scope.connection()).unwrap();
    repo.create(Person::new("Jane", "Smith")).unwrap();

    assert_eq!(repo.get_all().unwrap().len(), 1);
    assert_eq!(count_people(fixture.config()), 0);
}

#[test]
fn each_scope_gets_a_fresh_transaction_id() {
    let (_dir, fixture) = people_fixture();

    let first = fixture.unit_scope().unwrap();
    let first_id = first.transaction_id();
    first.finish().unwrap();

    let mut second = fixture.unit_scope().unwrap();
    assert_ne!(second.transaction_id(), first_id);

    let before_restart = second.transaction_id();
    second.transaction().restart().unwrap();
    assert_ne!(second.transaction_id(), before_restart);
    assert_eq!(second.state(), TransactionState::Begun);
}

#[test]
fn fixture_drop_removes_the_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.db");
    let fixture = DatabaseFixture::setup(
        DatabaseConfig::file(&path),
        include_str!("fixtures/create.sql"),
        include_str!("fixtures/drop.sql"),
    )
    .unwrap();
    assert!(path.exists());

    drop(fixture);
    assert!(!path.exists());
}
