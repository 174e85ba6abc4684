use rusqlite::types::Value;
use rusqlite::Connection;
use sqlrepo_core::db::open_db_in_memory;
use sqlrepo_core::db::sequence::current_value;
use sqlrepo_core::{Filter, Person, PersonRepository, RepoError, TestingTransaction};

fn seed(repo: &PersonRepository<'_>, people: &[(&str, &str)]) -> Vec<Person> {
    people
        .iter()
        .map(|(first, last)| repo.create(Person::new(*first, *last)).unwrap())
        .collect()
}

fn person_rows(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM person;", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn create_draws_keys_from_the_person_sequence() {
    let conn = open_db_in_memory().unwrap();
    let repo = PersonRepository::try_new(&conn).unwrap();

    let created = seed(&repo, &[("Jane", "Smith"), ("John", "Smith"), ("Bob", "Jones")]);

    let ids: Vec<_> = created.iter().map(|person| person.person_id).collect();
    assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);
    assert_eq!(current_value(&conn, "seq_person").unwrap(), Some(4));

    let loaded = repo.get_by_id(2).unwrap().unwrap();
    assert_eq!(loaded, created[1]);
}

#[test]
fn create_keeps_a_caller_assigned_key() {
    let conn = open_db_in_memory().unwrap();
    let repo = PersonRepository::try_new(&conn).unwrap();

    let person = Person {
        person_id: Some(42),
        ..Person::new("Grace", "Hopper")
    };
    let created = repo.create(person).unwrap();

    assert_eq!(created.person_id, Some(42));
    assert_eq!(current_value(&conn, "seq_person").unwrap(), Some(1));
    assert!(repo.get_by_id(42).unwrap().is_some());
}

#[test]
fn delete_of_missing_key_reports_the_key_tuple() {
    for id in [3, 4] {
        let conn = open_db_in_memory().unwrap();
        let repo = PersonRepository::try_new(&conn).unwrap();

        let err = repo.delete(id).unwrap_err();
        assert!(matches!(err, RepoError::MissingEntity { entity: "Person", .. }));
        assert_eq!(
            err.to_string(),
            format!("Cannot find Person object with key value = [{id}]")
        );
    }
}

#[test]
fn update_of_missing_key_reports_the_key_tuple() {
    let conn = open_db_in_memory().unwrap();
    let repo = PersonRepository::try_new(&conn).unwrap();

    let ghost = Person {
        person_id: Some(7),
        ..Person::new("Nobody", "Here")
    };
    let err = repo.update(&ghost).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cannot find Person object with key value = [7]"
    );
}

#[test]
fn update_and_delete_require_a_saved_person() {
    let conn = open_db_in_memory().unwrap();
    let repo = PersonRepository::try_new(&conn).unwrap();
    seed(&repo, &[("Jane", "Smith")]);

    let unsaved = Person::new("Jane", "Doe");
    assert!(matches!(
        repo.update(&unsaved),
        Err(RepoError::UnsavedEntity {
            operation: "update",
            ..
        })
    ));
    assert!(matches!(
        repo.sql().delete(&unsaved),
        Err(RepoError::UnsavedEntity {
            operation: "delete",
            ..
        })
    ));
    assert_eq!(person_rows(&conn), 1);
}

#[test]
fn validation_failure_happens_before_any_write() {
    let conn = open_db_in_memory().unwrap();
    let repo = PersonRepository::try_new(&conn).unwrap();

    let too_long = Person::new("x".repeat(31), "Smith");
    assert!(matches!(
        repo.create(too_long),
        Err(RepoError::Validation {
            entity: "Person",
            ..
        })
    ));
    assert_eq!(person_rows(&conn), 0);
    assert_eq!(current_value(&conn, "seq_person").unwrap(), Some(1));

    let mut saved = repo.create(Person::new("Jane", "Smith")).unwrap();
    saved.last_name = Some("y".repeat(31));
    assert!(matches!(
        repo.update(&saved),
        Err(RepoError::Validation { .. })
    ));
    let stored = repo.get_by_id(1).unwrap().unwrap();
    assert_eq!(stored.last_name.as_deref(), Some("Smith"));
}

#[test]
fn get_by_last_name_returns_matches_in_key_order() {
    let conn = open_db_in_memory().unwrap();
    let repo = PersonRepository::try_new(&conn).unwrap();
    seed(&repo, &[("Jane", "Smith"), ("Bob", "Jones"), ("John", "Smith")]);

    let smiths = repo.get_by_last_name("Smith").unwrap();
    let firsts: Vec<_> = smiths
        .iter()
        .map(|person| person.first_name.as_deref().unwrap())
        .collect();
    assert_eq!(firsts, vec!["Jane", "John"]);
    assert!(repo.get_by_last_name("Nobody").unwrap().is_empty());
}

#[test]
fn get_by_query_pages_through_filtered_rows() {
    let conn = open_db_in_memory().unwrap();
    let repo = PersonRepository::try_new(&conn).unwrap();
    seed(
        &repo,
        &[
            ("John", "Davis"),
            ("Bob", "Jones"),
            ("Mary", "Davis"),
            ("Ann", "Davis"),
        ],
    );

    let davis = Filter::all().eq("last_name", "Davis".to_string());
    let first_page = repo.sql().get_by_query(&davis, 1, 2).unwrap();
    let second_page = repo.sql().get_by_query(&davis, 2, 2).unwrap();
    let past_end = repo.sql().get_by_query(&davis, 3, 2).unwrap();

    let ids = |page: &[Person]| page.iter().map(|p| p.person_id.unwrap()).collect::<Vec<_>>();
    assert_eq!(ids(&first_page), vec![1, 3]);
    assert_eq!(ids(&second_page), vec![4]);
    assert!(past_end.is_empty());
    assert_eq!(repo.sql().count(&davis).unwrap(), 3);

    let single = repo
        .sql()
        .get_by_query(&Filter::all().eq("last_name", "Jones".to_string()), 1, 10)
        .unwrap();
    assert_eq!(single.len(), 1);
    assert_eq!(single[0].first_name.as_deref(), Some("Bob"));
}

#[test]
fn get_by_query_rejects_zero_page_and_unknown_columns() {
    let conn = open_db_in_memory().unwrap();
    let repo = PersonRepository::try_new(&conn).unwrap();

    assert!(matches!(
        repo.sql().get_by_query(&Filter::all(), 0, 10),
        Err(RepoError::InvalidPage { page: 0, .. })
    ));
    assert!(matches!(
        repo.sql().get_by_query(&Filter::all(), 1, 0),
        Err(RepoError::InvalidPage { page_size: 0, .. })
    ));
    let injected = Filter::all().eq("last_name; DROP TABLE person", "x".to_string());
    let result = repo.sql().find(&injected);
    assert!(matches!(result, Err(RepoError::UnknownColumn { .. })));
}

#[test]
fn get_json_returns_the_single_document() {
    let conn = open_db_in_memory().unwrap();
    let repo = PersonRepository::try_new(&conn).unwrap();
    seed(&repo, &[("Jane", "Smith"), ("Bob", "Jones")]);

    let json = repo
        .sql()
        .get_json(
            "select json_group_array(json_object('personId', person_id, 'lastName', last_name)) \
             from (select * from person order by person_id);",
        )
        .unwrap()
        .unwrap();

    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(
        parsed,
        serde_json::json!([
            { "personId": 1, "lastName": "Smith" },
            { "personId": 2, "lastName": "Jones" }
        ])
    );
}

#[test]
fn get_json_rejects_statements_that_are_not_select() {
    let conn = open_db_in_memory().unwrap();
    let repo = PersonRepository::try_new(&conn).unwrap();

    for sql in ["DELETE FROM person", "  ", "WITH x AS (SELECT 1) SELECT * FROM x"] {
        assert!(
            matches!(repo.sql().get_json(sql), Err(RepoError::MalformedQuery(_))),
            "accepted `{sql}`"
        );
    }
}

#[test]
fn repository_requires_a_migrated_connection() {
    let conn = Connection::open_in_memory().unwrap();

    let err = match PersonRepository::try_new(&conn) {
        Ok(_) => panic!("unmigrated connection must be rejected"),
        Err(err) => err,
    };
    assert!(matches!(
        err,
        RepoError::UninitializedConnection {
            actual_version: 0,
            ..
        }
    ));
}

#[test]
fn repository_inside_a_transaction_leaves_no_trace() {
    let tx = TestingTransaction::begin(open_db_in_memory().unwrap()).unwrap();
    {
        let repo = PersonRepository::try_new(tx.connection()).unwrap();
        seed(&repo, &[("Jane", "Smith"), ("John", "Smith")]);
        repo.delete(1).unwrap();
        assert_eq!(repo.get_all().unwrap().len(), 1);
    }

    let conn = tx.finish().unwrap();
    assert_eq!(person_rows(&conn), 0);
    assert_eq!(current_value(&conn, "seq_person").unwrap(), Some(1));

    let repo = PersonRepository::try_new(&conn).unwrap();
    let next = repo.create(Person::new("Bob", "Jones")).unwrap();
    assert_eq!(next.person_id, Some(1));
    assert!(repo.get_by_id(1).unwrap().is_some());
    assert!(repo.sql().exists(&[Value::Integer(1)]).unwrap());
}
