use rosterlink_core::db::open_db_in_memory;
use rosterlink_core::repo::query::{ArrayMatcher, Comparison, ElementPredicate, FieldUpdates};
use rosterlink_core::{
    Collection, Department, Document, Employee, EntityStore, Project, RepoError, Skill,
    SkillLevel, SqliteStore,
};
use rusqlite::Connection;
use serde_json::json;

#[test]
fn store_requires_migrated_connection() {
    let conn = Connection::open_in_memory().unwrap();
    let err = SqliteStore::try_new(&conn).err().unwrap();
    assert!(matches!(err, RepoError::MissingRequiredTable(_)));
}

#[test]
fn save_then_get_roundtrips_document_and_version() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();

    let mut employee = Employee::new(3, "Ann");
    employee.skills = vec![SkillLevel {
        skill_id: 1,
        proficiency: 4,
    }];
    employee.projects = vec![7, 8];
    store.save(&mut employee).unwrap();
    assert_eq!(employee.version(), 1);

    let loaded: Employee = store.get(3).unwrap().unwrap();
    assert_eq!(loaded, employee);
    assert!(store.get::<Employee>(4).unwrap().is_none());
}

#[test]
fn documents_are_stored_with_camel_case_keys() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();

    let mut department = Department::new(1, "Eng");
    department.manager_id = Some(5);
    department.members = vec![5];
    store.save(&mut department).unwrap();

    let doc: String = conn
        .query_row("SELECT doc FROM departments WHERE id = 1;", [], |row| {
            row.get(0)
        })
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&doc).unwrap();
    assert_eq!(value["managerId"], json!(5));
    assert_eq!(value["members"], json!([5]));
    assert!(value.get("version").is_none());
}

#[test]
fn stale_version_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();

    let mut first = Skill::new(1, "Rust");
    store.save(&mut first).unwrap();
    let mut second: Skill = store.get(1).unwrap().unwrap();

    first.name = "Rust 2021".to_string();
    store.save(&mut first).unwrap();
    assert_eq!(first.version(), 2);

    second.name = "Go".to_string();
    match store.save(&mut second).unwrap_err() {
        RepoError::VersionConflict {
            collection,
            id,
            expected,
        } => {
            assert_eq!(collection, Collection::Skills);
            assert_eq!(id, 1);
            assert_eq!(expected, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    let stored: Skill = store.get(1).unwrap().unwrap();
    assert_eq!(stored.name, "Rust 2021");
}

#[test]
fn versioned_save_of_deleted_document_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();

    let mut skill = Skill::new(2, "SQL");
    store.save(&mut skill).unwrap();
    assert!(store.delete::<Skill>(2).unwrap());
    assert!(!store.delete::<Skill>(2).unwrap());

    assert!(matches!(
        store.save(&mut skill).unwrap_err(),
        RepoError::NotFound { id: 2, .. }
    ));
}

#[test]
fn update_fields_touches_only_named_fields() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();

    let mut employee = Employee::new(1, "Ann");
    employee.dep_id = Some(4);
    employee.projects = vec![2];
    store.save(&mut employee).unwrap();

    store
        .update_fields::<Employee>(1, &FieldUpdates::new().set("depId", json!(9)))
        .unwrap();
    let loaded: Employee = store.get(1).unwrap().unwrap();
    assert_eq!(loaded.dep_id, Some(9));
    assert_eq!(loaded.projects, vec![2]);
    assert_eq!(loaded.version(), 2);

    store
        .update_fields::<Employee>(1, &FieldUpdates::new().set("depId", json!(null)))
        .unwrap();
    assert_eq!(store.get::<Employee>(1).unwrap().unwrap().dep_id, None);

    assert!(matches!(
        store
            .update_fields::<Employee>(1, &FieldUpdates::new().set("id", json!(5)))
            .unwrap_err(),
        RepoError::InvalidQuery(_)
    ));
    assert!(matches!(
        store
            .update_fields::<Employee>(42, &FieldUpdates::new().set("name", json!("X")))
            .unwrap_err(),
        RepoError::NotFound { id: 42, .. }
    ));
}

#[test]
fn get_many_skips_missing_ids() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    for (id, name) in [(1, "Rust"), (2, "SQL"), (3, "Go")] {
        store.save(&mut Skill::new(id, name)).unwrap();
    }

    let found: Vec<Skill> = store.get_many(&[3, 9, 1]).unwrap();
    let ids: Vec<i64> = found.iter().map(|skill| skill.id).collect();
    assert_eq!(ids, vec![1, 3]);
    assert!(store.get_many::<Skill>(&[]).unwrap().is_empty());
}

#[test]
fn name_search_and_paging() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    for (id, name) in [(1, "Annie"), (2, "Bob"), (3, "joanna"), (4, "Hannah"), (5, "Zed")] {
        store.save(&mut Employee::new(id, name)).unwrap();
    }

    let insensitive: Vec<Employee> = store.find_by_name_contains("ANN", true).unwrap();
    assert_eq!(insensitive.len(), 3);
    let sensitive: Vec<Employee> = store.find_by_name_contains("Ann", false).unwrap();
    assert_eq!(sensitive.len(), 1);
    assert_eq!(store.find_by_name_contains::<Employee>(" ", true).unwrap().len(), 5);

    let page = store.find_page::<Employee>("ann", 2, Some(2)).unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.total_pages(), 2);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, 4);

    let everything = store.find_page::<Employee>("", 1, None).unwrap();
    assert_eq!(everything.items.len(), 5);
    assert_eq!(everything.page_size, 5);

    assert!(matches!(
        store.find_page::<Employee>("", 0, Some(2)).unwrap_err(),
        RepoError::InvalidQuery(_)
    ));
    assert!(store.find_page::<Employee>("", 1, Some(0)).is_err());
}

#[test]
fn case_insensitive_search_folds_ascii_letters_only() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    store.save(&mut Employee::new(1, "ÖLAF")).unwrap();
    store.save(&mut Employee::new(2, "Ölaf")).unwrap();

    let ascii: Vec<Employee> = store.find_by_name_contains("laf", true).unwrap();
    assert_eq!(ascii.len(), 2);
    let upper: Vec<Employee> = store.find_by_name_contains("Öl", true).unwrap();
    assert_eq!(upper.len(), 2);
    let folded: Vec<Employee> = store.find_by_name_contains("öl", true).unwrap();
    assert!(folded.is_empty());
}

#[test]
fn array_queries_match_ids_and_element_predicates() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();

    let mut apollo = Project::new(1, "Apollo");
    apollo.members = vec![5, 6];
    let mut gemini = Project::new(2, "Gemini");
    gemini.members = vec![6];
    store.save(&mut apollo).unwrap();
    store.save(&mut gemini).unwrap();

    let with_five: Vec<Project> = store
        .find_where_array_contains("members", &ArrayMatcher::Equals(5))
        .unwrap();
    assert_eq!(with_five.len(), 1);
    assert_eq!(with_five[0].id, 1);

    let mut ann = Employee::new(1, "Ann");
    ann.skills = vec![
        SkillLevel {
            skill_id: 1,
            proficiency: 4,
        },
        SkillLevel {
            skill_id: 2,
            proficiency: 1,
        },
    ];
    let mut bob = Employee::new(2, "Bob");
    bob.skills = vec![SkillLevel {
        skill_id: 2,
        proficiency: 5,
    }];
    store.save(&mut ann).unwrap();
    store.save(&mut bob).unwrap();

    let strong_in_two: Vec<Employee> = store
        .find_where_array_contains(
            "skills",
            &ArrayMatcher::ElementMatch(vec![
                ElementPredicate::new("skillId", Comparison::Eq, 2),
                ElementPredicate::new("proficiency", Comparison::Gte, 3),
            ]),
        )
        .unwrap();
    let ids: Vec<i64> = strong_in_two.iter().map(|employee| employee.id).collect();
    assert_eq!(ids, vec![2]);

    assert!(matches!(
        store
            .find_where_array_contains::<Employee>("skills; DROP", &ArrayMatcher::Equals(1))
            .unwrap_err(),
        RepoError::InvalidQuery(_)
    ));
}

#[test]
fn id_allocation_starts_after_existing_documents_and_never_reuses() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();

    assert_eq!(store.next_id::<Department>().unwrap(), 1);
    assert_eq!(store.next_id::<Department>().unwrap(), 2);
    assert_eq!(store.next_id::<Skill>().unwrap(), 1);

    store.save(&mut Department::new(10, "Ops")).unwrap();
    assert_eq!(store.next_id::<Department>().unwrap(), 11);

    assert!(store.delete::<Department>(10).unwrap());
    assert_eq!(store.next_id::<Department>().unwrap(), 12);
}
