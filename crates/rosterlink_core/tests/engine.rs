use rosterlink_core::db::open_db;
use rosterlink_core::{
    Collection, DepartmentInput, Employee, EmployeeInput, Engine, EngineConfig, EngineError,
    EntityStore, ManagerUpdate, Project, RetryPolicy, Skill, SkillLevel, Task, Training,
};
use std::cell::Cell;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

fn employee(name: &str, dep_id: Option<i64>) -> EmployeeInput {
    EmployeeInput {
        name: name.to_string(),
        dep_id,
        ..EmployeeInput::default()
    }
}

#[test]
fn failed_write_rolls_back_every_document() {
    let mut engine = Engine::in_memory().unwrap();

    let err = engine
        .write("seed_then_fail", |store| {
            store.save(&mut Skill::new(1, "Rust"))?;
            store.save(&mut Project::new(1, "Apollo"))?;
            Err::<(), _>(EngineError::InvalidName)
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidName));

    let skills = engine.read(|store| Ok(store.list::<Skill>()?)).unwrap();
    assert!(skills.is_empty());
    let projects = engine.read(|store| Ok(store.list::<Project>()?)).unwrap();
    assert!(projects.is_empty());
}

#[test]
fn non_retryable_errors_run_once() {
    let mut engine = Engine::in_memory().unwrap();
    let calls = Cell::new(0);

    let err = engine
        .write("missing", |store| {
            calls.set(calls.get() + 1);
            Ok(store
                .get::<Employee>(7)?
                .ok_or(EngineError::NotFound {
                    collection: rosterlink_core::Collection::Employees,
                    ids: vec![7],
                })?)
        })
        .unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(calls.get(), 1);
}

#[test]
fn end_to_end_department_and_employee_scenario() {
    let mut engine = Engine::in_memory().unwrap();

    let eng = engine
        .create_department(&DepartmentInput {
            name: "Eng".to_string(),
            ..DepartmentInput::default()
        })
        .unwrap();
    assert_eq!(eng.id, 1);

    let ann = engine.create_employee(&employee("Ann", Some(1))).unwrap();
    let bob = engine.create_employee(&employee("Bob", Some(1))).unwrap();
    engine
        .update_department(
            1,
            &DepartmentInput {
                name: "Eng".to_string(),
                manager: ManagerUpdate::Set(ann.id),
                members: vec![ann.id, bob.id],
            },
        )
        .unwrap();

    let page = engine.department_page("eng", 1, None).unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(
        page.items[0].manager.as_ref().map(|manager| manager.id),
        Some(ann.id)
    );

    engine.delete_employee(ann.id).unwrap();
    let page = engine.department_page("", 1, None).unwrap();
    assert_eq!(page.items[0].manager, None);
    assert_eq!(page.items[0].members.len(), 1);

    engine.delete_department(1).unwrap();
    let bob_view = engine.employee_view(bob.id).unwrap().unwrap();
    assert_eq!(bob_view.employee.dep_id, None);
    assert!(engine.audit().unwrap().is_consistent());
}

#[test]
fn put_allocates_ids_for_reference_data() {
    let mut engine = Engine::in_memory().unwrap();

    let rust = engine.put(&Skill::new(0, "Rust")).unwrap();
    let sql = engine.put(&Skill::new(0, "SQL")).unwrap();
    assert_eq!((rust.id, sql.id), (1, 2));

    let ann = engine
        .create_employee(&EmployeeInput {
            skills: vec![SkillLevel {
                skill_id: sql.id,
                proficiency: 5,
            }],
            ..employee("Ann", None)
        })
        .unwrap();
    let view = engine.employee_view(ann.id).unwrap().unwrap();
    assert_eq!(view.skills[0].name.as_deref(), Some("SQL"));
}

#[test]
fn put_refuses_to_write_employee_links_directly() {
    let mut engine = Engine::in_memory().unwrap();
    let ann = engine.create_employee(&employee("Ann", None)).unwrap();

    let mut staffed = Project::new(0, "Apollo");
    staffed.members = vec![ann.id];
    let err = engine.put(&staffed).unwrap_err();
    assert!(matches!(
        err,
        EngineError::EmployeeLinksChanged {
            collection: Collection::Projects,
            id: 0,
        }
    ));
    assert!(err.is_validation());

    let mut managed = Task::new(0, "Kickoff");
    managed.manager_id = Some(ann.id);
    assert!(matches!(
        engine.put(&managed).unwrap_err(),
        EngineError::EmployeeLinksChanged {
            collection: Collection::Tasks,
            ..
        }
    ));

    let mut training = Training::new(3, "Onboarding");
    training.members = vec![ann.id];
    assert!(engine.put(&training).is_err());

    let projects = engine.read(|store| Ok(store.list::<Project>()?)).unwrap();
    assert!(projects.is_empty());
    assert!(engine.audit().unwrap().is_consistent());
}

#[test]
fn put_keeps_links_made_through_employee_updates() {
    let mut engine = Engine::in_memory().unwrap();
    let apollo = engine.put(&Project::new(0, "Apollo")).unwrap();
    let ann = engine
        .create_employee(&EmployeeInput {
            projects: vec![apollo.id],
            ..employee("Ann", None)
        })
        .unwrap();

    let mut stored: Project = engine
        .read(|store| Ok(store.get::<Project>(apollo.id)?))
        .unwrap()
        .unwrap();
    stored.name = "Apollo II".to_string();
    let renamed = engine.put(&stored).unwrap();
    assert_eq!(renamed.members, vec![ann.id]);

    let mut emptied = renamed.clone();
    emptied.members.clear();
    assert!(matches!(
        engine.put(&emptied).unwrap_err(),
        EngineError::EmployeeLinksChanged { .. }
    ));
    assert!(engine.audit().unwrap().is_consistent());
}

#[test]
fn busy_database_is_retried_until_the_lock_is_released() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roster.db");
    drop(open_db(&path).unwrap());

    let mut engine = Engine::open(EngineConfig {
        db_path: Some(path.clone()),
        busy_timeout_ms: 0,
        retry: RetryPolicy {
            max_attempts: 8,
            base_delay_ms: 20,
            max_delay_ms: 100,
        },
    })
    .unwrap();

    let (locked_tx, locked_rx) = mpsc::channel();
    let blocker = thread::spawn(move || {
        let conn = open_db(&path).unwrap();
        conn.execute_batch("BEGIN IMMEDIATE;").unwrap();
        locked_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(60));
        conn.execute_batch("COMMIT;").unwrap();
    });
    locked_rx.recv().unwrap();

    let skill = engine.put(&Skill::new(0, "Rust")).unwrap();
    assert_eq!(skill.id, 1);
    blocker.join().unwrap();
}

#[test]
fn busy_database_surfaces_storage_unavailable_after_last_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roster.db");
    let holder = open_db(&path).unwrap();

    let mut engine = Engine::open(EngineConfig {
        db_path: Some(path),
        busy_timeout_ms: 0,
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 1,
        },
    })
    .unwrap();

    holder.execute_batch("BEGIN IMMEDIATE;").unwrap();
    let err = engine.put(&Skill::new(0, "Rust")).unwrap_err();
    assert!(matches!(err, EngineError::StorageUnavailable(_)));
    assert!(err.is_retryable());
    holder.execute_batch("ROLLBACK;").unwrap();

    let config = engine.config().clone();
    assert_eq!(config.retry.max_attempts, 2);
    assert_eq!(RetryPolicy::no_retry().max_attempts, 1);
}
