use rosterlink_core::db::open_db_in_memory;
use rosterlink_core::{
    Department, DepartmentInput, DepartmentService, Employee, EmployeeInput, EmployeeService,
    EngineError, EntityStore, ManagerUpdate, SqliteStore,
};

fn seed_employees(store: &SqliteStore<'_>, ids: &[i64]) {
    for id in ids {
        store
            .save(&mut Employee::new(*id, format!("Employee {id}")))
            .unwrap();
    }
}

fn department(name: &str, manager: ManagerUpdate, members: &[i64]) -> DepartmentInput {
    DepartmentInput {
        name: name.to_string(),
        manager,
        members: members.to_vec(),
    }
}

fn dep_id(store: &SqliteStore<'_>, employee_id: i64) -> Option<i64> {
    store.get::<Employee>(employee_id).unwrap().unwrap().dep_id
}

#[test]
fn first_department_gets_id_one_and_new_employee_joins_it() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();

    let eng = DepartmentService::new(store)
        .create(&department("Eng", ManagerUpdate::Clear, &[]))
        .unwrap();
    assert_eq!(eng.id, 1);

    let ann = EmployeeService::new(store)
        .create(&EmployeeInput {
            name: "Ann".to_string(),
            dep_id: Some(1),
            ..EmployeeInput::default()
        })
        .unwrap();

    let eng: Department = store.get(1).unwrap().unwrap();
    assert_eq!(eng.members, vec![ann.id]);
}

#[test]
fn manager_must_be_in_resulting_member_set() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    seed_employees(&store, &[5, 6, 7]);
    let service = DepartmentService::new(store);

    assert!(matches!(
        service
            .create(&department("Eng", ManagerUpdate::Set(7), &[5, 6]))
            .unwrap_err(),
        EngineError::InvalidManager { manager_id: 7 }
    ));
    assert!(service.list().unwrap().is_empty());
    assert_eq!(dep_id(&store, 5), None);

    let eng = service
        .create(&department("Eng", ManagerUpdate::Set(5), &[5, 6]))
        .unwrap();
    assert_eq!(eng.manager_id, Some(5));

    assert!(matches!(
        service
            .update(eng.id, &department("Eng", ManagerUpdate::Set(5), &[6]))
            .unwrap_err(),
        EngineError::InvalidManager { manager_id: 5 }
    ));
    let unchanged: Department = store.get(eng.id).unwrap().unwrap();
    assert_eq!(unchanged.members, vec![5, 6]);
    assert_eq!(dep_id(&store, 5), Some(eng.id));

    let cleared = service
        .update(eng.id, &department("Eng", ManagerUpdate::Clear, &[6]))
        .unwrap();
    assert_eq!(cleared.manager_id, None);
}

#[test]
fn removing_the_manager_from_members_demotes_it() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    seed_employees(&store, &[5, 6]);
    let service = DepartmentService::new(store);

    let eng = service
        .create(&department("Eng", ManagerUpdate::Set(5), &[5, 6]))
        .unwrap();
    assert_eq!(eng.id, 1);
    assert_eq!(dep_id(&store, 5), Some(1));

    let updated = service
        .update(1, &department("Eng", ManagerUpdate::Keep, &[6]))
        .unwrap();
    assert_eq!(updated.members, vec![6]);
    assert_eq!(updated.manager_id, None);
    assert_eq!(dep_id(&store, 5), None);
    assert_eq!(dep_id(&store, 6), Some(1));

    let kept = service
        .update(1, &department("Engineering", ManagerUpdate::Set(6), &[6]))
        .unwrap();
    assert_eq!(kept.manager_id, Some(6));
    let renamed = service
        .update(1, &department("Eng", ManagerUpdate::Keep, &[6]))
        .unwrap();
    assert_eq!(renamed.manager_id, Some(6));
}

#[test]
fn adding_a_member_pulls_it_out_of_its_previous_department() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    seed_employees(&store, &[5, 6]);
    let service = DepartmentService::new(store);

    let eng = service
        .create(&department("Eng", ManagerUpdate::Set(5), &[5, 6]))
        .unwrap();
    let ops = service
        .create(&department("Ops", ManagerUpdate::Set(5), &[5]))
        .unwrap();

    let eng: Department = store.get(eng.id).unwrap().unwrap();
    assert_eq!(eng.members, vec![6]);
    assert_eq!(eng.manager_id, None);
    assert_eq!(dep_id(&store, 5), Some(ops.id));

    let members = service.members(ops.id).unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].id, 5);
}

#[test]
fn update_pulls_in_another_departments_manager_and_drops_its_own() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    seed_employees(&store, &[5, 6, 7, 8]);
    let service = DepartmentService::new(store);

    let eng = service
        .create(&department("Eng", ManagerUpdate::Set(5), &[5, 6]))
        .unwrap();
    let ops = service
        .create(&department("Ops", ManagerUpdate::Set(7), &[7, 8]))
        .unwrap();

    // Eng takes Ops' manager 7 and lets its own manager 5 go.
    let updated = service
        .update(eng.id, &department("Eng", ManagerUpdate::Keep, &[6, 7]))
        .unwrap();
    assert_eq!(updated.members, vec![6, 7]);
    assert_eq!(updated.manager_id, None);

    let eng: Department = store.get(eng.id).unwrap().unwrap();
    assert_eq!(eng.members, vec![6, 7]);
    assert_eq!(eng.manager_id, None);
    let ops: Department = store.get(ops.id).unwrap().unwrap();
    assert_eq!(ops.members, vec![8]);
    assert_eq!(ops.manager_id, None);

    assert_eq!(dep_id(&store, 5), None);
    assert_eq!(dep_id(&store, 6), Some(eng.id));
    assert_eq!(dep_id(&store, 7), Some(eng.id));
    assert_eq!(dep_id(&store, 8), Some(ops.id));
    assert!(rosterlink_core::audit(&store).unwrap().is_consistent());
}

#[test]
fn unknown_members_are_rejected_before_any_write() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    seed_employees(&store, &[5]);
    let service = DepartmentService::new(store);

    match service
        .create(&department("Eng", ManagerUpdate::Keep, &[5, 8]))
        .unwrap_err()
    {
        EngineError::NotFound { ids, .. } => assert_eq!(ids, vec![8]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(dep_id(&store, 5), None);
    assert!(matches!(
        service
            .update(3, &department("Eng", ManagerUpdate::Keep, &[]))
            .unwrap_err(),
        EngineError::NotFound { .. }
    ));
}

#[test]
fn delete_releases_every_member() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    seed_employees(&store, &[5, 6]);
    let service = DepartmentService::new(store);

    let eng = service
        .create(&department("Eng", ManagerUpdate::Set(5), &[5, 6]))
        .unwrap();
    service.delete(eng.id).unwrap();

    assert!(service.get(eng.id).unwrap().is_none());
    assert_eq!(dep_id(&store, 5), None);
    assert_eq!(dep_id(&store, 6), None);

    let next = service
        .create(&department("Ops", ManagerUpdate::Clear, &[]))
        .unwrap();
    assert_eq!(next.id, eng.id + 1);
}

#[test]
fn form_input_maps_blank_manager_to_clear() {
    let input = DepartmentInput::from_form(" Eng ", " ", "5, 6,5").unwrap();
    assert_eq!(input.manager, ManagerUpdate::Clear);
    assert_eq!(input.members, vec![5, 6]);

    let input = DepartmentInput::from_form("Eng", "5", "5").unwrap();
    assert_eq!(input.manager, ManagerUpdate::Set(5));
    assert!(matches!(
        DepartmentInput::from_form("Eng", "", "5,x").unwrap_err(),
        EngineError::MalformedIdList { .. }
    ));
}

#[test]
fn page_builds_views_with_manager_and_member_names() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    seed_employees(&store, &[5, 6]);
    let service = DepartmentService::new(store);

    service
        .create(&department("Engineering", ManagerUpdate::Set(6), &[5, 6]))
        .unwrap();
    service
        .create(&department("Operations", ManagerUpdate::Clear, &[]))
        .unwrap();
    service
        .create(&department("Research", ManagerUpdate::Clear, &[]))
        .unwrap();

    let page = service.page("", 1, Some(2)).unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.total_pages(), 2);
    let first = &page.items[0];
    assert_eq!(first.name, "Engineering");
    assert_eq!(
        first.manager.as_ref().map(|manager| manager.name.as_str()),
        Some("Employee 6")
    );
    let names: Vec<&str> = first
        .members
        .iter()
        .map(|member| member.name.as_str())
        .collect();
    assert_eq!(names, vec!["Employee 5", "Employee 6"]);

    let filtered = service.page("OPER", 1, None).unwrap();
    assert_eq!(filtered.items.len(), 1);
    assert_eq!(filtered.items[0].name, "Operations");
    assert!(service.view(42).unwrap().is_none());
}
