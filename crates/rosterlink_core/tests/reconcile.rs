use rosterlink_core::db::open_db_in_memory;
use rosterlink_core::reconcile::{
    managed_task_ids, migrate_members, reconcile_department, reconcile_members,
    reconcile_task_managers, ReconcileError,
};
use rosterlink_core::{
    Collection, Department, Employee, EntityStore, Project, Relation, SqliteStore, Task, Training,
};

fn seed_projects(store: &SqliteStore<'_>, ids: &[i64]) {
    for id in ids {
        store
            .save(&mut Project::new(*id, format!("Project {id}")))
            .unwrap();
    }
}

fn members<T: rosterlink_core::MemberSet>(store: &SqliteStore<'_>, id: i64) -> Vec<i64> {
    store.get::<T>(id).unwrap().unwrap().members().to_vec()
}

#[test]
fn added_and_removed_targets_are_updated() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    seed_projects(&store, &[1, 2, 3]);

    let report = reconcile_members::<_, Project>(&store, 7, &[], &[1, 2]).unwrap();
    assert_eq!(report.relation, Relation::Project);
    assert_eq!(report.added, vec![1, 2]);
    assert_eq!(report.writes, 2);
    assert_eq!(members::<Project>(&store, 1), vec![7]);

    let report = reconcile_members::<_, Project>(&store, 7, &[1, 2], &[2, 3]).unwrap();
    assert_eq!(report.added, vec![3]);
    assert_eq!(report.removed, vec![1]);
    assert!(members::<Project>(&store, 1).is_empty());
    assert_eq!(members::<Project>(&store, 2), vec![7]);
    assert_eq!(members::<Project>(&store, 3), vec![7]);
}

#[test]
fn reconciling_to_the_same_set_writes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    seed_projects(&store, &[1, 2]);

    reconcile_members::<_, Project>(&store, 7, &[], &[1, 2]).unwrap();
    let version_before = store.get::<Project>(1).unwrap().unwrap().version;

    let again = reconcile_members::<_, Project>(&store, 7, &[1, 2], &[2, 1]).unwrap();
    assert_eq!(again.writes, 0);
    assert!(again.added.is_empty() && again.removed.is_empty());

    // Target already lists the owner: ensure-present is a no-op.
    let healed = reconcile_members::<_, Project>(&store, 7, &[], &[1]).unwrap();
    assert_eq!(healed.added, vec![1]);
    assert_eq!(healed.writes, 0);
    assert_eq!(
        store.get::<Project>(1).unwrap().unwrap().version,
        version_before
    );
}

#[test]
fn missing_added_target_fails_before_any_write() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    seed_projects(&store, &[1]);
    let mut training = Training::new(4, "Onboarding");
    training.members = vec![7];
    store.save(&mut training).unwrap();

    let err = reconcile_members::<_, Training>(&store, 7, &[4], &[5, 6]).unwrap_err();
    match err {
        ReconcileError::NotFound { collection, ids } => {
            assert_eq!(collection, Collection::Trainings);
            assert_eq!(ids, vec![5, 6]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(members::<Training>(&store, 4), vec![7]);
}

#[test]
fn missing_removed_target_is_skipped() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    seed_projects(&store, &[2]);

    let report = reconcile_members::<_, Project>(&store, 7, &[9], &[2]).unwrap();
    assert_eq!(report.skipped, vec![9]);
    assert_eq!(report.writes, 1);
    assert_eq!(members::<Project>(&store, 2), vec![7]);
}

#[test]
fn moving_departments_clears_old_membership_and_manager() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();

    let mut old = Department::new(1, "Eng");
    old.members = vec![5, 6];
    old.manager_id = Some(5);
    store.save(&mut old).unwrap();
    store.save(&mut Department::new(2, "Ops")).unwrap();

    reconcile_department(&store, 5, Some(1), Some(2)).unwrap();

    let old: Department = store.get(1).unwrap().unwrap();
    assert_eq!(old.members, vec![6]);
    assert_eq!(old.manager_id, None);
    let new: Department = store.get(2).unwrap().unwrap();
    assert_eq!(new.members, vec![5]);
}

#[test]
fn moving_out_of_a_deleted_department_still_succeeds() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    store.save(&mut Department::new(2, "Ops")).unwrap();

    let report = reconcile_department(&store, 5, Some(1), Some(2)).unwrap();
    assert_eq!(report.skipped, vec![1]);
    assert_eq!(members::<Department>(&store, 2), vec![5]);
}

#[test]
fn migrate_members_moves_employees_between_departments() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();

    let mut from = Department::new(1, "Eng");
    from.members = vec![5];
    from.manager_id = Some(5);
    store.save(&mut from).unwrap();
    let mut to = Department::new(2, "Ops");
    to.members = vec![6];
    store.save(&mut to).unwrap();

    let mut ann = Employee::new(5, "Ann");
    ann.dep_id = Some(1);
    let mut bob = Employee::new(6, "Bob");
    bob.dep_id = Some(2);
    store.save(&mut ann).unwrap();
    store.save(&mut bob).unwrap();

    let report = migrate_members(&store, 2, &[6], &[5]).unwrap();
    assert_eq!(report.added, vec![5]);
    assert_eq!(report.removed, vec![6]);
    assert_eq!(report.migrated, vec![(5, 1)]);

    let from: Department = store.get(1).unwrap().unwrap();
    assert!(from.members.is_empty());
    assert_eq!(from.manager_id, None);
    assert_eq!(store.get::<Employee>(5).unwrap().unwrap().dep_id, Some(2));
    assert_eq!(store.get::<Employee>(6).unwrap().unwrap().dep_id, None);
}

#[test]
fn migrate_members_leaves_employees_pointing_elsewhere() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();

    let mut ann = Employee::new(5, "Ann");
    ann.dep_id = Some(3);
    store.save(&mut ann).unwrap();

    let report = migrate_members(&store, 2, &[5], &[]).unwrap();
    assert_eq!(report.writes, 0);
    assert_eq!(store.get::<Employee>(5).unwrap().unwrap().dep_id, Some(3));

    let err = migrate_members(&store, 2, &[], &[5, 8]).unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::NotFound {
            collection: Collection::Employees,
            ..
        }
    ));
    assert_eq!(store.get::<Employee>(5).unwrap().unwrap().dep_id, Some(3));
}

#[test]
fn task_managers_are_released_and_reassigned() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    for (id, manager_id) in [(1, Some(5)), (2, Some(5)), (3, Some(6)), (4, None)] {
        let mut task = Task::new(id, format!("Task {id}"));
        task.manager_id = manager_id;
        store.save(&mut task).unwrap();
    }

    let report = reconcile_task_managers(&store, 5, &[2, 3, 4]).unwrap();
    assert_eq!(report.relation, Relation::TaskManager);
    assert_eq!(report.added, vec![3, 4]);
    assert_eq!(report.removed, vec![1]);
    assert_eq!(report.writes, 3);

    assert_eq!(store.get::<Task>(1).unwrap().unwrap().manager_id, None);
    assert_eq!(managed_task_ids(&store, 5).unwrap(), vec![2, 3, 4]);
    assert!(managed_task_ids(&store, 6).unwrap().is_empty());

    let again = reconcile_task_managers(&store, 5, &[4, 3, 2]).unwrap();
    assert_eq!(again.writes, 0);
}

#[test]
fn missing_task_fails_before_any_manager_changes() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    let mut task = Task::new(1, "Task 1");
    task.manager_id = Some(5);
    store.save(&mut task).unwrap();

    let err = reconcile_task_managers(&store, 5, &[7]).unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::NotFound {
            collection: Collection::Tasks,
            ..
        }
    ));
    assert_eq!(managed_task_ids(&store, 5).unwrap(), vec![1]);
}
