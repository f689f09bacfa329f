//! Relationship reconciliation between employees and their back-references.
//!
//! # Responsibility
//! - Diff an owner's old and new relationship sets.
//! - Issue the paired writes that keep the other side's member sets in sync.
//! - Move employees between departments (second-order reconciliation).
//! - Hand tasks to and from their managing employee.
//!
//! # Invariants
//! - Every added target is verified to exist before the first write.
//! - Targets are only written when their member set actually changed, so
//!   reconciling a set to itself issues no writes.
//! - A removed target that no longer exists is logged and skipped; the
//!   reference was already orphaned.
//! - The caller persists the owner's own relationship field last.
//!
//! Writes are independent per document. Without an enclosing storage
//! transaction a failure mid-cascade leaves earlier writes applied; the
//! returned `Cascade` error names the relation and both ids so the damage can
//! be located.

use crate::model::department::Department;
use crate::model::employee::Employee;
use crate::model::task::Task;
use crate::model::{Collection, Document, EntityId, MemberSet, Relation};
use crate::repo::document_repo::{EntityStore, RepoError};
use crate::repo::query::FieldUpdates;
use log::{info, warn};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod diff;

pub use diff::{dedup_ids, diff, ensure_absent, ensure_present, option_set, SetDiff};

pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[derive(Debug)]
pub enum ReconcileError {
    /// Requested targets do not exist. Raised before any write.
    NotFound {
        collection: Collection,
        ids: Vec<EntityId>,
    },
    /// A write for one edge failed after earlier writes were issued.
    Cascade {
        relation: Relation,
        owner_id: EntityId,
        target_id: EntityId,
        source: RepoError,
    },
    /// Read failure before any write.
    Repo(RepoError),
}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { collection, ids } => {
                write!(f, "{} not found: {ids:?}", collection.entity_name())
            }
            Self::Cascade {
                relation,
                owner_id,
                target_id,
                source,
            } => write!(
                f,
                "{relation} cascade failed for employee {owner_id} at target {target_id}: {source}"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ReconcileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotFound { .. } => None,
            Self::Cascade { source, .. } => Some(source),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for ReconcileError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub relation: Relation,
    pub owner_id: EntityId,
    pub added: Vec<EntityId>,
    pub removed: Vec<EntityId>,
    /// Removed targets that were already gone.
    pub skipped: Vec<EntityId>,
    /// Documents written on the other side.
    pub writes: usize,
}

impl ReconcileReport {
    fn new(relation: Relation, owner_id: EntityId, diff: SetDiff) -> Self {
        Self {
            relation,
            owner_id,
            added: diff.added,
            removed: diff.removed,
            skipped: Vec::new(),
            writes: 0,
        }
    }
}

/// Brings every `T` member set in line with `owner_id`'s new relationship set.
///
/// `old` is what the owner was associated with, `new` what it should be
/// associated with afterwards.
pub fn reconcile_members<S, T>(
    store: &S,
    owner_id: EntityId,
    old: &[EntityId],
    new: &[EntityId],
) -> ReconcileResult<ReconcileReport>
where
    S: EntityStore,
    T: MemberSet,
{
    let relation = T::RELATION;
    let mut report = ReconcileReport::new(relation, owner_id, diff(old, new));
    if report.added.is_empty() && report.removed.is_empty() {
        return Ok(report);
    }

    let mut added_targets = load_all::<S, T>(store, &report.added)?;

    for target_id in report.removed.clone() {
        let cascade = |source| ReconcileError::Cascade {
            relation,
            owner_id,
            target_id,
            source,
        };
        let Some(mut target) = store.get::<T>(target_id).map_err(cascade)? else {
            warn!(
                "event=reconcile_remove module=reconcile status=skip relation={} owner_id={} target_id={} reason=target_missing",
                relation, owner_id, target_id
            );
            report.skipped.push(target_id);
            continue;
        };
        if ensure_absent(&mut target, owner_id) {
            store.save(&mut target).map_err(cascade)?;
            report.writes += 1;
        }
    }

    for target_id in report.added.clone() {
        let cascade = |source| ReconcileError::Cascade {
            relation,
            owner_id,
            target_id,
            source,
        };
        let Some(target) = added_targets.get_mut(&target_id) else {
            continue;
        };
        if ensure_present(target, owner_id) {
            store.save(target).map_err(cascade)?;
            report.writes += 1;
        }
    }

    info!(
        "event=reconcile module=reconcile status=ok relation={} owner_id={} added={:?} removed={:?} writes={}",
        relation, owner_id, report.added, report.removed, report.writes
    );
    Ok(report)
}

/// Single-valued `Employee::dep_id` reconciliation.
///
/// Moving always strips the employee from the old department, clearing its
/// manager when needed, even if the new department is the only one that
/// exists.
pub fn reconcile_department<S: EntityStore>(
    store: &S,
    employee_id: EntityId,
    old_dep: Option<EntityId>,
    new_dep: Option<EntityId>,
) -> ReconcileResult<ReconcileReport> {
    reconcile_members::<S, Department>(
        store,
        employee_id,
        &option_set(old_dep),
        &option_set(new_dep),
    )
}

/// Outcome of moving employees in and out of one department.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub department_id: EntityId,
    pub added: Vec<EntityId>,
    pub removed: Vec<EntityId>,
    /// `(employee_id, previous_department_id)` for cross-department moves.
    pub migrated: Vec<(EntityId, EntityId)>,
    pub writes: usize,
}

/// Reconciles a department's member set from `old` to `new` on the employee
/// side.
///
/// Removed members lose their `dep_id` if it still points here. Added members
/// that belong to another department are first removed from it (clearing its
/// manager if they managed it), then pointed at `department_id`.
pub fn migrate_members<S: EntityStore>(
    store: &S,
    department_id: EntityId,
    old: &[EntityId],
    new: &[EntityId],
) -> ReconcileResult<MigrationReport> {
    let SetDiff { added, removed } = diff(old, new);
    let mut report = MigrationReport {
        department_id,
        added,
        removed,
        ..MigrationReport::default()
    };
    if report.added.is_empty() && report.removed.is_empty() {
        return Ok(report);
    }

    let added_employees = load_all::<S, Employee>(store, &report.added)?;

    for employee_id in report.removed.clone() {
        let cascade = |source| ReconcileError::Cascade {
            relation: Relation::Department,
            owner_id: employee_id,
            target_id: department_id,
            source,
        };
        let Some(employee) = store.get::<Employee>(employee_id).map_err(cascade)? else {
            warn!(
                "event=department_release module=reconcile status=skip department_id={} employee_id={} reason=employee_missing",
                department_id, employee_id
            );
            continue;
        };
        if employee.dep_id != Some(department_id) {
            continue;
        }
        store
            .update_fields::<Employee>(employee_id, &dep_id_update(None))
            .map_err(cascade)?;
        report.writes += 1;
    }

    for employee_id in report.added.clone() {
        let Some(employee) = added_employees.get(&employee_id) else {
            continue;
        };

        if let Some(previous) = employee.dep_id.filter(|dep| *dep != department_id) {
            let cascade = |source| ReconcileError::Cascade {
                relation: Relation::Department,
                owner_id: employee_id,
                target_id: previous,
                source,
            };
            match store.get::<Department>(previous).map_err(cascade)? {
                Some(mut previous_department) => {
                    if ensure_absent(&mut previous_department, employee_id) {
                        store.save(&mut previous_department).map_err(cascade)?;
                        report.writes += 1;
                    }
                }
                None => warn!(
                    "event=department_migrate module=reconcile status=skip employee_id={} previous_department_id={} reason=department_missing",
                    employee_id, previous
                ),
            }
            report.migrated.push((employee_id, previous));
            info!(
                "event=department_migrate module=reconcile status=ok employee_id={} from={} to={}",
                employee_id, previous, department_id
            );
        }

        if employee.dep_id != Some(department_id) {
            store
                .update_fields::<Employee>(employee_id, &dep_id_update(Some(department_id)))
                .map_err(|source| ReconcileError::Cascade {
                    relation: Relation::Department,
                    owner_id: employee_id,
                    target_id: department_id,
                    source,
                })?;
            report.writes += 1;
        }
    }

    Ok(report)
}

/// Ids of the tasks currently managed by `employee_id`.
pub fn managed_task_ids<S: EntityStore>(
    store: &S,
    employee_id: EntityId,
) -> ReconcileResult<Vec<EntityId>> {
    Ok(store
        .list::<Task>()?
        .into_iter()
        .filter(|task| task.manager_id == Some(employee_id))
        .map(|task| task.id)
        .collect())
}

/// Single-valued `Task::manager_id` reconciliation for one employee.
///
/// The old side is read from the tasks themselves. Removed tasks lose their
/// manager. Added tasks are handed to `employee_id`, replacing any previous
/// manager.
pub fn reconcile_task_managers<S: EntityStore>(
    store: &S,
    employee_id: EntityId,
    new: &[EntityId],
) -> ReconcileResult<ReconcileReport> {
    let relation = Relation::TaskManager;
    let old = managed_task_ids(store, employee_id)?;
    let mut report = ReconcileReport::new(relation, employee_id, diff(&old, new));
    if report.added.is_empty() && report.removed.is_empty() {
        return Ok(report);
    }

    let added_tasks = load_all::<S, Task>(store, &report.added)?;

    for task_id in report.removed.clone() {
        store
            .update_fields::<Task>(task_id, &manager_id_update(None))
            .map_err(|source| ReconcileError::Cascade {
                relation,
                owner_id: employee_id,
                target_id: task_id,
                source,
            })?;
        report.writes += 1;
    }

    for task_id in report.added.clone() {
        let Some(task) = added_tasks.get(&task_id) else {
            continue;
        };
        if let Some(previous) = task.manager_id {
            info!(
                "event=task_reassign module=reconcile status=ok task_id={} from={} to={}",
                task_id, previous, employee_id
            );
        }
        store
            .update_fields::<Task>(task_id, &manager_id_update(Some(employee_id)))
            .map_err(|source| ReconcileError::Cascade {
                relation,
                owner_id: employee_id,
                target_id: task_id,
                source,
            })?;
        report.writes += 1;
    }

    info!(
        "event=reconcile module=reconcile status=ok relation={} owner_id={} added={:?} removed={:?} writes={}",
        relation, employee_id, report.added, report.removed, report.writes
    );
    Ok(report)
}

/// Verifies every id in `ids` exists, then returns the loaded documents.
fn load_all<S, T>(store: &S, ids: &[EntityId]) -> ReconcileResult<HashMap<EntityId, T>>
where
    S: EntityStore,
    T: Document,
{
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let found: HashMap<EntityId, T> = store
        .get_many::<T>(ids)?
        .into_iter()
        .map(|doc| (doc.id(), doc))
        .collect();
    if found.len() != ids.len() {
        let missing: Vec<EntityId> = ids
            .iter()
            .copied()
            .filter(|id| !found.contains_key(id))
            .collect();
        return Err(ReconcileError::NotFound {
            collection: T::COLLECTION,
            ids: missing,
        });
    }
    Ok(found)
}

fn dep_id_update(dep_id: Option<EntityId>) -> FieldUpdates {
    FieldUpdates::new().set("depId", json!(dep_id))
}

fn manager_id_update(manager_id: Option<EntityId>) -> FieldUpdates {
    FieldUpdates::new().set("managerId", json!(manager_id))
}
