//! Read-only integrity audit of the redundant relationship fields.
//!
//! # Responsibility
//! - Report every edge that is recorded on only one side.
//! - Report references to documents that no longer exist.
//! - Report department managers outside their member set.
//! - Report tasks managed by, or filed under, documents that are gone.
//!
//! # Invariants
//! - The audit never writes. Divergences are repaired by the next service
//!   write touching the affected employee or department.

use crate::model::department::Department;
use crate::model::employee::Employee;
use crate::model::project::Project;
use crate::model::skill::Skill;
use crate::model::task::Task;
use crate::model::training::Training;
use crate::model::{Collection, Document, EntityId, MemberSet, Relation};
use crate::repo::document_repo::{EntityStore, RepoResult};
use log::{info, warn};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// One inconsistency found by [`audit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Divergence {
    /// The employee references the target but the target does not list it.
    MissingBackReference {
        relation: Relation,
        employee_id: EntityId,
        target_id: EntityId,
    },
    /// The target lists the employee but the employee does not reference it.
    MissingForwardReference {
        relation: Relation,
        employee_id: EntityId,
        target_id: EntityId,
    },
    /// A document references an id that has no document.
    DanglingReference {
        holder: Collection,
        holder_id: EntityId,
        missing: Collection,
        missing_id: EntityId,
    },
    ManagerNotMember {
        department_id: EntityId,
        manager_id: EntityId,
    },
    /// More than one department lists the employee.
    MultipleDepartments {
        employee_id: EntityId,
        department_ids: Vec<EntityId>,
    },
}

impl Display for Divergence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingBackReference {
                relation,
                employee_id,
                target_id,
            } => write!(
                f,
                "{relation}: employee {employee_id} references {target_id}, which does not list it"
            ),
            Self::MissingForwardReference {
                relation,
                employee_id,
                target_id,
            } => write!(
                f,
                "{relation}: {target_id} lists employee {employee_id}, which does not reference it"
            ),
            Self::DanglingReference {
                holder,
                holder_id,
                missing,
                missing_id,
            } => write!(
                f,
                "{} {holder_id} references missing {} {missing_id}",
                holder.entity_name(),
                missing.entity_name()
            ),
            Self::ManagerNotMember {
                department_id,
                manager_id,
            } => write!(
                f,
                "department {department_id} is managed by non-member {manager_id}"
            ),
            Self::MultipleDepartments {
                employee_id,
                department_ids,
            } => write!(
                f,
                "employee {employee_id} is listed by departments {department_ids:?}"
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub divergences: Vec<Divergence>,
    /// Documents scanned per collection.
    pub scanned: BTreeMap<Collection, usize>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.divergences.is_empty()
    }
}

/// Scans every collection and reports relationship divergences.
pub fn audit<S: EntityStore>(store: &S) -> RepoResult<AuditReport> {
    let employees = load_map::<S, Employee>(store)?;
    let departments = load_map::<S, Department>(store)?;
    let projects = load_map::<S, Project>(store)?;
    let trainings = load_map::<S, Training>(store)?;
    let skills = load_map::<S, Skill>(store)?;
    let tasks = load_map::<S, Task>(store)?;

    let mut report = AuditReport::default();
    report.scanned.insert(Collection::Employees, employees.len());
    report.scanned.insert(Collection::Departments, departments.len());
    report.scanned.insert(Collection::Projects, projects.len());
    report.scanned.insert(Collection::Trainings, trainings.len());
    report.scanned.insert(Collection::Skills, skills.len());
    report.scanned.insert(Collection::Tasks, tasks.len());

    let divergences = &mut report.divergences;
    for employee in employees.values() {
        let department_ids: Vec<EntityId> = employee.dep_id.into_iter().collect();
        check_forward(divergences, employee.id, &department_ids, &departments);
        check_forward(divergences, employee.id, &employee.projects, &projects);
        check_forward(divergences, employee.id, &employee.trainings, &trainings);

        for skill_id in employee.skill_ids() {
            if !skills.contains_key(&skill_id) {
                divergences.push(Divergence::DanglingReference {
                    holder: Collection::Employees,
                    holder_id: employee.id,
                    missing: Collection::Skills,
                    missing_id: skill_id,
                });
            }
        }

        let listing: Vec<EntityId> = departments
            .values()
            .filter(|department| department.members.contains(&employee.id))
            .map(|department| department.id)
            .collect();
        if listing.len() > 1 {
            divergences.push(Divergence::MultipleDepartments {
                employee_id: employee.id,
                department_ids: listing,
            });
        }
    }

    check_backward(divergences, &departments, &employees, |employee| {
        employee.dep_id.into_iter().collect()
    });
    check_backward(divergences, &projects, &employees, |employee| {
        employee.projects.clone()
    });
    check_backward(divergences, &trainings, &employees, |employee| {
        employee.trainings.clone()
    });

    for department in departments.values() {
        if let Some(manager_id) = department.manager_id {
            if !department.members.contains(&manager_id) {
                divergences.push(Divergence::ManagerNotMember {
                    department_id: department.id,
                    manager_id,
                });
            }
        }
    }
    for project in projects.values() {
        for skill_id in &project.required_skills {
            if !skills.contains_key(skill_id) {
                divergences.push(Divergence::DanglingReference {
                    holder: Collection::Projects,
                    holder_id: project.id,
                    missing: Collection::Skills,
                    missing_id: *skill_id,
                });
            }
        }
    }
    for training in trainings.values() {
        if let Some(skill_id) = training.skill_id.filter(|id| !skills.contains_key(id)) {
            divergences.push(Divergence::DanglingReference {
                holder: Collection::Trainings,
                holder_id: training.id,
                missing: Collection::Skills,
                missing_id: skill_id,
            });
        }
    }

    for task in tasks.values() {
        if let Some(manager_id) = task.manager_id.filter(|id| !employees.contains_key(id)) {
            divergences.push(Divergence::DanglingReference {
                holder: Collection::Tasks,
                holder_id: task.id,
                missing: Collection::Employees,
                missing_id: manager_id,
            });
        }
        if let Some(project_id) = task.project_id.filter(|id| !projects.contains_key(id)) {
            divergences.push(Divergence::DanglingReference {
                holder: Collection::Tasks,
                holder_id: task.id,
                missing: Collection::Projects,
                missing_id: project_id,
            });
        }
    }

    for divergence in &report.divergences {
        warn!(
            "event=audit_divergence module=audit status=error detail=\"{}\"",
            divergence
        );
    }
    info!(
        "event=audit module=audit status=ok divergences={} employees={} departments={}",
        report.divergences.len(),
        employees.len(),
        departments.len()
    );
    Ok(report)
}

fn load_map<S: EntityStore, T: Document>(store: &S) -> RepoResult<BTreeMap<EntityId, T>> {
    Ok(store
        .list::<T>()?
        .into_iter()
        .map(|doc| (doc.id(), doc))
        .collect())
}

/// Employee side: every referenced target exists and lists the employee.
fn check_forward<T: MemberSet>(
    divergences: &mut Vec<Divergence>,
    employee_id: EntityId,
    referenced: &[EntityId],
    targets: &BTreeMap<EntityId, T>,
) {
    for target_id in referenced {
        match targets.get(target_id) {
            None => divergences.push(Divergence::DanglingReference {
                holder: Collection::Employees,
                holder_id: employee_id,
                missing: T::COLLECTION,
                missing_id: *target_id,
            }),
            Some(target) if !target.members().contains(&employee_id) => {
                divergences.push(Divergence::MissingBackReference {
                    relation: T::RELATION,
                    employee_id,
                    target_id: *target_id,
                })
            }
            Some(_) => {}
        }
    }
}

/// Target side: every listed member exists and references the target.
fn check_backward<T: MemberSet>(
    divergences: &mut Vec<Divergence>,
    targets: &BTreeMap<EntityId, T>,
    employees: &BTreeMap<EntityId, Employee>,
    references_of: impl Fn(&Employee) -> Vec<EntityId>,
) {
    for target in targets.values() {
        for member in target.members() {
            match employees.get(member) {
                None => divergences.push(Divergence::DanglingReference {
                    holder: T::COLLECTION,
                    holder_id: target.id(),
                    missing: Collection::Employees,
                    missing_id: *member,
                }),
                Some(employee) if !references_of(employee).contains(&target.id()) => {
                    divergences.push(Divergence::MissingForwardReference {
                        relation: T::RELATION,
                        employee_id: *member,
                        target_id: target.id(),
                    })
                }
                Some(_) => {}
            }
        }
    }
}
