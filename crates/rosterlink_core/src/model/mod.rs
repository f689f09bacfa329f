//! Roster domain model.
//!
//! # Responsibility
//! - Define the six document types stored by the engine.
//! - Describe which documents hold back-reference member sets.
//! - Mark the reference data that may be stored without reconciliation.
//!
//! # Invariants
//! - Every document is identified by a positive integer `EntityId`.
//! - Relationship fields are stored on both sides and kept in sync by
//!   `crate::reconcile`, never by the storage layer.
//! - `version` is storage metadata and is never serialized into the body.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{Display, Formatter};

pub mod department;
pub mod employee;
pub mod project;
pub mod skill;
pub mod task;
pub mod training;

/// Integer primary key shared by every collection.
pub type EntityId = i64;

/// Storage collection, one per document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Employees,
    Departments,
    Projects,
    Trainings,
    Skills,
    Tasks,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Employees,
        Collection::Departments,
        Collection::Projects,
        Collection::Trainings,
        Collection::Skills,
        Collection::Tasks,
    ];

    /// Backing table name.
    pub fn table_name(self) -> &'static str {
        match self {
            Self::Employees => "employees",
            Self::Departments => "departments",
            Self::Projects => "projects",
            Self::Trainings => "trainings",
            Self::Skills => "skills",
            Self::Tasks => "tasks",
        }
    }

    /// Singular entity label used in errors and logs.
    pub fn entity_name(self) -> &'static str {
        match self {
            Self::Employees => "employee",
            Self::Departments => "department",
            Self::Projects => "project",
            Self::Trainings => "training",
            Self::Skills => "skill",
            Self::Tasks => "task",
        }
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table_name())
    }
}

/// A JSON document persisted in one collection.
pub trait Document: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    fn id(&self) -> EntityId;
    fn set_id(&mut self, id: EntityId);
    fn name(&self) -> &str;

    /// Storage version observed when this document was loaded or last saved.
    ///
    /// `0` means the document has never been persisted through this handle.
    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);
}

/// Employee relationship kept redundantly on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// `Employee::dep_id` <-> `Department::members`.
    Department,
    /// `Employee::projects` <-> `Project::members`.
    Project,
    /// `Employee::trainings` <-> `Training::members`.
    Training,
    /// `Task::manager_id`, derived on the employee side.
    TaskManager,
}

impl Display for Relation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Department => "employee-department",
            Self::Project => "employee-project",
            Self::Training => "employee-training",
            Self::TaskManager => "employee-task",
        })
    }
}

/// Document that keeps a back-reference set of employee ids.
pub trait MemberSet: Document {
    const RELATION: Relation;

    fn members(&self) -> &[EntityId];
    fn members_mut(&mut self) -> &mut Vec<EntityId>;

    /// Hook run after `member` left the set.
    fn on_member_removed(&mut self, _member: EntityId) {}
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::skill::Skill {}
    impl Sealed for super::project::Project {}
    impl Sealed for super::training::Training {}
    impl Sealed for super::task::Task {}
}

/// Document that may be stored directly, outside the aggregate services.
///
/// Implemented for skills, projects, trainings and tasks only. Departments
/// and employees always go through their services.
pub trait ReferenceData: Document + Clone + sealed::Sealed {
    /// Employee ids this document links to. These edges are owned by the
    /// employee use cases.
    fn employee_links(&self) -> Vec<EntityId>;
}

impl ReferenceData for skill::Skill {
    fn employee_links(&self) -> Vec<EntityId> {
        Vec::new()
    }
}

impl ReferenceData for project::Project {
    fn employee_links(&self) -> Vec<EntityId> {
        self.members.clone()
    }
}

impl ReferenceData for training::Training {
    fn employee_links(&self) -> Vec<EntityId> {
        self.members.clone()
    }
}

impl ReferenceData for task::Task {
    fn employee_links(&self) -> Vec<EntityId> {
        self.manager_id.into_iter().collect()
    }
}

macro_rules! impl_document {
    ($ty:ty, $collection:expr) => {
        impl $crate::model::Document for $ty {
            const COLLECTION: $crate::model::Collection = $collection;

            fn id(&self) -> $crate::model::EntityId {
                self.id
            }

            fn set_id(&mut self, id: $crate::model::EntityId) {
                self.id = id;
            }

            fn name(&self) -> &str {
                self.name.as_str()
            }

            fn version(&self) -> u64 {
                self.version
            }

            fn set_version(&mut self, version: u64) {
                self.version = version;
            }
        }
    };
}

pub(crate) use impl_document;
