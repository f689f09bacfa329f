//! Task document.
//!
//! # Invariants
//! - `manager_id` is single valued and owned by the task. Employees do not
//!   store the tasks they manage; the employee side is derived by querying
//!   tasks on `managerId`.

use crate::model::{impl_document, Collection, EntityId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Open,
    InProgress,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub project_id: Option<EntityId>,
    /// Responsible employee.
    #[serde(default)]
    pub manager_id: Option<EntityId>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(skip)]
    pub version: u64,
}

impl Task {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            project_id: None,
            manager_id: None,
            status: TaskStatus::default(),
            version: 0,
        }
    }
}

impl_document!(Task, Collection::Tasks);
