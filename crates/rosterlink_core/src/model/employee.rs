//! Employee document.
//!
//! # Invariants
//! - `dep_id`, when set, names the single department whose member set
//!   contains this employee.
//! - `projects` and `trainings` mirror the member sets of those documents.
//! - `skills` holds at most one entry per skill id, proficiency in `1..=5`.

use crate::model::{impl_document, Collection, EntityId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const MIN_PROFICIENCY: u8 = 1;
pub const MAX_PROFICIENCY: u8 = 5;

/// One skill held by an employee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillLevel {
    pub skill_id: EntityId,
    pub proficiency: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub join_date: Option<NaiveDate>,
    #[serde(default)]
    pub dep_id: Option<EntityId>,
    #[serde(default)]
    pub skills: Vec<SkillLevel>,
    #[serde(default)]
    pub projects: Vec<EntityId>,
    #[serde(default)]
    pub trainings: Vec<EntityId>,
    #[serde(skip)]
    pub version: u64,
}

impl Employee {
    /// Creates an unsaved employee with no relationships.
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            join_date: None,
            dep_id: None,
            skills: Vec::new(),
            projects: Vec::new(),
            trainings: Vec::new(),
            version: 0,
        }
    }

    pub fn skill_ids(&self) -> Vec<EntityId> {
        self.skills.iter().map(|level| level.skill_id).collect()
    }
}

impl_document!(Employee, Collection::Employees);
