//! Project document.

use crate::model::{impl_document, Collection, EntityId, MemberSet, Relation};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Project lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Planned,
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// Employee ids; mirrors `Employee::projects`.
    #[serde(default)]
    pub members: Vec<EntityId>,
    /// Skill ids the project asks for.
    #[serde(default)]
    pub required_skills: Vec<EntityId>,
    #[serde(skip)]
    pub version: u64,
}

impl Project {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: ProjectStatus::default(),
            start_date: None,
            members: Vec::new(),
            required_skills: Vec::new(),
            version: 0,
        }
    }
}

impl_document!(Project, Collection::Projects);

impl MemberSet for Project {
    const RELATION: Relation = Relation::Project;

    fn members(&self) -> &[EntityId] {
        &self.members
    }

    fn members_mut(&mut self) -> &mut Vec<EntityId> {
        &mut self.members
    }
}
