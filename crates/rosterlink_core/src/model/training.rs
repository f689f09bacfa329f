//! Training document.

use crate::model::{impl_document, Collection, EntityId, MemberSet, Relation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Training {
    pub id: EntityId,
    pub name: String,
    /// Skill the training teaches.
    #[serde(default)]
    pub skill_id: Option<EntityId>,
    /// Employee ids; mirrors `Employee::trainings`.
    #[serde(default)]
    pub members: Vec<EntityId>,
    #[serde(skip)]
    pub version: u64,
}

impl Training {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            skill_id: None,
            members: Vec::new(),
            version: 0,
        }
    }
}

impl_document!(Training, Collection::Trainings);

impl MemberSet for Training {
    const RELATION: Relation = Relation::Training;

    fn members(&self) -> &[EntityId] {
        &self.members
    }

    fn members_mut(&mut self) -> &mut Vec<EntityId> {
        &mut self.members
    }
}
