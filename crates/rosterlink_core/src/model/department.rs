//! Department document.
//!
//! # Invariants
//! - `manager_id`, when set, is an element of `members`.
//! - Removing the manager from `members` clears `manager_id`.

use crate::model::{impl_document, Collection, EntityId, MemberSet, Relation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub manager_id: Option<EntityId>,
    #[serde(default)]
    pub members: Vec<EntityId>,
    #[serde(skip)]
    pub version: u64,
}

impl Department {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            manager_id: None,
            members: Vec::new(),
            version: 0,
        }
    }
}

impl_document!(Department, Collection::Departments);

impl MemberSet for Department {
    const RELATION: Relation = Relation::Department;

    fn members(&self) -> &[EntityId] {
        &self.members
    }

    fn members_mut(&mut self) -> &mut Vec<EntityId> {
        &mut self.members
    }

    fn on_member_removed(&mut self, member: EntityId) {
        if self.manager_id == Some(member) {
            self.manager_id = None;
        }
    }
}
