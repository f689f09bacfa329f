//! Skill lookup document. Referenced by id, never holds back-links.

use crate::model::{impl_document, Collection, EntityId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: EntityId,
    pub name: String,
    #[serde(skip)]
    pub version: u64,
}

impl Skill {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            version: 0,
        }
    }
}

impl_document!(Skill, Collection::Skills);
