//! Pure set arithmetic and idempotent edge primitives.

use crate::model::{EntityId, MemberSet};
use std::collections::HashSet;

/// Difference between an old and a new relationship set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetDiff {
    /// In `new` but not in `old`, in `new` order.
    pub added: Vec<EntityId>,
    /// In `old` but not in `new`, in `old` order.
    pub removed: Vec<EntityId>,
}

impl SetDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Computes `added = new - old` and `removed = old - new`.
///
/// Duplicates on either side are ignored.
pub fn diff(old: &[EntityId], new: &[EntityId]) -> SetDiff {
    let old_set: HashSet<EntityId> = old.iter().copied().collect();
    let new_set: HashSet<EntityId> = new.iter().copied().collect();

    SetDiff {
        added: dedup_ids(new)
            .into_iter()
            .filter(|id| !old_set.contains(id))
            .collect(),
        removed: dedup_ids(old)
            .into_iter()
            .filter(|id| !new_set.contains(id))
            .collect(),
    }
}

/// Drops repeated ids, keeping the first occurrence.
pub fn dedup_ids(ids: &[EntityId]) -> Vec<EntityId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Adds `member` unless already present. Returns whether `doc` changed.
pub fn ensure_present<T: MemberSet>(doc: &mut T, member: EntityId) -> bool {
    if doc.members().contains(&member) {
        return false;
    }
    doc.members_mut().push(member);
    true
}

/// Removes every occurrence of `member`. Returns whether `doc` changed.
///
/// Runs the document's removal hook, so a department loses its manager here.
pub fn ensure_absent<T: MemberSet>(doc: &mut T, member: EntityId) -> bool {
    let before = doc.members().len();
    doc.members_mut().retain(|existing| *existing != member);
    if doc.members().len() == before {
        return false;
    }
    doc.on_member_removed(member);
    true
}

/// Converts a single-valued reference into a zero/one element set.
pub fn option_set(value: Option<EntityId>) -> Vec<EntityId> {
    value.into_iter().collect()
}
