//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate validation, id allocation and reconciliation into use-case
//!   level APIs.
//! - Keep presentation callers decoupled from storage details.
//!
//! # Invariants
//! - Validation runs before the first write of every mutating use case.
//! - The aggregate's own document is persisted last.

use crate::db::DbError;
use crate::model::{Collection, Document, EntityId, Relation};
use crate::reconcile::ReconcileError;
use crate::repo::document_repo::{EntityStore, RepoError};
use crate::validate::ValidationError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod department_service;
pub mod employee_service;
pub mod lookup_service;
pub mod match_service;

pub type EngineResult<T> = Result<T, EngineError>;

/// Id and display name of a referenced document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub id: EntityId,
    pub name: String,
}

impl EntityRef {
    pub fn of<T: Document>(doc: &T) -> Self {
        Self {
            id: doc.id(),
            name: doc.name().to_string(),
        }
    }
}

/// Error surfaced to presentation callers.
#[derive(Debug)]
pub enum EngineError {
    /// Referenced entities are absent.
    NotFound {
        collection: Collection,
        ids: Vec<EntityId>,
    },
    InvalidManager {
        manager_id: EntityId,
    },
    MalformedSkillSpec {
        token: String,
    },
    SkillNotFound {
        skill_id: EntityId,
    },
    InvalidProficiency {
        skill_id: EntityId,
        proficiency: u32,
    },
    MalformedIdList {
        token: String,
    },
    MalformedDate {
        value: String,
    },
    InvalidName,
    /// A direct reference-data write tried to change employee links.
    EmployeeLinksChanged {
        collection: Collection,
        id: EntityId,
    },
    /// Store busy, locked or unreachable. Safe to retry.
    StorageUnavailable(RepoError),
    /// Another writer changed the document between read and write.
    VersionConflict {
        collection: Collection,
        id: EntityId,
    },
    /// One relationship edge failed mid-cascade.
    Cascade {
        relation: Relation,
        owner_id: EntityId,
        target_id: EntityId,
        source: RepoError,
    },
    Store(RepoError),
}

impl EngineError {
    pub(crate) fn not_found(collection: Collection, id: EntityId) -> Self {
        Self::NotFound {
            collection,
            ids: vec![id],
        }
    }

    /// Input errors are reported verbatim and never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidManager { .. }
                | Self::MalformedSkillSpec { .. }
                | Self::SkillNotFound { .. }
                | Self::InvalidProficiency { .. }
                | Self::MalformedIdList { .. }
                | Self::MalformedDate { .. }
                | Self::InvalidName
                | Self::EmployeeLinksChanged { .. }
        )
    }

    /// Whether repeating the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StorageUnavailable(_) | Self::VersionConflict { .. } => true,
            Self::Cascade { source, .. } => {
                source.is_unavailable() || matches!(source, RepoError::VersionConflict { .. })
            }
            _ => false,
        }
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { collection, ids } => {
                write!(f, "{} not found: {ids:?}", collection.entity_name())
            }
            Self::InvalidManager { manager_id } => write!(
                f,
                "manager {manager_id} must be a member of the department"
            ),
            Self::MalformedSkillSpec { token } => write!(
                f,
                "malformed skill entry `{token}`; expected `skillId:proficiency`"
            ),
            Self::SkillNotFound { skill_id } => write!(f, "skill not found: {skill_id}"),
            Self::InvalidProficiency {
                skill_id,
                proficiency,
            } => write!(
                f,
                "proficiency {proficiency} for skill {skill_id} is outside 1-5"
            ),
            Self::MalformedIdList { token } => write!(f, "malformed id `{token}` in id list"),
            Self::MalformedDate { value } => write!(f, "malformed date `{value}`"),
            Self::InvalidName => write!(f, "name must not be blank"),
            Self::EmployeeLinksChanged { collection, id } => write!(
                f,
                "{} {id}: employee links can only change through employee updates",
                collection.entity_name()
            ),
            Self::StorageUnavailable(err) => write!(f, "storage unavailable: {err}"),
            Self::VersionConflict { collection, id } => write!(
                f,
                "{} {id} was modified concurrently",
                collection.entity_name()
            ),
            Self::Cascade {
                relation,
                owner_id,
                target_id,
                source,
            } => write!(
                f,
                "{relation} cascade failed for employee {owner_id} at target {target_id}: {source}"
            ),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageUnavailable(err) | Self::Store(err) => Some(err),
            Self::Cascade { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<RepoError> for EngineError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { collection, id } => Self::not_found(collection, id),
            RepoError::VersionConflict { collection, id, .. } => {
                Self::VersionConflict { collection, id }
            }
            other if other.is_unavailable() => Self::StorageUnavailable(other),
            other => Self::Store(other),
        }
    }
}

impl From<DbError> for EngineError {
    fn from(value: DbError) -> Self {
        RepoError::Db(value).into()
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(value: rusqlite::Error) -> Self {
        RepoError::from(value).into()
    }
}

impl From<ValidationError> for EngineError {
    fn from(value: ValidationError) -> Self {
        match value {
            ValidationError::InvalidManager { manager_id } => Self::InvalidManager { manager_id },
            ValidationError::MalformedSkillSpec { token } => Self::MalformedSkillSpec { token },
            ValidationError::SkillNotFound { skill_id } => Self::SkillNotFound { skill_id },
            ValidationError::InvalidProficiency {
                skill_id,
                proficiency,
            } => Self::InvalidProficiency {
                skill_id,
                proficiency,
            },
            ValidationError::MalformedIdList { token } => Self::MalformedIdList { token },
            ValidationError::MalformedDate { value } => Self::MalformedDate { value },
            ValidationError::InvalidName => Self::InvalidName,
            ValidationError::Repo(err) => err.into(),
        }
    }
}

impl From<ReconcileError> for EngineError {
    fn from(value: ReconcileError) -> Self {
        match value {
            ReconcileError::NotFound { collection, ids } => Self::NotFound { collection, ids },
            ReconcileError::Cascade {
                relation,
                owner_id,
                target_id,
                source,
            } => Self::Cascade {
                relation,
                owner_id,
                target_id,
                source,
            },
            ReconcileError::Repo(err) => err.into(),
        }
    }
}

/// Loads one document or fails with `NotFound`.
pub(crate) fn require<S: EntityStore, T: Document>(store: &S, id: EntityId) -> EngineResult<T> {
    store
        .get::<T>(id)?
        .ok_or_else(|| EngineError::not_found(T::COLLECTION, id))
}

/// Fails with `NotFound` listing every id in `ids` that has no document.
pub(crate) fn require_all<S: EntityStore, T: Document>(
    store: &S,
    ids: &[EntityId],
) -> EngineResult<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let found: Vec<EntityId> = store
        .get_many::<T>(ids)?
        .iter()
        .map(|doc| doc.id())
        .collect();
    let missing: Vec<EntityId> = ids
        .iter()
        .copied()
        .filter(|id| !found.contains(id))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::NotFound {
            collection: T::COLLECTION,
            ids: missing,
        })
    }
}
