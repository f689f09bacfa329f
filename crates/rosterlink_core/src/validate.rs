//! Cross-entity invariants and presentation-input parsing.
//!
//! # Responsibility
//! - Reject invalid department/employee submissions before any write.
//! - Parse the string-typed inputs handed over by forms.
//!
//! # Invariants
//! - Every check here is read-only; a rejected submission leaves all
//!   collections untouched.
//! - Skill lists keep the first occurrence of a repeated skill id, whether
//!   parsed from a form or submitted directly.

use crate::model::employee::{SkillLevel, MAX_PROFICIENCY, MIN_PROFICIENCY};
use crate::model::skill::Skill;
use crate::model::EntityId;
use crate::repo::document_repo::{EntityStore, RepoError};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

static SKILL_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+):(\d+)$").expect("valid skill token regex"));

#[derive(Debug)]
pub enum ValidationError {
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
    Repo(RepoError),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidManager { manager_id } => write!(
                f,
                "manager {manager_id} must be a member of the department"
            ),
            Self::MalformedSkillSpec { token } => write!(
                f,
                "malformed skill entry `{token}`; expected `skillId:proficiency`, e.g. `1:4`"
            ),
            Self::SkillNotFound { skill_id } => write!(f, "skill not found: {skill_id}"),
            Self::InvalidProficiency {
                skill_id,
                proficiency,
            } => write!(
                f,
                "proficiency {proficiency} for skill {skill_id} must be between {MIN_PROFICIENCY} and {MAX_PROFICIENCY}"
            ),
            Self::MalformedIdList { token } => write!(f, "malformed id `{token}` in id list"),
            Self::MalformedDate { value } => {
                write!(f, "malformed date `{value}`; expected `YYYY-MM-DD`")
            }
            Self::InvalidName => write!(f, "name must not be blank"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ValidationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ValidationError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Requires `manager_id`, when set, to be one of `members`.
pub fn validate_manager_in_members(
    manager_id: Option<EntityId>,
    members: &[EntityId],
) -> Result<(), ValidationError> {
    match manager_id {
        Some(manager_id) if !members.contains(&manager_id) => {
            Err(ValidationError::InvalidManager { manager_id })
        }
        _ => Ok(()),
    }
}

/// Parses `id:proficiency` pairs separated by commas.
///
/// Blank input yields no skills. Proficiency ranges are checked; skill
/// existence is not (see `validate_skill_assignment`).
pub fn parse_skill_spec(text: &str) -> Result<Vec<SkillLevel>, ValidationError> {
    let mut seen = HashSet::new();
    let mut levels = Vec::new();
    for raw in text.split(',') {
        let token = raw.trim();
        if token.is_empty() {
            if text.trim().is_empty() {
                continue;
            }
            return Err(ValidationError::MalformedSkillSpec {
                token: raw.to_string(),
            });
        }

        let malformed = || ValidationError::MalformedSkillSpec {
            token: token.to_string(),
        };
        let compact: String = token.chars().filter(|ch| !ch.is_whitespace()).collect();
        let captures = SKILL_TOKEN_RE.captures(&compact).ok_or_else(malformed)?;
        let skill_id: EntityId = captures[1].parse().map_err(|_| malformed())?;
        let proficiency: u32 = captures[2].parse().map_err(|_| malformed())?;
        let proficiency = checked_proficiency(skill_id, proficiency)?;

        if seen.insert(skill_id) {
            levels.push(SkillLevel {
                skill_id,
                proficiency,
            });
        }
    }
    Ok(levels)
}

/// Checks that `skill_id` resolves and `proficiency` is in range.
pub fn validate_skill_assignment<S: EntityStore>(
    store: &S,
    skill_id: EntityId,
    proficiency: u32,
) -> Result<(), ValidationError> {
    if store.get::<Skill>(skill_id)?.is_none() {
        return Err(ValidationError::SkillNotFound { skill_id });
    }
    checked_proficiency(skill_id, proficiency)?;
    Ok(())
}

/// Applies `validate_skill_assignment` to every entry.
pub fn validate_skills<S: EntityStore>(
    store: &S,
    levels: &[SkillLevel],
) -> Result<(), ValidationError> {
    for level in levels {
        validate_skill_assignment(store, level.skill_id, u32::from(level.proficiency))?;
    }
    Ok(())
}

/// Drops entries whose skill id already appeared, keeping the first.
pub fn dedup_skills(levels: &[SkillLevel]) -> Vec<SkillLevel> {
    let mut seen = HashSet::with_capacity(levels.len());
    levels
        .iter()
        .copied()
        .filter(|level| seen.insert(level.skill_id))
        .collect()
}

/// Parses a comma-joined id list. Blank tokens are ignored, repeats dropped.
pub fn parse_id_list(text: &str) -> Result<Vec<EntityId>, ValidationError> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for raw in text.split(',') {
        let token = raw.trim();
        if token.is_empty() {
            continue;
        }
        let id: EntityId = token
            .parse()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| ValidationError::MalformedIdList {
                token: token.to_string(),
            })?;
        if seen.insert(id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Parses an optional `YYYY-MM-DD` date. Blank input means no date.
pub fn parse_optional_date(text: &str) -> Result<Option<NaiveDate>, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| ValidationError::MalformedDate {
            value: trimmed.to_string(),
        })
}

/// Parses an optional single id. Blank input means no reference.
pub fn parse_optional_id(text: &str) -> Result<Option<EntityId>, ValidationError> {
    let mut ids = parse_id_list(text)?;
    match ids.len() {
        0 => Ok(None),
        1 => Ok(ids.pop()),
        _ => Err(ValidationError::MalformedIdList {
            token: text.trim().to_string(),
        }),
    }
}

/// Trims `name` and rejects blank values.
pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidName);
    }
    Ok(trimmed.to_string())
}

fn checked_proficiency(skill_id: EntityId, proficiency: u32) -> Result<u8, ValidationError> {
    match u8::try_from(proficiency) {
        Ok(value) if (MIN_PROFICIENCY..=MAX_PROFICIENCY).contains(&value) => Ok(value),
        _ => Err(ValidationError::InvalidProficiency {
            skill_id,
            proficiency,
        }),
    }
}
