//! Project and skill matching queries.
//!
//! # Responsibility
//! - Find projects by name, by member, and by skill overlap with an employee.
//! - Find employees meeting a set of minimum skill levels.
//!
//! # Invariants
//! - Every query here is read-only.
//! - Unknown employees yield empty results rather than errors.

use crate::model::employee::Employee;
use crate::model::project::Project;
use crate::model::EntityId;
use crate::repo::document_repo::EntityStore;
use crate::repo::query::{ArrayMatcher, Comparison, ElementPredicate};
use crate::service::EngineResult;
use log::debug;

/// Minimum proficiency wanted for one skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkillRequirement {
    pub skill_id: EntityId,
    pub min_proficiency: u32,
}

/// Parses `id:min` pairs, skipping tokens that do not parse.
///
/// A skill listed twice keeps its first position and its last minimum.
pub fn parse_skill_requirements(text: &str) -> Vec<SkillRequirement> {
    let mut requirements: Vec<SkillRequirement> = Vec::new();
    for token in text.split(',') {
        let Some((skill, level)) = token.trim().split_once(':') else {
            continue;
        };
        let (Ok(skill_id), Ok(min_proficiency)) =
            (skill.trim().parse::<EntityId>(), level.trim().parse::<u32>())
        else {
            continue;
        };
        match requirements.iter_mut().find(|req| req.skill_id == skill_id) {
            Some(existing) => existing.min_proficiency = min_proficiency,
            None => requirements.push(SkillRequirement {
                skill_id,
                min_proficiency,
            }),
        }
    }
    requirements
}

pub struct MatchService<S: EntityStore> {
    store: S,
}

impl<S: EntityStore> MatchService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Case-insensitive substring match. Blank names match nothing.
    pub fn projects_by_name(&self, name: &str) -> EngineResult<Vec<Project>> {
        let needle = name.trim();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.store.find_by_name_contains(needle, true)?)
    }

    /// Projects whose member set lists the employee.
    pub fn projects_of_employee(&self, employee_id: EntityId) -> EngineResult<Vec<Project>> {
        if self.store.get::<Employee>(employee_id)?.is_none() {
            return Ok(Vec::new());
        }
        Ok(self
            .store
            .find_where_array_contains("members", &ArrayMatcher::Equals(employee_id))?)
    }

    /// Projects the employee is not on that require at least one skill the
    /// employee has.
    pub fn projects_available_for(&self, employee_id: EntityId) -> EngineResult<Vec<Project>> {
        let Some(employee) = self.store.get::<Employee>(employee_id)? else {
            return Ok(Vec::new());
        };
        let skill_ids = employee.skill_ids();
        if skill_ids.is_empty() {
            return Ok(Vec::new());
        }

        let projects: Vec<Project> = self
            .store
            .list::<Project>()?
            .into_iter()
            .filter(|project| !project.members.contains(&employee_id))
            .filter(|project| {
                project
                    .required_skills
                    .iter()
                    .any(|skill| skill_ids.contains(skill))
            })
            .collect();
        debug!(
            "event=projects_available module=match status=ok employee_id={} matches={}",
            employee_id,
            projects.len()
        );
        Ok(projects)
    }

    /// Projects whose required skills cover every requested skill id.
    pub fn projects_requiring(
        &self,
        requirements: &[SkillRequirement],
    ) -> EngineResult<Vec<Project>> {
        Ok(self
            .store
            .list::<Project>()?
            .into_iter()
            .filter(|project| !project.required_skills.is_empty())
            .filter(|project| {
                requirements
                    .iter()
                    .all(|req| project.required_skills.contains(&req.skill_id))
            })
            .collect())
    }

    /// Employees holding every requested skill at or above its minimum.
    ///
    /// No requirements match every employee.
    pub fn employees_with_skills(
        &self,
        requirements: &[SkillRequirement],
    ) -> EngineResult<Vec<Employee>> {
        let Some((first, rest)) = requirements.split_first() else {
            return Ok(self.store.list()?);
        };

        let mut matched = self.employees_meeting(first)?;
        for requirement in rest {
            if matched.is_empty() {
                break;
            }
            let ids: Vec<EntityId> = self
                .employees_meeting(requirement)?
                .iter()
                .map(|employee| employee.id)
                .collect();
            matched.retain(|employee| ids.contains(&employee.id));
        }
        debug!(
            "event=skill_match module=match status=ok requirements={} matches={}",
            requirements.len(),
            matched.len()
        );
        Ok(matched)
    }

    fn employees_meeting(&self, requirement: &SkillRequirement) -> EngineResult<Vec<Employee>> {
        let matcher = ArrayMatcher::ElementMatch(vec![
            ElementPredicate::new("skillId", Comparison::Eq, requirement.skill_id),
            ElementPredicate::new(
                "proficiency",
                Comparison::Gte,
                i64::from(requirement.min_proficiency),
            ),
        ]);
        Ok(self.store.find_where_array_contains("skills", &matcher)?)
    }
}
