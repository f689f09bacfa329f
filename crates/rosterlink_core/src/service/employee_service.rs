//! Employee use-case service.
//!
//! # Responsibility
//! - Create, update and delete employees while keeping department, project
//!   and training member sets and task managers in sync.
//! - Build read models that resolve referenced names.
//!
//! # Invariants
//! - Name, skills, dates and every newly referenced id are validated before
//!   the first write.
//! - The old side of each relationship is the union of the employee's own
//!   list and every document that still lists the employee, so stale
//!   back-references are stripped on the next write.
//! - Stored skills hold one entry per skill id, the first one submitted.
//! - The employee document is written after all reconciliation.

use crate::model::department::Department;
use crate::model::employee::{Employee, SkillLevel};
use crate::model::project::Project;
use crate::model::skill::Skill;
use crate::model::task::Task;
use crate::model::training::Training;
use crate::model::{Collection, EntityId, MemberSet};
use crate::reconcile::{
    dedup_ids, diff, managed_task_ids, option_set, reconcile_department, reconcile_members,
    reconcile_task_managers,
};
use crate::repo::document_repo::EntityStore;
use crate::repo::query::{ArrayMatcher, Page};
use crate::service::{require, require_all, EngineError, EngineResult, EntityRef};
use crate::validate::{
    dedup_skills, parse_id_list, parse_optional_date, parse_optional_id, parse_skill_spec,
    validate_name, validate_skills,
};
use chrono::NaiveDate;
use log::{info, warn};

/// Submitted employee fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmployeeInput {
    pub name: String,
    pub join_date: Option<NaiveDate>,
    pub dep_id: Option<EntityId>,
    pub skills: Vec<SkillLevel>,
    pub projects: Vec<EntityId>,
    pub trainings: Vec<EntityId>,
    /// Every task the employee should manage afterwards.
    pub managed_tasks: Vec<EntityId>,
}

impl EmployeeInput {
    /// Builds input from string-typed form fields.
    ///
    /// `skills` uses `id:proficiency` pairs, `projects`/`trainings`/`tasks`
    /// are comma-joined ids, blank `dep_id`/`join_date` mean unset.
    pub fn from_form(
        name: &str,
        join_date: &str,
        dep_id: &str,
        skills: &str,
        projects: &str,
        trainings: &str,
        tasks: &str,
    ) -> EngineResult<Self> {
        Ok(Self {
            name: name.to_string(),
            join_date: parse_optional_date(join_date)?,
            dep_id: parse_optional_id(dep_id)?,
            skills: parse_skill_spec(skills)?,
            projects: parse_id_list(projects)?,
            trainings: parse_id_list(trainings)?,
            managed_tasks: parse_id_list(tasks)?,
        })
    }
}

/// Skill entry with its resolved name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillView {
    pub skill_id: EntityId,
    /// `None` when the skill no longer resolves.
    pub name: Option<String>,
    pub proficiency: u8,
}

/// Employee read model with referenced names resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeView {
    pub employee: Employee,
    pub department: Option<EntityRef>,
    pub skills: Vec<SkillView>,
    pub projects: Vec<EntityRef>,
    pub trainings: Vec<EntityRef>,
    /// Tasks whose manager is this employee.
    pub managed_tasks: Vec<EntityRef>,
}

/// Employee aggregate service.
pub struct EmployeeService<S: EntityStore> {
    store: S,
}

impl<S: EntityStore> EmployeeService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn get(&self, id: EntityId) -> EngineResult<Option<Employee>> {
        Ok(self.store.get(id)?)
    }

    pub fn list(&self) -> EngineResult<Vec<Employee>> {
        Ok(self.store.list()?)
    }

    /// Case-insensitive name search. A blank name lists everyone.
    pub fn search(&self, name: &str) -> EngineResult<Vec<Employee>> {
        Ok(self.store.find_by_name_contains(name, true)?)
    }

    pub fn page(
        &self,
        name: &str,
        page_number: u32,
        page_size: Option<u32>,
    ) -> EngineResult<Page<Employee>> {
        Ok(self.store.find_page(name, page_number, page_size)?)
    }

    /// Tasks currently managed by `id`, ordered by task id.
    pub fn managed_tasks(&self, id: EntityId) -> EngineResult<Vec<Task>> {
        let task_ids = managed_task_ids(&self.store, id)?;
        Ok(self.store.get_many(&task_ids)?)
    }

    pub fn view(&self, id: EntityId) -> EngineResult<Option<EmployeeView>> {
        let Some(employee) = self.store.get::<Employee>(id)? else {
            return Ok(None);
        };

        let department = match employee.dep_id {
            Some(dep_id) => self
                .store
                .get::<Department>(dep_id)?
                .map(|department| EntityRef::of(&department)),
            None => None,
        };

        let skill_names = self.store.get_many::<Skill>(&employee.skill_ids())?;
        let skills = employee
            .skills
            .iter()
            .map(|level| SkillView {
                skill_id: level.skill_id,
                name: skill_names
                    .iter()
                    .find(|skill| skill.id == level.skill_id)
                    .map(|skill| skill.name.clone()),
                proficiency: level.proficiency,
            })
            .collect();

        let projects = self
            .store
            .get_many::<Project>(&employee.projects)?
            .iter()
            .map(EntityRef::of)
            .collect();
        let trainings = self
            .store
            .get_many::<Training>(&employee.trainings)?
            .iter()
            .map(EntityRef::of)
            .collect();
        let managed_tasks = self
            .managed_tasks(id)?
            .iter()
            .map(EntityRef::of)
            .collect();

        Ok(Some(EmployeeView {
            employee,
            department,
            skills,
            projects,
            trainings,
            managed_tasks,
        }))
    }

    /// Creates an employee, joins it to its department, projects and
    /// trainings, and hands it its managed tasks.
    pub fn create(&self, input: &EmployeeInput) -> EngineResult<Employee> {
        let name = validate_name(&input.name)?;
        let skills = dedup_skills(&input.skills);
        validate_skills(&self.store, &skills)?;
        let projects = dedup_ids(&input.projects);
        let trainings = dedup_ids(&input.trainings);
        let tasks = dedup_ids(&input.managed_tasks);
        require_all::<S, Department>(&self.store, &option_set(input.dep_id))?;
        require_all::<S, Project>(&self.store, &projects)?;
        require_all::<S, Training>(&self.store, &trainings)?;
        require_all::<S, Task>(&self.store, &tasks)?;

        let id = self.store.next_id::<Employee>()?;
        info!(
            "event=employee_create module=service status=start employee_id={}",
            id
        );

        reconcile_department(&self.store, id, None, input.dep_id)?;
        reconcile_members::<S, Project>(&self.store, id, &[], &projects)?;
        reconcile_members::<S, Training>(&self.store, id, &[], &trainings)?;
        reconcile_task_managers(&self.store, id, &tasks)?;

        let mut employee = Employee::new(id, name);
        employee.join_date = input.join_date;
        employee.dep_id = input.dep_id;
        employee.skills = skills;
        employee.projects = projects;
        employee.trainings = trainings;
        self.store.save(&mut employee)?;

        info!(
            "event=employee_create module=service status=ok employee_id={} dep_id={:?}",
            id, employee.dep_id
        );
        Ok(employee)
    }

    /// Replaces an employee's fields and relationships.
    pub fn update(&self, id: EntityId, input: &EmployeeInput) -> EngineResult<Employee> {
        let mut employee = require::<S, Employee>(&self.store, id)?;

        let name = validate_name(&input.name)?;
        let skills = dedup_skills(&input.skills);
        validate_skills(&self.store, &skills)?;
        let projects = dedup_ids(&input.projects);
        let trainings = dedup_ids(&input.trainings);
        let tasks = dedup_ids(&input.managed_tasks);

        let old_departments = self.linked_ids::<Department>(id, &option_set(employee.dep_id))?;
        let old_projects = self.linked_ids::<Project>(id, &employee.projects)?;
        let old_trainings = self.linked_ids::<Training>(id, &employee.trainings)?;
        let old_tasks = managed_task_ids(&self.store, id)?;

        let new_departments = option_set(input.dep_id);
        require_all::<S, Department>(
            &self.store,
            &diff(&old_departments, &new_departments).added,
        )?;
        require_all::<S, Project>(&self.store, &diff(&old_projects, &projects).added)?;
        require_all::<S, Training>(&self.store, &diff(&old_trainings, &trainings).added)?;
        require_all::<S, Task>(&self.store, &diff(&old_tasks, &tasks).added)?;

        if old_departments.len() > 1 {
            warn!(
                "event=employee_update module=service status=repair employee_id={} departments={:?}",
                id, old_departments
            );
        }
        reconcile_members::<S, Department>(&self.store, id, &old_departments, &new_departments)?;
        reconcile_members::<S, Project>(&self.store, id, &old_projects, &projects)?;
        reconcile_members::<S, Training>(&self.store, id, &old_trainings, &trainings)?;
        reconcile_task_managers(&self.store, id, &tasks)?;

        employee.name = name;
        employee.join_date = input.join_date;
        employee.dep_id = input.dep_id;
        employee.skills = skills;
        employee.projects = projects;
        employee.trainings = trainings;
        self.store.save(&mut employee)?;

        info!(
            "event=employee_update module=service status=ok employee_id={} dep_id={:?}",
            id, employee.dep_id
        );
        Ok(employee)
    }

    /// Strips the employee from every back-reference and releases its
    /// tasks, then deletes it.
    pub fn delete(&self, id: EntityId) -> EngineResult<()> {
        let employee = require::<S, Employee>(&self.store, id)?;

        let departments = self.linked_ids::<Department>(id, &option_set(employee.dep_id))?;
        let projects = self.linked_ids::<Project>(id, &employee.projects)?;
        let trainings = self.linked_ids::<Training>(id, &employee.trainings)?;

        reconcile_members::<S, Department>(&self.store, id, &departments, &[])?;
        reconcile_members::<S, Project>(&self.store, id, &projects, &[])?;
        reconcile_members::<S, Training>(&self.store, id, &trainings, &[])?;
        reconcile_task_managers(&self.store, id, &[])?;

        if !self.store.delete::<Employee>(id)? {
            return Err(EngineError::not_found(Collection::Employees, id));
        }
        info!(
            "event=employee_delete module=service status=ok employee_id={}",
            id
        );
        Ok(())
    }

    /// Union of `own` and every `T` whose member set lists `employee_id`.
    fn linked_ids<T: MemberSet>(
        &self,
        employee_id: EntityId,
        own: &[EntityId],
    ) -> EngineResult<Vec<EntityId>> {
        let mut ids = own.to_vec();
        for doc in self
            .store
            .find_where_array_contains::<T>("members", &ArrayMatcher::Equals(employee_id))?
        {
            if !own.contains(&doc.id()) {
                warn!(
                    "event=association_diverged module=service status=repair relation={} employee_id={} target_id={}",
                    T::RELATION,
                    employee_id,
                    doc.id()
                );
                ids.push(doc.id());
            }
        }
        Ok(dedup_ids(&ids))
    }
}
