//! Department use-case service.
//!
//! # Responsibility
//! - Create, update and delete departments and move employees between them.
//! - Build paged department views with manager and member names.
//!
//! # Invariants
//! - `manager_id`, when set, is a member of the saved member set.
//! - An employee joining a department leaves its previous one first.
//! - Deleting a department clears `dep_id` on every employee pointing at it.

use crate::model::department::Department;
use crate::model::employee::Employee;
use crate::model::{Collection, EntityId};
use crate::reconcile::{dedup_ids, migrate_members};
use crate::repo::document_repo::EntityStore;
use crate::repo::query::Page;
use crate::service::{require, require_all, EngineError, EngineResult, EntityRef};
use crate::validate::{parse_id_list, parse_optional_id, validate_manager_in_members, validate_name};
use log::info;

/// How a department update treats the manager field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ManagerUpdate {
    /// Keep the current manager while it stays a member, otherwise clear it.
    #[default]
    Keep,
    /// Appoint this employee. It must be in the submitted member set.
    Set(EntityId),
    Clear,
}

impl ManagerUpdate {
    fn resolve(
        self,
        current: Option<EntityId>,
        members: &[EntityId],
    ) -> EngineResult<Option<EntityId>> {
        match self {
            Self::Keep => Ok(current.filter(|manager| members.contains(manager))),
            Self::Set(manager_id) => {
                validate_manager_in_members(Some(manager_id), members)?;
                Ok(Some(manager_id))
            }
            Self::Clear => Ok(None),
        }
    }
}

/// Submitted department fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepartmentInput {
    pub name: String,
    pub manager: ManagerUpdate,
    pub members: Vec<EntityId>,
}

impl DepartmentInput {
    /// Builds input from form fields. A blank manager clears it.
    pub fn from_form(name: &str, manager_id: &str, members: &str) -> EngineResult<Self> {
        let manager = match parse_optional_id(manager_id)? {
            Some(id) => ManagerUpdate::Set(id),
            None => ManagerUpdate::Clear,
        };
        Ok(Self {
            name: name.to_string(),
            manager,
            members: parse_id_list(members)?,
        })
    }
}

/// Department read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepartmentView {
    pub id: EntityId,
    pub name: String,
    pub manager: Option<EntityRef>,
    /// Members that still resolve, ordered by id.
    pub members: Vec<EntityRef>,
}

pub struct DepartmentService<S: EntityStore> {
    store: S,
}

impl<S: EntityStore> DepartmentService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn get(&self, id: EntityId) -> EngineResult<Option<Department>> {
        Ok(self.store.get(id)?)
    }

    pub fn list(&self) -> EngineResult<Vec<Department>> {
        Ok(self.store.list()?)
    }

    /// Employees listed in the department's member set.
    pub fn members(&self, id: EntityId) -> EngineResult<Vec<Employee>> {
        let department = require::<S, Department>(&self.store, id)?;
        Ok(self.store.get_many(&department.members)?)
    }

    pub fn view(&self, id: EntityId) -> EngineResult<Option<DepartmentView>> {
        match self.store.get::<Department>(id)? {
            Some(department) => self.to_view(department).map(Some),
            None => Ok(None),
        }
    }

    /// Case-insensitive name search returning one page of views.
    pub fn page(
        &self,
        name: &str,
        page_number: u32,
        page_size: Option<u32>,
    ) -> EngineResult<Page<DepartmentView>> {
        self.store
            .find_page::<Department>(name, page_number, page_size)?
            .try_map(|department| self.to_view(department))
    }

    pub fn create(&self, input: &DepartmentInput) -> EngineResult<Department> {
        let name = validate_name(&input.name)?;
        let members = dedup_ids(&input.members);
        let manager_id = input.manager.resolve(None, &members)?;
        require_all::<S, Employee>(&self.store, &members)?;

        let id = self.store.next_id::<Department>()?;
        let migration = migrate_members(&self.store, id, &[], &members)?;

        let mut department = Department::new(id, name);
        department.manager_id = manager_id;
        department.members = members;
        self.store.save(&mut department)?;

        info!(
            "event=department_create module=service status=ok department_id={} members={} migrated={}",
            id,
            department.members.len(),
            migration.migrated.len()
        );
        Ok(department)
    }

    pub fn update(&self, id: EntityId, input: &DepartmentInput) -> EngineResult<Department> {
        let mut department = require::<S, Department>(&self.store, id)?;

        let name = validate_name(&input.name)?;
        let members = dedup_ids(&input.members);
        let manager_id = input.manager.resolve(department.manager_id, &members)?;
        let old_members = self.linked_members(&department)?;
        let joining: Vec<EntityId> = members
            .iter()
            .copied()
            .filter(|member| !old_members.contains(member))
            .collect();
        require_all::<S, Employee>(&self.store, &joining)?;

        let migration = migrate_members(&self.store, id, &old_members, &members)?;

        if department.manager_id.is_some() && manager_id.is_none() {
            info!(
                "event=department_update module=service status=manager_cleared department_id={} previous_manager_id={:?}",
                id, department.manager_id
            );
        }
        department.name = name;
        department.manager_id = manager_id;
        department.members = members;
        self.store.save(&mut department)?;

        info!(
            "event=department_update module=service status=ok department_id={} added={:?} removed={:?} writes={}",
            id, migration.added, migration.removed, migration.writes
        );
        Ok(department)
    }

    /// Releases every member, then deletes the department.
    pub fn delete(&self, id: EntityId) -> EngineResult<()> {
        let department = require::<S, Department>(&self.store, id)?;
        let members = self.linked_members(&department)?;
        let migration = migrate_members(&self.store, id, &members, &[])?;

        if !self.store.delete::<Department>(id)? {
            return Err(EngineError::not_found(Collection::Departments, id));
        }
        info!(
            "event=department_delete module=service status=ok department_id={} released={}",
            id, migration.writes
        );
        Ok(())
    }

    /// Member set plus any employee whose `dep_id` still points here.
    fn linked_members(&self, department: &Department) -> EngineResult<Vec<EntityId>> {
        let mut ids = department.members.clone();
        ids.extend(
            self.store
                .list::<Employee>()?
                .iter()
                .filter(|employee| employee.dep_id == Some(department.id))
                .map(|employee| employee.id),
        );
        Ok(dedup_ids(&ids))
    }

    fn to_view(&self, department: Department) -> EngineResult<DepartmentView> {
        let members: Vec<EntityRef> = self
            .store
            .get_many::<Employee>(&department.members)?
            .iter()
            .map(EntityRef::of)
            .collect();
        let manager = department
            .manager_id
            .and_then(|manager_id| members.iter().find(|member| member.id == manager_id))
            .cloned();
        Ok(DepartmentView {
            id: department.id,
            name: department.name,
            manager,
            members,
        })
    }
}
