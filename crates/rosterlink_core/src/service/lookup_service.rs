//! Read-only collection listings for pickers and dropdowns.

use crate::model::department::Department;
use crate::model::employee::Employee;
use crate::model::project::Project;
use crate::model::skill::Skill;
use crate::model::task::Task;
use crate::model::training::Training;
use crate::model::Document;
use crate::repo::document_repo::EntityStore;
use crate::service::{EngineResult, EntityRef};

pub struct LookupService<S: EntityStore> {
    store: S,
}

impl<S: EntityStore> LookupService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn list_skills(&self) -> EngineResult<Vec<Skill>> {
        Ok(self.store.list()?)
    }

    pub fn list_projects(&self) -> EngineResult<Vec<Project>> {
        Ok(self.store.list()?)
    }

    pub fn list_trainings(&self) -> EngineResult<Vec<Training>> {
        Ok(self.store.list()?)
    }

    pub fn list_departments(&self) -> EngineResult<Vec<Department>> {
        Ok(self.store.list()?)
    }

    pub fn list_employees(&self) -> EngineResult<Vec<Employee>> {
        Ok(self.store.list()?)
    }

    pub fn list_tasks(&self) -> EngineResult<Vec<Task>> {
        Ok(self.store.list()?)
    }

    /// `(id, name)` pairs for any collection, ordered by id.
    pub fn options<T: Document>(&self) -> EngineResult<Vec<EntityRef>> {
        Ok(self
            .store
            .list::<T>()?
            .iter()
            .map(EntityRef::of)
            .collect())
    }
}
