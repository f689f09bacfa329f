//! Employee roster engine over a SQLite document store.
//! Keeps the employee/department/project/training links consistent on both sides.

pub mod audit;
pub mod db;
pub mod engine;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod repo;
pub mod service;
pub mod validate;

pub use audit::{audit, AuditReport, Divergence};
pub use engine::{ConfigError, Engine, EngineConfig, RetryPolicy};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::department::Department;
pub use model::employee::{Employee, SkillLevel};
pub use model::project::{Project, ProjectStatus};
pub use model::skill::Skill;
pub use model::task::{Task, TaskStatus};
pub use model::training::Training;
pub use model::{Collection, Document, EntityId, MemberSet, ReferenceData, Relation};
pub use repo::document_repo::{EntityStore, RepoError, RepoResult, SqliteStore};
pub use repo::query::Page;
pub use service::department_service::{
    DepartmentInput, DepartmentService, DepartmentView, ManagerUpdate,
};
pub use service::employee_service::{EmployeeInput, EmployeeService, EmployeeView, SkillView};
pub use service::lookup_service::LookupService;
pub use service::match_service::{parse_skill_requirements, MatchService, SkillRequirement};
pub use service::{EngineError, EngineResult, EntityRef};

/// Liveness probe for embedding hosts.
pub fn ping() -> &'static str {
    "pong"
}

pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
