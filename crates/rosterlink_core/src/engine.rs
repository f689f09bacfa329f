//! Transactional entry point for presentation callers.
//!
//! # Responsibility
//! - Own the SQLite connection and its configuration.
//! - Run every mutating use case inside one `BEGIN IMMEDIATE` transaction.
//! - Retry transient storage failures with exponential backoff.
//!
//! # Invariants
//! - A failed write attempt rolls back every document it touched.
//! - Validation and not-found errors are returned on the first attempt.

use crate::audit::{audit, AuditReport};
use crate::db::{open_db_in_memory, open_db_with};
use crate::model::department::Department;
use crate::model::employee::Employee;
use crate::model::{EntityId, ReferenceData};
use crate::repo::document_repo::{EntityStore, SqliteStore};
use crate::repo::query::Page;
use crate::service::department_service::{DepartmentInput, DepartmentService, DepartmentView};
use crate::service::employee_service::{EmployeeInput, EmployeeService, EmployeeView};
use crate::service::{EngineError, EngineResult};
use log::{error, info, warn};
use rusqlite::{Connection, TransactionBehavior};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Backoff settings for retryable write failures.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `0` behaves like `1`.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 20,
            max_delay_ms: 200,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the attempt following `attempt` (zero based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let multiplier = 1u64 << attempt.min(63);
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// Engine settings, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Database file. `None` opens a private in-memory database.
    pub db_path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            busy_timeout_ms: 5_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(ConfigError::Parse)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid engine config: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
        }
    }
}

/// Connection owner that wraps each use case in a transaction.
pub struct Engine {
    conn: Connection,
    config: EngineConfig,
}

impl Engine {
    pub fn open(config: EngineConfig) -> EngineResult<Self> {
        let conn = match &config.db_path {
            Some(path) => open_db_with(path, config.busy_timeout())?,
            None => open_db_in_memory()?,
        };
        Ok(Self::from_connection(conn, config))
    }

    pub fn in_memory() -> EngineResult<Self> {
        Self::open(EngineConfig::default())
    }

    /// Wraps an already migrated connection.
    pub fn from_connection(conn: Connection, config: EngineConfig) -> Self {
        Self { conn, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Runs read-only work against the current committed state.
    pub fn read<T>(&self, f: impl FnOnce(SqliteStore<'_>) -> EngineResult<T>) -> EngineResult<T> {
        let store = SqliteStore::try_new(&self.conn)?;
        f(store)
    }

    /// Runs `f` in an immediate transaction, retrying retryable failures.
    ///
    /// `f` may run more than once and must not keep side effects outside the
    /// store.
    pub fn write<T, F>(&mut self, operation: &str, f: F) -> EngineResult<T>
    where
        F: Fn(SqliteStore<'_>) -> EngineResult<T>,
    {
        let policy = self.config.retry.clone();
        let max_attempts = policy.max_attempts.max(1);
        let started_at = Instant::now();
        let mut attempt = 0;
        loop {
            match self.write_once(&f) {
                Ok(value) => {
                    info!(
                        "event=engine_write module=engine status=ok operation={} attempts={} duration_ms={}",
                        operation,
                        attempt + 1,
                        started_at.elapsed().as_millis()
                    );
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = policy.delay(attempt);
                    warn!(
                        "event=engine_write module=engine status=retry operation={} attempt={} delay_ms={} error={}",
                        operation,
                        attempt + 1,
                        delay.as_millis(),
                        err
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_validation() {
                        info!(
                            "event=engine_write module=engine status=rejected operation={} error={}",
                            operation, err
                        );
                    } else {
                        error!(
                            "event=engine_write module=engine status=error operation={} attempts={} error={}",
                            operation,
                            attempt + 1,
                            err
                        );
                    }
                    return Err(err);
                }
            }
        }
    }

    fn write_once<T, F>(&mut self, f: &F) -> EngineResult<T>
    where
        F: Fn(SqliteStore<'_>) -> EngineResult<T>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(SqliteStore::try_new(&tx)?)?;
        tx.commit()?;
        Ok(value)
    }

    pub fn create_employee(&mut self, input: &EmployeeInput) -> EngineResult<Employee> {
        self.write("employee_create", |store| {
            EmployeeService::new(store).create(input)
        })
    }

    pub fn update_employee(
        &mut self,
        id: EntityId,
        input: &EmployeeInput,
    ) -> EngineResult<Employee> {
        self.write("employee_update", |store| {
            EmployeeService::new(store).update(id, input)
        })
    }

    pub fn delete_employee(&mut self, id: EntityId) -> EngineResult<()> {
        self.write("employee_delete", |store| {
            EmployeeService::new(store).delete(id)
        })
    }

    pub fn employee_view(&self, id: EntityId) -> EngineResult<Option<EmployeeView>> {
        self.read(|store| EmployeeService::new(store).view(id))
    }

    pub fn create_department(&mut self, input: &DepartmentInput) -> EngineResult<Department> {
        self.write("department_create", |store| {
            DepartmentService::new(store).create(input)
        })
    }

    pub fn update_department(
        &mut self,
        id: EntityId,
        input: &DepartmentInput,
    ) -> EngineResult<Department> {
        self.write("department_update", |store| {
            DepartmentService::new(store).update(id, input)
        })
    }

    pub fn delete_department(&mut self, id: EntityId) -> EngineResult<()> {
        self.write("department_delete", |store| {
            DepartmentService::new(store).delete(id)
        })
    }

    pub fn department_page(
        &self,
        name: &str,
        page_number: u32,
        page_size: Option<u32>,
    ) -> EngineResult<Page<DepartmentView>> {
        self.read(|store| DepartmentService::new(store).page(name, page_number, page_size))
    }

    /// Stores reference data (skills, projects, trainings, tasks).
    ///
    /// An id of `0` allocates the next id. Employee links (project and
    /// training members, task managers) are owned by the employee use cases
    /// and must equal what is already stored, so a new document starts with
    /// none. Anything else fails with `EmployeeLinksChanged`.
    ///
    /// Departments and employees always go through their services:
    ///
    /// ```compile_fail
    /// use rosterlink_core::{Department, Engine};
    ///
    /// let mut engine = Engine::in_memory().unwrap();
    /// engine.put(&Department::new(0, "Eng")).unwrap();
    /// ```
    pub fn put<T: ReferenceData>(&mut self, doc: &T) -> EngineResult<T> {
        self.write("document_put", |store| {
            let mut doc = doc.clone();
            let stored_links = if doc.id() == 0 {
                Vec::new()
            } else {
                store
                    .get::<T>(doc.id())?
                    .map(|stored| stored.employee_links())
                    .unwrap_or_default()
            };
            if doc.employee_links() != stored_links {
                return Err(EngineError::EmployeeLinksChanged {
                    collection: T::COLLECTION,
                    id: doc.id(),
                });
            }

            if doc.id() == 0 {
                doc.set_id(store.next_id::<T>()?);
            }
            store.save(&mut doc)?;
            Ok(doc)
        })
    }

    pub fn audit(&self) -> EngineResult<AuditReport> {
        self.read(|store| Ok(audit(&store)?))
    }
}
