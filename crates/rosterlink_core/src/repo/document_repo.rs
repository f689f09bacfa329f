//! Document store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide typed CRUD and query APIs over one table per collection.
//! - Keep SQL and JSON path details inside the persistence boundary.
//!
//! # Invariants
//! - Each row stores one JSON document plus a storage `version`.
//! - Versioned writes (`version > 0`) are conditional on the stored version.
//! - Read paths reject undecodable documents instead of masking them.
//! - The store never touches a document other than the one addressed; keeping
//!   both sides of a relationship in sync is the reconciler's job.

use crate::db::DbError;
use crate::model::{Collection, Document, EntityId};
use crate::repo::id_allocator;
use crate::repo::query::{is_valid_field_name, json_path, ArrayMatcher, FieldUpdates, Page};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for document persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound {
        collection: Collection,
        id: EntityId,
    },
    /// Stored version moved since the document was read.
    VersionConflict {
        collection: Collection,
        id: EntityId,
        expected: u64,
    },
    /// Query arguments are outside the accepted domain.
    InvalidQuery(String),
    /// Required table is missing on the provided connection.
    MissingRequiredTable(&'static str),
    InvalidData(String),
}

impl RepoError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_unavailable())
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { collection, id } => {
                write!(f, "{} not found: {id}", collection.entity_name())
            }
            Self::VersionConflict {
                collection,
                id,
                expected,
            } => write!(
                f,
                "{} {id} was modified concurrently (expected version {expected})",
                collection.entity_name()
            ),
            Self::InvalidQuery(message) => write!(f, "invalid query: {message}"),
            Self::MissingRequiredTable(table) => {
                write!(f, "document store requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted document: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Storage capability used by the reconciler and services.
///
/// Implementations only read, write and delete single documents; they do not
/// provide cross-document atomicity on their own.
pub trait EntityStore {
    fn get<T: Document>(&self, id: EntityId) -> RepoResult<Option<T>>;
    /// Returns every document ordered by id.
    fn list<T: Document>(&self) -> RepoResult<Vec<T>>;
    /// Returns the documents that exist among `ids`, ordered by id.
    ///
    /// Missing ids are dropped silently; compare lengths to detect them.
    fn get_many<T: Document>(&self, ids: &[EntityId]) -> RepoResult<Vec<T>>;
    /// Inserts or overwrites the whole document and advances its version.
    fn save<T: Document>(&self, doc: &mut T) -> RepoResult<()>;
    /// Overwrites only the named top-level fields.
    fn update_fields<T: Document>(&self, id: EntityId, updates: &FieldUpdates)
        -> RepoResult<()>;
    /// Removes one document. Returns `false` when nothing was stored.
    fn delete<T: Document>(&self, id: EntityId) -> RepoResult<bool>;
    /// Substring match on `name`. A blank needle returns the full collection.
    ///
    /// Case folding uses SQLite `lower()`, which folds ASCII letters only:
    /// `"ann"` finds `"ANN"`, but `"öl"` does not find `"Ölaf"`.
    fn find_by_name_contains<T: Document>(
        &self,
        needle: &str,
        case_insensitive: bool,
    ) -> RepoResult<Vec<T>>;
    /// Case-insensitive (ASCII only) name match, one page at a time.
    ///
    /// `page_number` is 1-based. `page_size = None` returns every match on a
    /// single page.
    fn find_page<T: Document>(
        &self,
        needle: &str,
        page_number: u32,
        page_size: Option<u32>,
    ) -> RepoResult<Page<T>>;
    fn find_where_array_contains<T: Document>(
        &self,
        field: &str,
        matcher: &ArrayMatcher,
    ) -> RepoResult<Vec<T>>;
    /// Allocates the next id for `T`'s collection.
    fn next_id<T: Document>(&self) -> RepoResult<EntityId>;
}

/// SQLite-backed document store.
///
/// Borrowing a `Transaction` works too, since it derefs to `Connection`.
#[derive(Clone, Copy)]
pub struct SqliteStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStore<'conn> {
    /// Creates a store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_store_connection_ready(conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }
}

impl EntityStore for SqliteStore<'_> {
    fn get<T: Document>(&self, id: EntityId) -> RepoResult<Option<T>> {
        let table = T::COLLECTION.table_name();
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT id, doc, version FROM {table} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_document_row(row)?));
        }
        Ok(None)
    }

    fn list<T: Document>(&self) -> RepoResult<Vec<T>> {
        let table = T::COLLECTION.table_name();
        query_documents(
            self.conn,
            &format!("SELECT id, doc, version FROM {table} ORDER BY id ASC;"),
            Vec::new(),
        )
    }

    fn get_many<T: Document>(&self, ids: &[EntityId]) -> RepoResult<Vec<T>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let table = T::COLLECTION.table_name();
        let placeholders = vec!["?"; ids.len()].join(", ");
        let bind_values = ids.iter().map(|id| SqlValue::Integer(*id)).collect();
        query_documents(
            self.conn,
            &format!(
                "SELECT id, doc, version FROM {table}
                 WHERE id IN ({placeholders})
                 ORDER BY id ASC;"
            ),
            bind_values,
        )
    }

    fn save<T: Document>(&self, doc: &mut T) -> RepoResult<()> {
        let collection = T::COLLECTION;
        let table = collection.table_name();
        let id = doc.id();
        if id <= 0 {
            return Err(RepoError::InvalidQuery(format!(
                "{} id must be positive, got {id}",
                collection.entity_name()
            )));
        }
        let body = encode_document(doc)?;

        let stored_version: Option<i64> = if doc.version() == 0 {
            self.conn
                .query_row(
                    &format!(
                        "INSERT INTO {table} (id, doc, version) VALUES (?1, ?2, 1)
                         ON CONFLICT(id) DO UPDATE SET
                            doc = excluded.doc,
                            version = version + 1
                         RETURNING version;"
                    ),
                    params![id, body],
                    |row| row.get(0),
                )
                .optional()?
        } else {
            self.conn
                .query_row(
                    &format!(
                        "UPDATE {table}
                         SET doc = ?2, version = version + 1
                         WHERE id = ?1 AND version = ?3
                         RETURNING version;"
                    ),
                    params![id, body, version_to_db(doc.version())?],
                    |row| row.get(0),
                )
                .optional()?
        };

        match stored_version {
            Some(version) => {
                doc.set_version(version_from_db(version)?);
                Ok(())
            }
            None if row_exists(self.conn, table, id)? => Err(RepoError::VersionConflict {
                collection,
                id,
                expected: doc.version(),
            }),
            None => Err(RepoError::NotFound { collection, id }),
        }
    }

    fn update_fields<T: Document>(
        &self,
        id: EntityId,
        updates: &FieldUpdates,
    ) -> RepoResult<()> {
        let collection = T::COLLECTION;
        if updates.is_empty() {
            return if row_exists(self.conn, collection.table_name(), id)? {
                Ok(())
            } else {
                Err(RepoError::NotFound { collection, id })
            };
        }

        let mut set_args = Vec::new();
        let mut bind_values = Vec::new();
        for (field, value) in updates.iter() {
            if !is_valid_field_name(field) || field == "id" {
                return Err(RepoError::InvalidQuery(format!(
                    "field `{field}` cannot be updated"
                )));
            }
            set_args.push("?, json(?)");
            bind_values.push(SqlValue::Text(json_path(field)));
            bind_values.push(SqlValue::Text(value.to_string()));
        }

        bind_values.push(SqlValue::Integer(id));

        let table = collection.table_name();
        let sql = format!(
            "UPDATE {table}
             SET doc = json_set(doc, {}), version = version + 1
             WHERE id = ?;",
            set_args.join(", ")
        );
        let changed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        if changed == 0 {
            return Err(RepoError::NotFound { collection, id });
        }
        Ok(())
    }

    fn delete<T: Document>(&self, id: EntityId) -> RepoResult<bool> {
        let table = T::COLLECTION.table_name();
        let changed = self
            .conn
            .execute(&format!("DELETE FROM {table} WHERE id = ?1;"), [id])?;
        Ok(changed > 0)
    }

    fn find_by_name_contains<T: Document>(
        &self,
        needle: &str,
        case_insensitive: bool,
    ) -> RepoResult<Vec<T>> {
        let needle = needle.trim();
        if needle.is_empty() {
            return self.list();
        }

        let table = T::COLLECTION.table_name();
        let filter = name_filter_sql(case_insensitive);
        query_documents(
            self.conn,
            &format!("SELECT id, doc, version FROM {table} WHERE {filter} ORDER BY id ASC;"),
            vec![SqlValue::Text(needle.to_string())],
        )
    }

    fn find_page<T: Document>(
        &self,
        needle: &str,
        page_number: u32,
        page_size: Option<u32>,
    ) -> RepoResult<Page<T>> {
        if page_number == 0 {
            return Err(RepoError::InvalidQuery(
                "page number starts at 1".to_string(),
            ));
        }
        if page_size == Some(0) {
            return Err(RepoError::InvalidQuery(
                "page size must be at least 1".to_string(),
            ));
        }

        let table = T::COLLECTION.table_name();
        let needle = needle.trim();
        let (where_sql, mut bind_values) = if needle.is_empty() {
            (String::new(), Vec::new())
        } else {
            (
                format!(" WHERE {}", name_filter_sql(true)),
                vec![SqlValue::Text(needle.to_string())],
            )
        };

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {table}{where_sql};"),
            params_from_iter(bind_values.iter()),
            |row| row.get(0),
        )?;
        let total = u64::try_from(total)
            .map_err(|_| RepoError::InvalidData(format!("negative row count {total}")))?;

        let mut sql = format!("SELECT id, doc, version FROM {table}{where_sql} ORDER BY id ASC");
        let applied_size = match page_size {
            Some(size) => {
                // Boundary is 1-based, storage offset is 0-based.
                let offset = i64::from(page_number - 1) * i64::from(size);
                sql.push_str(" LIMIT ? OFFSET ?");
                bind_values.push(SqlValue::Integer(i64::from(size)));
                bind_values.push(SqlValue::Integer(offset));
                size
            }
            None => u32::try_from(total).unwrap_or(u32::MAX),
        };

        let items = query_documents(self.conn, &sql, bind_values)?;
        Ok(Page {
            items,
            total,
            page_number,
            page_size: applied_size,
        })
    }

    fn find_where_array_contains<T: Document>(
        &self,
        field: &str,
        matcher: &ArrayMatcher,
    ) -> RepoResult<Vec<T>> {
        if !is_valid_field_name(field) {
            return Err(RepoError::InvalidQuery(format!(
                "field `{field}` is not a valid array field"
            )));
        }

        let table = T::COLLECTION.table_name();
        let mut bind_values = vec![SqlValue::Text(json_path(field))];
        let element_filter = match matcher {
            ArrayMatcher::Equals(id) => {
                bind_values.push(SqlValue::Integer(*id));
                "elem.value = ?".to_string()
            }
            ArrayMatcher::ElementMatch(predicates) => {
                if predicates.is_empty() {
                    return Err(RepoError::InvalidQuery(
                        "element match needs at least one predicate".to_string(),
                    ));
                }
                let mut clauses = Vec::with_capacity(predicates.len());
                for predicate in predicates {
                    if !is_valid_field_name(&predicate.key) {
                        return Err(RepoError::InvalidQuery(format!(
                            "key `{}` is not a valid element key",
                            predicate.key
                        )));
                    }
                    clauses.push(format!(
                        "json_extract(elem.value, ?) {} ?",
                        predicate.op.sql_operator()
                    ));
                    bind_values.push(SqlValue::Text(json_path(&predicate.key)));
                    bind_values.push(SqlValue::Integer(predicate.value));
                }
                format!("elem.type = 'object' AND {}", clauses.join(" AND "))
            }
        };

        query_documents(
            self.conn,
            &format!(
                "SELECT id, doc, version FROM {table}
                 WHERE EXISTS (
                    SELECT 1 FROM json_each({table}.doc, ?) AS elem
                    WHERE {element_filter}
                 )
                 ORDER BY id ASC;"
            ),
            bind_values,
        )
    }

    fn next_id<T: Document>(&self) -> RepoResult<EntityId> {
        id_allocator::allocate(self.conn, T::COLLECTION)
    }
}

// `lower()` without ICU leaves non-ASCII letters unchanged.
fn name_filter_sql(case_insensitive: bool) -> &'static str {
    if case_insensitive {
        "instr(lower(json_extract(doc, '$.name')), lower(?)) > 0"
    } else {
        "instr(json_extract(doc, '$.name'), ?) > 0"
    }
}

fn query_documents<T: Document>(
    conn: &Connection,
    sql: &str,
    bind_values: Vec<SqlValue>,
) -> RepoResult<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut docs = Vec::new();
    while let Some(row) = rows.next()? {
        docs.push(parse_document_row(row)?);
    }
    Ok(docs)
}

fn parse_document_row<T: Document>(row: &Row<'_>) -> RepoResult<T> {
    let table = T::COLLECTION.table_name();
    let id: EntityId = row.get("id")?;
    let body: String = row.get("doc")?;
    let mut doc: T = serde_json::from_str(&body).map_err(|err| {
        RepoError::InvalidData(format!("undecodable document {id} in {table}.doc: {err}"))
    })?;
    if doc.id() != id {
        return Err(RepoError::InvalidData(format!(
            "document id {} does not match row id {id} in {table}",
            doc.id()
        )));
    }
    doc.set_version(version_from_db(row.get("version")?)?);
    Ok(doc)
}

fn encode_document<T: Document>(doc: &T) -> RepoResult<String> {
    serde_json::to_string(doc).map_err(|err| {
        RepoError::InvalidData(format!(
            "cannot encode {} {}: {err}",
            T::COLLECTION.entity_name(),
            doc.id()
        ))
    })
}

fn version_from_db(value: i64) -> RepoResult<u64> {
    u64::try_from(value).map_err(|_| RepoError::InvalidData(format!("negative version {value}")))
}

fn version_to_db(value: u64) -> RepoResult<i64> {
    i64::try_from(value).map_err(|_| RepoError::InvalidData(format!("version {value} overflows")))
}

fn row_exists(conn: &Connection, table: &str, id: EntityId) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1);"),
        [id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn ensure_store_connection_ready(conn: &Connection) -> RepoResult<()> {
    for table in Collection::ALL
        .iter()
        .map(|collection| collection.table_name())
        .chain(std::iter::once(id_allocator::COUNTER_TABLE))
    {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
