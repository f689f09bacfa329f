//! Integer id allocation per collection.
//!
//! # Responsibility
//! - Hand out `max(existing id) + 1` keys, starting at 1 for an empty
//!   collection.
//!
//! # Invariants
//! - Allocation is one conditional upsert on `id_counters`, so two writers
//!   can never receive the same id from the counter.
//! - The counter never moves backwards, even after the highest document is
//!   deleted; ids are not reused.
//! - Documents saved with caller-chosen ids above the counter are honored:
//!   the next allocation jumps past them.
//!
//! A full-scan `max + 1` without this counter races under concurrent
//! creates: both writers read the same max and collide on insert.

use crate::model::{Collection, EntityId};
use crate::repo::document_repo::RepoResult;
use log::debug;
use rusqlite::Connection;

pub(crate) const COUNTER_TABLE: &str = "id_counters";

pub(crate) fn allocate(conn: &Connection, collection: Collection) -> RepoResult<EntityId> {
    let table = collection.table_name();
    let next_from_documents = format!("(SELECT COALESCE(MAX(id), 0) + 1 FROM {table})");
    let id: EntityId = conn.query_row(
        &format!(
            "INSERT INTO {COUNTER_TABLE} (collection, last_id)
             VALUES (?1, {next_from_documents})
             ON CONFLICT(collection) DO UPDATE SET
                last_id = MAX(last_id + 1, {next_from_documents})
             RETURNING last_id;"
        ),
        [table],
        |row| row.get(0),
    )?;

    debug!(
        "event=id_allocate module=repo status=ok collection={} id={}",
        table, id
    );
    Ok(id)
}
