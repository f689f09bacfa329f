//! Roster schema migrations.
//!
//! # Responsibility
//! - Create one document table per collection (`id`, JSON `doc`, `version`).
//! - Create the `id_counters` table backing id allocation, plus the name and
//!   task manager expression indexes.
//! - Bring an older roster database up to the latest schema in one
//!   transaction.
//!
//! # Invariants
//! - Steps are numbered from 1 without gaps; a step never changes once
//!   released.
//! - The highest applied step is recorded in `PRAGMA user_version`; a
//!   database newer than this binary is refused, not downgraded.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("0001_init.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("0002_id_counters.sql"),
    },
    Migration {
        version: 3,
        sql: include_str!("0003_tasks.sql"),
    },
];

/// Highest schema step this binary can apply.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies every step above the database's `user_version`.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let applied = schema_step(conn)?;
    let latest = latest_version();
    if applied > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: applied,
            latest_supported: latest,
        });
    }

    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|migration| migration.version > applied)
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in &pending {
        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from={} to={} steps={}",
        applied,
        latest,
        pending.len()
    );
    Ok(())
}

fn schema_step(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}
