//! Schema steps for the to-do database.
//!
//! # Responsibility
//! - List the SQL steps that build the `tasks`/`categories` schema.
//! - Bring an older database up to the newest step in one transaction.
//!
//! # Invariants
//! - Step `n` in `SCHEMA_STEPS` is schema version `n + 1`; steps are only
//!   ever appended.
//! - `PRAGMA user_version` holds the last applied step, written inside the
//!   same transaction as the step itself.
//! - A database ahead of this binary is left untouched.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::Connection;

const SCHEMA_STEPS: &[&str] = &[
    include_str!("0001_init.sql"),
    include_str!("0002_task_category_index.sql"),
];

/// Schema version produced by the last known step.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.len() as u32
}

/// Runs every step newer than the database's `user_version`.
///
/// # Errors
/// - `DbError::UnsupportedSchemaVersion` when the file is newer than this
///   binary.
/// - Any SQL failure; the transaction is rolled back and the version kept.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from = current_user_version(conn)?;
    let to = latest_version();
    if from > to {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: to,
        });
    }
    if from == to {
        debug!("event=db_migrate module=db status=skip version={from}");
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (version, sql) in (1..=to).zip(SCHEMA_STEPS).skip(from as usize) {
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        debug!("event=db_migrate module=db status=step version={version}");
    }
    tx.commit()?;

    info!("event=db_migrate module=db status=ok from_version={from} to_version={to}");
    Ok(())
}

/// Schema version recorded in the database header.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
