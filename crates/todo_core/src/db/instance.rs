//! Process-wide shared store handle.
//!
//! # Responsibility
//! - Open the application database once and hand out shared references.
//! - Provide an explicit `shutdown` so hosts can release the file.
//!
//! # Invariants
//! - Concurrent first calls to `init` construct exactly one store.
//! - `init` with the active path returns the existing store.
//! - `init` with another path fails until `shutdown` is called.

use crate::db::DbError;
use crate::repo::todo_repo::{RepoError, RepoResult, SqliteTodoStore};
use log::info;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

static SHARED_STORE: Mutex<Option<SharedStore>> = Mutex::new(None);

struct SharedStore {
    path: PathBuf,
    store: Arc<SqliteTodoStore>,
}

/// Opens the shared store at `path`, or returns it when already open there.
///
/// # Errors
/// - `DbError::InstanceConflict` when another path is active.
/// - Any open/migration failure from the underlying database.
pub fn init(path: impl AsRef<Path>) -> RepoResult<Arc<SqliteTodoStore>> {
    let requested = path.as_ref().to_path_buf();
    let mut slot = lock_slot()?;

    if let Some(shared) = slot.as_ref() {
        if shared.path == requested {
            return Ok(Arc::clone(&shared.store));
        }
        return Err(RepoError::Db(DbError::InstanceConflict {
            active: shared.path.clone(),
            requested,
        }));
    }

    let store = Arc::new(SqliteTodoStore::open(&requested)?);
    info!(
        "event=db_instance module=db status=ok action=init path={}",
        requested.display()
    );
    *slot = Some(SharedStore {
        path: requested,
        store: Arc::clone(&store),
    });
    Ok(store)
}

/// Returns the shared store if `init` has succeeded and no `shutdown` followed.
pub fn instance() -> Option<Arc<SqliteTodoStore>> {
    lock_slot()
        .ok()?
        .as_ref()
        .map(|shared| Arc::clone(&shared.store))
}

/// Path of the active shared store.
pub fn active_path() -> Option<PathBuf> {
    lock_slot()
        .ok()?
        .as_ref()
        .map(|shared| shared.path.clone())
}

/// Releases the shared store.
///
/// Outstanding `Arc` clones keep the connection open until they drop.
/// Returns whether a store was active.
pub fn shutdown() -> bool {
    let released = match lock_slot() {
        Ok(mut slot) => slot.take(),
        Err(_) => None,
    };
    match released {
        Some(shared) => {
            info!(
                "event=db_instance module=db status=ok action=shutdown path={}",
                shared.path.display()
            );
            true
        }
        None => false,
    }
}

fn lock_slot() -> RepoResult<MutexGuard<'static, Option<SharedStore>>> {
    SHARED_STORE.lock().map_err(|_| RepoError::LockPoisoned)
}
