//! Reactive read queries over a `TodoRepository`.
//!
//! An observer yields the current snapshot on its first `next()` and a fresh
//! snapshot after every committed write. Writes that land between two
//! `next()` calls collapse into one snapshot of the latest state.
//! Dropping an observer and creating a new one restarts the sequence.
//! Observers hold the store weakly; the sequence ends once every other
//! handle to the store is gone.

use crate::model::category::{Category, CategoryId};
use crate::model::task::Task;
use crate::repo::todo_repo::{RepoError, RepoResult, TaskListQuery, TodoRepository};
use log::warn;
use std::sync::{Arc, Weak};
use tokio::sync::watch;

/// Yields `None` once the store has been dropped.
type SnapshotQuery<T> = Arc<dyn Fn() -> Option<RepoResult<Vec<T>>> + Send + Sync>;

/// Sequence of list snapshots driven by store revisions.
pub struct SnapshotObserver<T> {
    changes: watch::Receiver<u64>,
    query: SnapshotQuery<T>,
    primed: bool,
}

impl<T: Send + 'static> SnapshotObserver<T> {
    fn new(changes: watch::Receiver<u64>, query: SnapshotQuery<T>) -> Self {
        Self {
            changes,
            query,
            primed: false,
        }
    }

    /// Waits for the next snapshot.
    ///
    /// Returns `None` once the store has been dropped; until then every
    /// call eventually yields a snapshot. The query runs on the blocking pool
    /// so the caller's runtime thread is never held.
    pub async fn next(&mut self) -> Option<RepoResult<Vec<T>>> {
        if self.primed {
            self.changes.changed().await.ok()?;
        } else {
            self.primed = true;
        }
        self.changes.borrow_and_update();

        let query = Arc::clone(&self.query);
        match tokio::task::spawn_blocking(move || query()).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("event=observe module=repo status=error error={err}");
                Some(Err(RepoError::Interrupted(err.to_string())))
            }
        }
    }

    /// Revision of the store state the last snapshot was taken from.
    pub fn last_revision(&self) -> u64 {
        *self.changes.borrow()
    }
}

/// All tasks in insertion order.
pub fn observe_tasks<R>(repo: &Arc<R>) -> SnapshotObserver<Task>
where
    R: TodoRepository + Send + Sync + 'static,
{
    observe_task_query(repo, TaskListQuery::default())
}

/// Tasks assigned to `category_id`, in insertion order.
pub fn observe_tasks_by_category<R>(repo: &Arc<R>, category_id: CategoryId) -> SnapshotObserver<Task>
where
    R: TodoRepository + Send + Sync + 'static,
{
    observe_task_query(repo, TaskListQuery::in_category(category_id))
}

/// Tasks matching an arbitrary list query.
pub fn observe_task_query<R>(repo: &Arc<R>, query: TaskListQuery) -> SnapshotObserver<Task>
where
    R: TodoRepository + Send + Sync + 'static,
{
    let source: Weak<R> = Arc::downgrade(repo);
    SnapshotObserver::new(
        repo.changes(),
        Arc::new(move || source.upgrade().map(|store| store.list_tasks(&query))),
    )
}

/// All categories in insertion order.
pub fn observe_categories<R>(repo: &Arc<R>) -> SnapshotObserver<Category>
where
    R: TodoRepository + Send + Sync + 'static,
{
    let source: Weak<R> = Arc::downgrade(repo);
    SnapshotObserver::new(
        repo.changes(),
        Arc::new(move || source.upgrade().map(|store| store.list_categories())),
    )
}
