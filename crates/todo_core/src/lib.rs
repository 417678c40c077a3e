//! Core domain logic for the to-do app.
//! This crate is the single source of truth for task and category invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{bootstrap, ConfigError, CoreConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::category::{Category, CategoryDraft, CategoryId, CategoryValidationError};
pub use model::task::{Task, TaskDraft, TaskId, TaskValidationError};
pub use repo::observe::{
    observe_categories, observe_task_query, observe_tasks, observe_tasks_by_category,
    SnapshotObserver,
};
pub use repo::todo_repo::{
    EntityRef, RepoError, RepoResult, SqliteTodoStore, TaskListQuery, TodoRepository,
};
pub use service::task_controller::{
    ControllerError, FailureNotice, PendingSchedule, TaskController, TaskDetailState,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
