//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `todo_core` linkage.
//! - Exercise one in-memory store round trip without any UI runtime.

use std::process::ExitCode;
use todo_core::{RepoResult, SqliteTodoStore, TaskDraft, TaskListQuery, TodoRepository};

fn main() -> ExitCode {
    println!("todo_core ping={}", todo_core::ping());
    println!("todo_core version={}", todo_core::core_version());

    match probe_store() {
        Ok(count) => {
            println!("todo_core store=ok tasks={count}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("todo_core store=error error={err}");
            ExitCode::FAILURE
        }
    }
}

fn probe_store() -> RepoResult<usize> {
    let store = SqliteTodoStore::open_in_memory()?;
    store.create_task(&TaskDraft::new("probe task"))?;
    Ok(store.list_tasks(&TaskListQuery::default())?.len())
}
