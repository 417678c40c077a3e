//! Task controller: the view-model between storage and presentation.
//!
//! # Responsibility
//! - Publish the single-task detail state and cached task/category lists.
//! - Hold the uncommitted date/time picker draft.
//! - Route every mutation through the repository and republish the result.
//!
//! # Invariants
//! - Store calls run on the blocking pool; async callers are never held by
//!   SQLite work.
//! - A load result is published only while it is still the active request.
//! - A failed write leaves previously published state untouched.
//! - `time` without `start_date` never reaches storage.

use crate::model::category::{Category, CategoryDraft, CategoryId};
use crate::model::task::{Task, TaskDraft, TaskId, TaskValidationError};
use crate::repo::todo_repo::{EntityRef, RepoError, RepoResult, TaskListQuery, TodoRepository};
use chrono::{NaiveDate, NaiveTime};
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Observable state of the single-task view.
#[derive(Debug, Clone)]
pub enum TaskDetailState {
    Loading,
    Success(Task),
    Empty,
    Error(Arc<ControllerError>),
}

impl TaskDetailState {
    pub fn task(&self) -> Option<&Task> {
        match self {
            Self::Success(task) => Some(task),
            _ => None,
        }
    }
}

/// Errors from controller operations.
#[derive(Debug)]
pub enum ControllerError {
    /// Input rejected before reaching storage.
    Validation(TaskValidationError),
    TaskNotFound(TaskId),
    /// `confirm` was called without a successfully loaded task.
    NoTaskLoaded,
    Repo(RepoError),
}

impl Display for ControllerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::NoTaskLoaded => write!(f, "no task is loaded"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ControllerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ControllerError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::TaskValidation(err) => Self::Validation(err),
            RepoError::NotFound(EntityRef::Task(id)) => Self::TaskNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<TaskValidationError> for ControllerError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Last failed operation, as published to error subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureNotice {
    pub operation: &'static str,
    pub task_id: Option<TaskId>,
    pub message: String,
}

/// Uncommitted date/time selected in the picker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingSchedule {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
}

impl PendingSchedule {
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.time.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ActiveLoad {
    token: u64,
    task_id: Option<TaskId>,
}

/// Controller over a shared repository.
pub struct TaskController<R> {
    repo: Arc<R>,
    detail: watch::Sender<TaskDetailState>,
    tasks: watch::Sender<Vec<Task>>,
    categories: watch::Sender<Vec<Category>>,
    errors: watch::Sender<Option<FailureNotice>>,
    load_seq: AtomicU64,
    active: Mutex<ActiveLoad>,
    pending: Mutex<PendingSchedule>,
    selected_category: Mutex<Option<CategoryId>>,
}

impl<R> TaskController<R>
where
    R: TodoRepository + Send + Sync + 'static,
{
    pub fn new(repo: Arc<R>) -> Self {
        let (detail, _) = watch::channel(TaskDetailState::Loading);
        let (tasks, _) = watch::channel(Vec::new());
        let (categories, _) = watch::channel(Vec::new());
        let (errors, _) = watch::channel(None);
        Self {
            repo,
            detail,
            tasks,
            categories,
            errors,
            load_seq: AtomicU64::new(0),
            active: Mutex::new(ActiveLoad::default()),
            pending: Mutex::new(PendingSchedule::default()),
            selected_category: Mutex::new(None),
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    pub fn subscribe_detail(&self) -> watch::Receiver<TaskDetailState> {
        self.detail.subscribe()
    }

    pub fn subscribe_tasks(&self) -> watch::Receiver<Vec<Task>> {
        self.tasks.subscribe()
    }

    pub fn subscribe_categories(&self) -> watch::Receiver<Vec<Category>> {
        self.categories.subscribe()
    }

    pub fn subscribe_errors(&self) -> watch::Receiver<Option<FailureNotice>> {
        self.errors.subscribe()
    }

    pub fn detail(&self) -> TaskDetailState {
        self.detail.borrow().clone()
    }

    pub fn pending(&self) -> PendingSchedule {
        *lock(&self.pending)
    }

    /// Loads one task into the detail state.
    ///
    /// Publishes `Loading`, then `Success`, `Empty` (unknown id) or `Error`.
    /// When a newer load starts before this one resolves, this result is
    /// dropped.
    pub async fn load_task_by_id(&self, id: TaskId) {
        let token = self.load_seq.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut active = lock(&self.active);
            *active = ActiveLoad {
                token,
                task_id: Some(id),
            };
            self.detail.send_replace(TaskDetailState::Loading);
        }
        debug!("event=task_load module=controller status=start task_id={id} token={token}");

        let result = self.run(move |repo| repo.get_task(id)).await;

        let active = lock(&self.active);
        if active.token != token || active.task_id != Some(id) {
            debug!("event=task_load module=controller status=stale task_id={id} token={token}");
            return;
        }
        let state = match result {
            Ok(Some(task)) => TaskDetailState::Success(task),
            Ok(None) => TaskDetailState::Empty,
            Err(err) => {
                error!("event=task_load module=controller status=error task_id={id} error={err}");
                TaskDetailState::Error(Arc::new(err))
            }
        };
        self.detail.send_replace(state);
        drop(active);
        debug!("event=task_load module=controller status=ok task_id={id}");
    }

    /// Replaces the stored task with `task`.
    ///
    /// A task whose date was cleared while a time remained gets its time
    /// cleared too; a time on a task that never had a date is rejected.
    pub async fn update_task(&self, task: Task) -> Result<Task, ControllerError> {
        let id = task.id;
        let result = self
            .run(move |repo| {
                repo.modify_task(id, move |stored| {
                    *stored = cascade_schedule(task, stored)?;
                    Ok(())
                })
            })
            .await;
        self.finish_write("update_task", Some(id), result).await
    }

    pub fn set_pending_date(&self, date: NaiveDate) {
        lock(&self.pending).date = Some(date);
    }

    /// Stores a pending time; a date must be pending or already on the task.
    pub fn set_pending_time(&self, time: NaiveTime) -> Result<(), ControllerError> {
        let mut pending = lock(&self.pending);
        let task_has_date = self
            .detail
            .borrow()
            .task()
            .is_some_and(|task| task.start_date.is_some());
        if pending.date.is_none() && !task_has_date {
            return Err(ControllerError::Validation(
                TaskValidationError::TimeWithoutDate,
            ));
        }
        pending.time = Some(time);
        Ok(())
    }

    /// Discards the picker draft; the stored task is untouched.
    pub fn clear_pending(&self) {
        *lock(&self.pending) = PendingSchedule::default();
    }

    /// Commits the picker draft into the loaded task.
    ///
    /// The draft is kept when the write fails so the caller can retry.
    pub async fn confirm(&self) -> Result<Task, ControllerError> {
        let Some(mut task) = self.detail.borrow().task().cloned() else {
            let err = ControllerError::NoTaskLoaded;
            self.report("confirm", None, &err);
            return Err(err);
        };

        let pending = self.pending();
        if let Some(date) = pending.date {
            task.set_start_date(Some(date));
        }
        if let Some(time) = pending.time {
            if let Err(err) = task.set_time(Some(time)) {
                let err = ControllerError::from(err);
                self.report("confirm", Some(task.id), &err);
                return Err(err);
            }
        }

        let updated = self.update_task(task).await?;
        self.clear_pending();
        Ok(updated)
    }

    pub async fn toggle_done(&self, id: TaskId) -> Result<Task, ControllerError> {
        let result = self
            .run(move |repo| {
                repo.modify_task(id, |task| {
                    task.done = !task.done;
                    Ok(())
                })
            })
            .await;
        self.finish_write("toggle_done", Some(id), result).await
    }

    /// Clears date and time on the task and persists it.
    pub async fn reset_task_date_time(&self, id: TaskId) -> Result<Task, ControllerError> {
        let result = self
            .run(move |repo| {
                repo.modify_task(id, |task| {
                    task.clear_schedule();
                    Ok(())
                })
            })
            .await;
        self.finish_write("reset_task_date_time", Some(id), result)
            .await
    }

    pub async fn set_task_category(
        &self,
        id: TaskId,
        category_id: Option<CategoryId>,
    ) -> Result<Task, ControllerError> {
        let result = self
            .run(move |repo| {
                repo.modify_task(id, |task| {
                    task.category_id = category_id;
                    Ok(())
                })
            })
            .await;
        self.finish_write("set_task_category", Some(id), result)
            .await
    }

    pub async fn delete_task(&self, id: TaskId) -> Result<(), ControllerError> {
        if let Err(err) = self.run(move |repo| repo.delete_task(id)).await {
            self.report("delete_task", Some(id), &err);
            return Err(err);
        }
        info!("event=delete_task module=controller status=ok task_id={id}");

        {
            let active = lock(&self.active);
            if active.task_id == Some(id) {
                self.detail.send_replace(TaskDetailState::Empty);
            }
        }
        self.refresh_after_write().await;
        Ok(())
    }

    /// Creates a task from user input; the description is trimmed.
    pub async fn add_task(
        &self,
        description: &str,
        category_id: Option<CategoryId>,
    ) -> Result<TaskId, ControllerError> {
        let draft = TaskDraft::new(description.trim()).with_category(category_id);
        match self.run(move |repo| repo.create_task(&draft)).await {
            Ok(id) => {
                info!("event=add_task module=controller status=ok task_id={id}");
                self.refresh_after_write().await;
                Ok(id)
            }
            Err(err) => {
                self.report("add_task", None, &err);
                Err(err)
            }
        }
    }

    pub async fn add_category(
        &self,
        name: &str,
        color_tag: Option<String>,
    ) -> Result<CategoryId, ControllerError> {
        let draft = CategoryDraft {
            name: name.trim().to_string(),
            color_tag,
        };
        match self.run(move |repo| repo.create_category(&draft)).await {
            Ok(id) => {
                info!("event=add_category module=controller status=ok category_id={id}");
                self.refresh_after_write().await;
                Ok(id)
            }
            Err(err) => {
                self.report("add_category", None, &err);
                Err(err)
            }
        }
    }

    /// Deletes a category; its tasks stay and lose the reference.
    pub async fn delete_category(&self, id: CategoryId) -> Result<(), ControllerError> {
        if let Err(err) = self.run(move |repo| repo.delete_category(id)).await {
            self.report("delete_category", None, &err);
            return Err(err);
        }
        info!("event=delete_category module=controller status=ok category_id={id}");

        {
            let mut selected = lock(&self.selected_category);
            if *selected == Some(id) {
                *selected = None;
            }
        }
        self.reload_active_task().await;
        self.refresh_after_write().await;
        Ok(())
    }

    /// Filters the cached task list to one category, or shows all tasks.
    pub async fn select_category(
        &self,
        category_id: Option<CategoryId>,
    ) -> Result<(), ControllerError> {
        *lock(&self.selected_category) = category_id;
        self.refresh_tasks().await
    }

    /// Re-reads the task list for the current category filter.
    pub async fn refresh_tasks(&self) -> Result<(), ControllerError> {
        let query = TaskListQuery {
            category_id: *lock(&self.selected_category),
            done: None,
        };
        let tasks = self.run(move |repo| repo.list_tasks(&query)).await?;
        self.tasks.send_replace(tasks);
        Ok(())
    }

    pub async fn refresh_categories(&self) -> Result<(), ControllerError> {
        let categories = self.run(|repo| repo.list_categories()).await?;
        self.categories.send_replace(categories);
        Ok(())
    }

    /// Keeps the cached lists in step with every store write, including
    /// writes made through other handles to the same store.
    ///
    /// The task ends after the controller is dropped and one more write lands.
    pub fn spawn_store_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let mut changes = self.repo.changes();
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let Some(controller) = weak.upgrade() else {
                    break;
                };
                controller.refresh_after_write().await;
            }
        })
    }

    async fn run<T, F>(&self, call: F) -> Result<T, ControllerError>
    where
        T: Send + 'static,
        F: FnOnce(&R) -> RepoResult<T> + Send + 'static,
    {
        let repo = Arc::clone(&self.repo);
        match tokio::task::spawn_blocking(move || call(repo.as_ref())).await {
            Ok(result) => result.map_err(ControllerError::from),
            Err(err) => Err(ControllerError::Repo(RepoError::Interrupted(
                err.to_string(),
            ))),
        }
    }

    async fn finish_write(
        &self,
        operation: &'static str,
        task_id: Option<TaskId>,
        result: Result<Task, ControllerError>,
    ) -> Result<Task, ControllerError> {
        match result {
            Ok(task) => {
                info!("event={operation} module=controller status=ok task_id={}", task.id);
                self.publish_if_active(&task);
                self.refresh_after_write().await;
                Ok(task)
            }
            Err(err) => {
                self.report(operation, task_id, &err);
                Err(err)
            }
        }
    }

    fn publish_if_active(&self, task: &Task) {
        let active = lock(&self.active);
        if active.task_id == Some(task.id) {
            self.detail
                .send_replace(TaskDetailState::Success(task.clone()));
        }
    }

    async fn reload_active_task(&self) {
        let Some(id) = lock(&self.active).task_id else {
            return;
        };
        match self.run(move |repo| repo.get_task(id)).await {
            Ok(Some(task)) => self.publish_if_active(&task),
            Ok(None) => {
                let active = lock(&self.active);
                if active.task_id == Some(id) {
                    self.detail.send_replace(TaskDetailState::Empty);
                }
            }
            Err(err) => self.report("reload_task", Some(id), &err),
        }
    }

    async fn refresh_after_write(&self) {
        if let Err(err) = self.refresh_tasks().await {
            self.report("refresh_tasks", None, &err);
        }
        if let Err(err) = self.refresh_categories().await {
            self.report("refresh_categories", None, &err);
        }
    }

    fn report(&self, operation: &'static str, task_id: Option<TaskId>, err: &ControllerError) {
        match err {
            ControllerError::Validation(_) | ControllerError::NoTaskLoaded => warn!(
                "event={operation} module=controller status=rejected task_id={} error={err}",
                format_task_id(task_id)
            ),
            _ => error!(
                "event={operation} module=controller status=error task_id={} error={err}",
                format_task_id(task_id)
            ),
        }
        self.errors.send_replace(Some(FailureNotice {
            operation,
            task_id,
            message: err.to_string(),
        }));
    }
}

/// Applies the date/time cascade against the stored version of the task.
fn cascade_schedule(mut task: Task, previous: &Task) -> RepoResult<Task> {
    if task.time.is_some() && task.start_date.is_none() {
        if previous.start_date.is_some() {
            task.time = None;
        } else {
            return Err(RepoError::TaskValidation(
                TaskValidationError::TimeWithoutDate,
            ));
        }
    }
    Ok(task)
}

fn format_task_id(task_id: Option<TaskId>) -> String {
    task_id.map_or_else(|| "none".to_string(), |id| id.to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
