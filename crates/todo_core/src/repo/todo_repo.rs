//! Task/category repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD over the `tasks` and `categories` tables.
//! - Publish a store revision after every committed write.
//!
//! # Invariants
//! - All statements run under one store-wide lock, so writes never
//!   interleave and reads see either the pre- or post-write record.
//! - Updates replace every column of the target row.
//! - `modify_task` reads and writes inside one immediate transaction.
//! - Read paths reject invalid persisted rows instead of masking them.
//! - Deleting a category clears `tasks.category_id`; tasks are kept.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::category::{Category, CategoryDraft, CategoryId, CategoryValidationError};
use crate::model::task::{Task, TaskDraft, TaskId, TaskValidationError};
use crate::repo::convert::{
    bool_to_int, date_to_db, parse_bool, parse_date, parse_time, time_to_db,
};
use log::{debug, warn};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

const TASK_SELECT_SQL: &str = "SELECT
    id,
    description,
    details,
    done,
    start_date,
    time,
    category_id
FROM tasks";

const CATEGORY_SELECT_SQL: &str = "SELECT id, name, color_tag FROM categories";

pub type RepoResult<T> = Result<T, RepoError>;

/// Entity addressed by a failed lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Task(TaskId),
    Category(CategoryId),
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Task(id) => write!(f, "task {id}"),
            Self::Category(id) => write!(f, "category {id}"),
        }
    }
}

/// Repository error for task/category persistence and queries.
#[derive(Debug)]
pub enum RepoError {
    TaskValidation(TaskValidationError),
    CategoryValidation(CategoryValidationError),
    NotFound(EntityRef),
    /// Another category already uses this name (case-insensitive).
    DuplicateCategoryName(String),
    Db(DbError),
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    /// A previous holder of the store lock panicked.
    LockPoisoned,
    /// The blocking worker running the query was cancelled or panicked.
    Interrupted(String),
}

impl RepoError {
    /// Bad input shape; nothing reached storage.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::TaskValidation(_) | Self::CategoryValidation(_) | Self::DuplicateCategoryName(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TaskValidation(err) => write!(f, "{err}"),
            Self::CategoryValidation(err) => write!(f, "{err}"),
            Self::NotFound(entity) => write!(f, "{entity} not found"),
            Self::DuplicateCategoryName(name) => {
                write!(f, "category name already in use: `{name}`")
            }
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::LockPoisoned => write!(f, "store lock poisoned by an earlier panic"),
            Self::Interrupted(message) => write!(f, "store call interrupted: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::TaskValidation(err) => Some(err),
            Self::CategoryValidation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TaskValidationError> for RepoError {
    fn from(value: TaskValidationError) -> Self {
        Self::TaskValidation(value)
    }
}

impl From<CategoryValidationError> for RepoError {
    fn from(value: CategoryValidationError) -> Self {
        Self::CategoryValidation(value)
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

/// Filter options for one-shot task reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskListQuery {
    pub category_id: Option<CategoryId>,
    pub done: Option<bool>,
}

impl TaskListQuery {
    pub fn in_category(category_id: CategoryId) -> Self {
        Self {
            category_id: Some(category_id),
            done: None,
        }
    }
}

/// Repository interface for task and category storage.
pub trait TodoRepository {
    fn create_task(&self, draft: &TaskDraft) -> RepoResult<TaskId>;
    fn update_task(&self, task: &Task) -> RepoResult<()>;
    /// Reads, edits and writes back one task in a single write transaction,
    /// so no other write lands between the read and the write.
    ///
    /// `edit` runs under the store lock and must not call back into the
    /// store. The id cannot be changed.
    fn modify_task<F>(&self, id: TaskId, edit: F) -> RepoResult<Task>
    where
        F: FnOnce(&mut Task) -> RepoResult<()>;
    fn delete_task(&self, id: TaskId) -> RepoResult<()>;
    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>>;
    /// Lists tasks in insertion order.
    fn list_tasks(&self, query: &TaskListQuery) -> RepoResult<Vec<Task>>;

    fn create_category(&self, draft: &CategoryDraft) -> RepoResult<CategoryId>;
    fn update_category(&self, category: &Category) -> RepoResult<()>;
    /// Deletes the category and clears it from every task that referenced it.
    fn delete_category(&self, id: CategoryId) -> RepoResult<()>;
    fn get_category(&self, id: CategoryId) -> RepoResult<Option<Category>>;
    fn list_categories(&self) -> RepoResult<Vec<Category>>;

    /// Store revision, bumped once per committed write.
    fn changes(&self) -> watch::Receiver<u64>;
}

/// SQLite-backed task/category store.
#[derive(Debug)]
pub struct SqliteTodoStore {
    conn: Mutex<Connection>,
    revision: watch::Sender<u64>,
}

impl SqliteTodoStore {
    /// Wraps a migrated connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations were not applied.
    /// - `MissingRequiredTable` when `tasks` or `categories` is absent.
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        ensure_connection_ready(&conn)?;
        let (revision, _) = watch::channel(0);
        Ok(Self {
            conn: Mutex::new(conn),
            revision,
        })
    }

    /// Opens (creating if needed) and migrates a database file.
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        Self::try_new(open_db(path)?)
    }

    pub fn open_in_memory() -> RepoResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    /// Current store revision.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Runs a read against the raw connection under the store lock.
    ///
    /// Writes made here bypass validation and do not notify observers.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> RepoResult<T> {
        let conn = self.lock()?;
        Ok(f(&conn)?)
    }

    fn lock(&self) -> RepoResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| RepoError::LockPoisoned)
    }

    fn committed(&self, event: &str) {
        self.revision.send_modify(|revision| *revision += 1);
        debug!(
            "event={event} module=repo status=ok revision={}",
            self.revision()
        );
    }
}

impl TodoRepository for SqliteTodoStore {
    fn create_task(&self, draft: &TaskDraft) -> RepoResult<TaskId> {
        draft.validate()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if let Some(category_id) = draft.category_id {
            ensure_category_exists(&tx, category_id)?;
        }
        tx.execute(
            "INSERT INTO tasks (
                description,
                details,
                done,
                start_date,
                time,
                category_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                draft.description.as_str(),
                draft.details.as_deref(),
                bool_to_int(draft.done),
                draft.start_date.map(date_to_db),
                draft.time.map(time_to_db),
                draft.category_id,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        drop(conn);

        self.committed("task_create");
        Ok(id)
    }

    fn update_task(&self, task: &Task) -> RepoResult<()> {
        task.validate()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        write_task(&tx, task)?;
        tx.commit()?;
        drop(conn);

        self.committed("task_update");
        Ok(())
    }

    fn modify_task<F>(&self, id: TaskId, edit: F) -> RepoResult<Task>
    where
        F: FnOnce(&mut Task) -> RepoResult<()>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut task = select_task(&tx, id)?.ok_or(RepoError::NotFound(EntityRef::Task(id)))?;
        edit(&mut task)?;
        task.id = id;
        task.validate()?;
        write_task(&tx, &task)?;
        tx.commit()?;
        drop(conn);

        self.committed("task_modify");
        Ok(task)
    }

    fn delete_task(&self, id: TaskId) -> RepoResult<()> {
        let changed = self
            .lock()?
            .execute("DELETE FROM tasks WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::NotFound(EntityRef::Task(id)));
        }

        self.committed("task_delete");
        Ok(())
    }

    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>> {
        select_task(&*self.lock()?, id)
    }

    fn list_tasks(&self, query: &TaskListQuery) -> RepoResult<Vec<Task>> {
        let mut sql = format!("{TASK_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(category_id) = query.category_id {
            sql.push_str(" AND category_id = ?");
            bind_values.push(Value::Integer(category_id));
        }
        if let Some(done) = query.done {
            sql.push_str(" AND done = ?");
            bind_values.push(Value::Integer(bool_to_int(done)));
        }
        sql.push_str(" ORDER BY id ASC");

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        Ok(tasks)
    }

    fn create_category(&self, draft: &CategoryDraft) -> RepoResult<CategoryId> {
        draft.validate()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_category_name_free(&tx, &draft.name, None)?;
        tx.execute(
            "INSERT INTO categories (name, color_tag) VALUES (?1, ?2);",
            params![draft.name.as_str(), draft.color_tag.as_deref()],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        drop(conn);

        self.committed("category_create");
        Ok(id)
    }

    fn update_category(&self, category: &Category) -> RepoResult<()> {
        category.validate()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !row_exists(&tx, "categories", category.id)? {
            return Err(RepoError::NotFound(EntityRef::Category(category.id)));
        }
        ensure_category_name_free(&tx, &category.name, Some(category.id))?;
        tx.execute(
            "UPDATE categories SET name = ?1, color_tag = ?2 WHERE id = ?3;",
            params![
                category.name.as_str(),
                category.color_tag.as_deref(),
                category.id
            ],
        )?;
        tx.commit()?;
        drop(conn);

        self.committed("category_update");
        Ok(())
    }

    fn delete_category(&self, id: CategoryId) -> RepoResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        // Mirrors `ON DELETE SET NULL` so the policy holds even when
        // foreign keys were disabled on this connection.
        let detached = tx.execute(
            "UPDATE tasks SET category_id = NULL WHERE category_id = ?1;",
            [id],
        )?;
        let changed = tx.execute("DELETE FROM categories WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::NotFound(EntityRef::Category(id)));
        }
        tx.commit()?;
        drop(conn);

        debug!("event=category_delete module=repo status=ok detached_tasks={detached}");
        self.committed("category_delete");
        Ok(())
    }

    fn get_category(&self, id: CategoryId) -> RepoResult<Option<Category>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{CATEGORY_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_category_row(row)?));
        }
        Ok(None)
    }

    fn list_categories(&self) -> RepoResult<Vec<Category>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{CATEGORY_SELECT_SQL} ORDER BY id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut categories = Vec::new();
        while let Some(row) = rows.next()? {
            categories.push(parse_category_row(row)?);
        }
        Ok(categories)
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}

fn select_task(conn: &Connection, id: TaskId) -> RepoResult<Option<Task>> {
    let mut stmt = conn.prepare(&format!("{TASK_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_task_row(row)?));
    }
    Ok(None)
}

/// Full-record replace inside an open write transaction.
fn write_task(tx: &Transaction<'_>, task: &Task) -> RepoResult<()> {
    if let Some(category_id) = task.category_id {
        if !row_exists(tx, "tasks", task.id)? {
            return Err(RepoError::NotFound(EntityRef::Task(task.id)));
        }
        ensure_category_exists(tx, category_id)?;
    }
    let changed = tx.execute(
        "UPDATE tasks
         SET
            description = ?1,
            details = ?2,
            done = ?3,
            start_date = ?4,
            time = ?5,
            category_id = ?6
         WHERE id = ?7;",
        params![
            task.description.as_str(),
            task.details.as_deref(),
            bool_to_int(task.done),
            task.start_date.map(date_to_db),
            task.time.map(time_to_db),
            task.category_id,
            task.id,
        ],
    )?;
    if changed == 0 {
        return Err(RepoError::NotFound(EntityRef::Task(task.id)));
    }
    Ok(())
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let id: TaskId = row.get("id")?;

    let done_value: i64 = row.get("done")?;
    let done = parse_bool(done_value).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid done value `{done_value}` in tasks.done"))
    })?;

    let start_date = match row.get::<_, Option<String>>("start_date")? {
        Some(value) => Some(parse_date(&value).ok_or_else(|| {
            RepoError::InvalidData(format!("invalid date `{value}` in tasks.start_date"))
        })?),
        None => None,
    };

    let time = match row.get::<_, Option<String>>("time")? {
        Some(value) => Some(parse_time(&value).ok_or_else(|| {
            RepoError::InvalidData(format!("invalid time `{value}` in tasks.time"))
        })?),
        None => None,
    };

    let task = Task {
        id,
        description: row.get("description")?,
        details: row.get("details")?,
        done,
        start_date,
        time,
        category_id: row.get("category_id")?,
    };
    task.validate().map_err(|err| {
        warn!("event=task_read module=repo status=error task_id={id} error={err}");
        RepoError::InvalidData(format!("task {id} violates invariant: {err}"))
    })?;
    Ok(task)
}

fn parse_category_row(row: &Row<'_>) -> RepoResult<Category> {
    let category = Category {
        id: row.get("id")?,
        name: row.get("name")?,
        color_tag: row.get("color_tag")?,
    };
    category.validate().map_err(|err| {
        RepoError::InvalidData(format!("category {} violates invariant: {err}", category.id))
    })?;
    Ok(category)
}

fn ensure_category_exists(tx: &Transaction<'_>, category_id: CategoryId) -> RepoResult<()> {
    if row_exists(tx, "categories", category_id)? {
        Ok(())
    } else {
        Err(RepoError::NotFound(EntityRef::Category(category_id)))
    }
}

fn ensure_category_name_free(
    tx: &Transaction<'_>,
    name: &str,
    except: Option<CategoryId>,
) -> RepoResult<()> {
    let wanted = normalize_category_name(name);
    let mut stmt = tx.prepare("SELECT id, name FROM categories;")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let id: CategoryId = row.get(0)?;
        let existing: String = row.get(1)?;
        if Some(id) != except && normalize_category_name(&existing) == wanted {
            return Err(RepoError::DuplicateCategoryName(name.trim().to_string()));
        }
    }
    Ok(())
}

/// Comparison key for category uniqueness.
pub fn normalize_category_name(name: &str) -> String {
    name.trim().to_lowercase()
}

fn row_exists(conn: &Connection, table: &'static str, id: i64) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1);"),
        [id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in ["categories", "tasks"] {
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
