//! Task domain model.
//!
//! # Responsibility
//! - Define the canonical task record and its creation draft.
//! - Keep the date/time scheduling rules in one place.
//!
//! # Invariants
//! - `description` is non-empty after trimming.
//! - `time.is_some()` implies `start_date.is_some()`.
//! - `id` is assigned by the store and immutable afterwards.

use crate::model::category::CategoryId;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned task identifier.
pub type TaskId = i64;

/// Validation errors for task writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskValidationError {
    /// Description is empty after trimming.
    EmptyDescription,
    /// A time of day is set while the start date is not.
    TimeWithoutDate,
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyDescription => write!(f, "task description must not be blank"),
            Self::TimeWithoutDate => write!(f, "task time requires a start date"),
        }
    }
}

impl Error for TaskValidationError {}

/// Persisted task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub details: Option<String>,
    pub done: bool,
    pub start_date: Option<NaiveDate>,
    /// Only meaningful when `start_date` is set.
    pub time: Option<NaiveTime>,
    /// Weak reference; cleared when the category is deleted.
    pub category_id: Option<CategoryId>,
}

impl Task {
    /// Builds the stored shape of a draft once the store has assigned an id.
    pub fn from_draft(id: TaskId, draft: TaskDraft) -> Self {
        Self {
            id,
            description: draft.description,
            details: draft.details,
            done: draft.done,
            start_date: draft.start_date,
            time: draft.time,
            category_id: draft.category_id,
        }
    }

    /// Checks write-path invariants.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        validate_fields(&self.description, self.start_date, self.time)
    }

    /// Sets or clears the start date.
    ///
    /// Clearing the date also clears `time`, so the schedule never keeps an
    /// orphaned time of day.
    pub fn set_start_date(&mut self, start_date: Option<NaiveDate>) {
        self.start_date = start_date;
        if self.start_date.is_none() {
            self.time = None;
        }
    }

    /// Sets or clears the time of day.
    ///
    /// # Errors
    /// - `TimeWithoutDate` when a time is given and `start_date` is `None`.
    pub fn set_time(&mut self, time: Option<NaiveTime>) -> Result<(), TaskValidationError> {
        if time.is_some() && self.start_date.is_none() {
            return Err(TaskValidationError::TimeWithoutDate);
        }
        self.time = time;
        Ok(())
    }

    /// Removes both date and time.
    pub fn clear_schedule(&mut self) {
        self.start_date = None;
        self.time = None;
    }

    /// Returns whether the task carries any schedule.
    pub fn is_scheduled(&self) -> bool {
        self.start_date.is_some()
    }
}

/// Creation payload for a task; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskDraft {
    pub description: String,
    pub details: Option<String>,
    pub done: bool,
    pub start_date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub category_id: Option<CategoryId>,
}

impl TaskDraft {
    /// Creates an unscheduled, not-done draft with no details or category.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    /// Assigns the draft to a category.
    pub fn with_category(mut self, category_id: Option<CategoryId>) -> Self {
        self.category_id = category_id;
        self
    }

    /// Checks write-path invariants.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        validate_fields(&self.description, self.start_date, self.time)
    }
}

fn validate_fields(
    description: &str,
    start_date: Option<NaiveDate>,
    time: Option<NaiveTime>,
) -> Result<(), TaskValidationError> {
    if description.trim().is_empty() {
        return Err(TaskValidationError::EmptyDescription);
    }
    if time.is_some() && start_date.is_none() {
        return Err(TaskValidationError::TimeWithoutDate);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Task, TaskDraft, TaskValidationError};
    use chrono::{NaiveDate, NaiveTime};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn draft_defaults_are_unscheduled_and_open() {
        let draft = TaskDraft::new("Buy milk");
        assert!(!draft.done);
        assert!(draft.details.is_none());
        assert!(draft.start_date.is_none());
        assert!(draft.time.is_none());
        assert!(draft.category_id.is_none());
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn blank_description_is_rejected() {
        let draft = TaskDraft::new("   ");
        assert_eq!(draft.validate(), Err(TaskValidationError::EmptyDescription));
    }

    #[test]
    fn time_without_date_is_rejected() {
        let mut draft = TaskDraft::new("standup");
        draft.time = Some(time(9, 0));
        assert_eq!(draft.validate(), Err(TaskValidationError::TimeWithoutDate));
    }

    #[test]
    fn clearing_start_date_cascades_to_time() {
        let mut task = Task::from_draft(1, TaskDraft::new("dentist"));
        task.set_start_date(Some(date(2024, 1, 10)));
        task.set_time(Some(time(9, 0))).unwrap();

        task.set_start_date(None);
        assert!(task.start_date.is_none());
        assert!(task.time.is_none());
        assert!(task.validate().is_ok());
    }

    #[test]
    fn set_time_requires_start_date() {
        let mut task = Task::from_draft(1, TaskDraft::new("dentist"));
        let err = task.set_time(Some(time(9, 0))).unwrap_err();
        assert_eq!(err, TaskValidationError::TimeWithoutDate);
        assert!(task.time.is_none());

        task.set_time(None).unwrap();
    }

    #[test]
    fn clear_schedule_drops_date_and_time() {
        let mut task = Task::from_draft(3, TaskDraft::new("trip"));
        task.set_start_date(Some(date(2024, 5, 1)));
        task.set_time(Some(time(18, 30))).unwrap();
        assert!(task.is_scheduled());

        task.clear_schedule();
        assert!(!task.is_scheduled());
        assert!(task.time.is_none());
    }
}
