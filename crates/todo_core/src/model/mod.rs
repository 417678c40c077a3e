//! To-do domain model.
//!
//! # Responsibility
//! - Define the task and category records shared by store and controller.
//! - Own the validation rules every write path must enforce.
//!
//! # Invariants
//! - Ids are assigned by the store and never reused.
//! - A task time is only meaningful together with a start date.

pub mod category;
pub mod task;
