//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the task/category data access contract.
//! - Isolate SQLite query details from controller orchestration.
//! - Turn committed writes into observable snapshot sequences.
//!
//! # Invariants
//! - Write paths validate models before any SQL mutation.
//! - Repository APIs return semantic errors (`NotFound`, duplicates) in
//!   addition to DB transport errors.

mod convert;
pub mod observe;
pub mod todo_repo;
