//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into UI-facing operations.
//! - Keep presentation layers decoupled from storage details.

pub mod task_controller;
