//! Category domain model.
//!
//! # Invariants
//! - `name` is non-empty after trimming.
//! - Names are unique case-insensitively; the store enforces this.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned category identifier.
pub type CategoryId = i64;

/// Validation errors for category writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryValidationError {
    EmptyName,
}

impl Display for CategoryValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "category name must not be blank"),
        }
    }
}

impl Error for CategoryValidationError {}

/// Persisted category record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    /// Opaque display attribute owned by the presentation layer.
    pub color_tag: Option<String>,
}

impl Category {
    pub fn from_draft(id: CategoryId, draft: CategoryDraft) -> Self {
        Self {
            id,
            name: draft.name,
            color_tag: draft.color_tag,
        }
    }

    pub fn validate(&self) -> Result<(), CategoryValidationError> {
        validate_name(&self.name)
    }
}

/// Creation payload for a category.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CategoryDraft {
    pub name: String,
    pub color_tag: Option<String>,
}

impl CategoryDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color_tag: None,
        }
    }

    pub fn validate(&self) -> Result<(), CategoryValidationError> {
        validate_name(&self.name)
    }
}

fn validate_name(name: &str) -> Result<(), CategoryValidationError> {
    if name.trim().is_empty() {
        return Err(CategoryValidationError::EmptyName);
    }
    Ok(())
}
