//! Subject and note domain model.
//!
//! # Responsibility
//! - Define the records stored in the notes schema.
//! - Validate user-editable fields before persistence.
//!
//! # Invariants
//! - Subject titles are trimmed and never blank.
//! - Every note belongs to exactly one subject.
//! - Note order inside a subject is defined by `sort_order` alone.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type SubjectId = Uuid;
pub type NoteId = Uuid;

/// Named collection of notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub title: String,
    pub sort_order: i32,
    /// Epoch milliseconds, set by storage.
    pub created_at: i64,
    /// Epoch milliseconds, set by storage.
    pub updated_at: i64,
}

/// One note inside a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub subject_id: SubjectId,
    pub title: String,
    pub content: String,
    /// Optional display color, e.g. `#ffcc00`.
    pub color: Option<String>,
    pub sort_order: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Note {
    /// Builds an unsaved note. Storage assigns `sort_order` and timestamps.
    pub fn new(subject_id: SubjectId, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id,
            title: title.into(),
            content: content.into(),
            color: None,
            sort_order: 0,
            created_at: 0,
            updated_at: 0,
        }
    }
}

/// Validation failures for subject/note input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectValidationError {
    BlankSubjectTitle,
    BlankNoteTitle,
    InvalidColor(String),
}

impl Display for SubjectValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankSubjectTitle => write!(f, "subject title cannot be blank"),
            Self::BlankNoteTitle => write!(f, "note title cannot be blank"),
            Self::InvalidColor(value) => {
                write!(f, "invalid note color `{value}`; expected #rrggbb")
            }
        }
    }
}

impl Error for SubjectValidationError {}

/// Trims a subject title, rejecting blank input.
pub fn normalize_subject_title(title: &str) -> Result<String, SubjectValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(SubjectValidationError::BlankSubjectTitle);
    }
    Ok(trimmed.to_string())
}

/// Trims a note title, rejecting blank input.
pub fn normalize_note_title(title: &str) -> Result<String, SubjectValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(SubjectValidationError::BlankNoteTitle);
    }
    Ok(trimmed.to_string())
}

/// Normalizes a `#rrggbb` color to lowercase.
pub fn normalize_color(color: &str) -> Result<String, SubjectValidationError> {
    let trimmed = color.trim();
    let valid = trimmed.len() == 7
        && trimmed.starts_with('#')
        && trimmed[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(SubjectValidationError::InvalidColor(color.to_string()));
    }
    Ok(trimmed.to_ascii_lowercase())
}
