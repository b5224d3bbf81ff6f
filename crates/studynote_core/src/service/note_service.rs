//! Subject/note use-case service.
//!
//! # Responsibility
//! - Provide subject and note CRUD for the notes screens.
//! - Validate input before it reaches the repository.
//!
//! # Invariants
//! - Reorder requests must not repeat an id.
//! - Note colors are stored normalized (`#rrggbb`, lowercase).

use crate::model::subject::{
    normalize_color, Note, NoteId, Subject, SubjectId, SubjectValidationError,
};
use crate::repo::subject_repo::SubjectRepository;
use crate::repo::RepoError;
use log::info;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Service error for subject/note use-cases.
#[derive(Debug)]
pub enum NoteServiceError {
    Validation(SubjectValidationError),
    SubjectNotFound(SubjectId),
    NoteNotFound(NoteId),
    DuplicateSubject(String),
    /// Reorder input lists the same id twice.
    DuplicateId(Uuid),
    Repo(RepoError),
}

impl Display for NoteServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::SubjectNotFound(id) => write!(f, "subject not found: {id}"),
            Self::NoteNotFound(id) => write!(f, "note not found: {id}"),
            Self::DuplicateSubject(title) => write!(f, "subject `{title}` already exists"),
            Self::DuplicateId(id) => write!(f, "id listed more than once: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for NoteServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for NoteServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::NotFound {
                entity: "subject",
                id,
            } => Self::SubjectNotFound(id),
            RepoError::NotFound { entity: "note", id } => Self::NoteNotFound(id),
            RepoError::Duplicate {
                entity: "subject",
                value,
            } => Self::DuplicateSubject(value),
            other => Self::Repo(other),
        }
    }
}

impl From<SubjectValidationError> for NoteServiceError {
    fn from(value: SubjectValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Note service facade over repository implementations.
pub struct NoteService<R: SubjectRepository> {
    repo: R,
}

impl<R: SubjectRepository> NoteService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates a subject at the end of the list.
    pub fn create_subject(&self, title: &str) -> Result<Subject, NoteServiceError> {
        let subject = self.repo.create_subject(title)?;
        info!(
            "event=subject_create module=service status=ok subject_id={}",
            subject.id
        );
        Ok(subject)
    }

    pub fn rename_subject(&self, id: SubjectId, title: &str) -> Result<Subject, NoteServiceError> {
        self.repo.rename_subject(id, title)?;
        self.repo
            .get_subject(id)?
            .ok_or(NoteServiceError::SubjectNotFound(id))
    }

    /// Deletes a subject together with all of its notes.
    pub fn delete_subject(&self, id: SubjectId) -> Result<(), NoteServiceError> {
        self.repo.delete_subject(id)?;
        info!("event=subject_delete module=service status=ok subject_id={id}");
        Ok(())
    }

    pub fn get_subject(&self, id: SubjectId) -> Result<Option<Subject>, NoteServiceError> {
        Ok(self.repo.get_subject(id)?)
    }

    /// Looks a subject up by title, ignoring case and surrounding spaces.
    pub fn find_subject_by_title(&self, title: &str) -> Result<Option<Subject>, NoteServiceError> {
        Ok(self.repo.find_subject_by_title(title)?)
    }

    pub fn list_subjects(&self) -> Result<Vec<Subject>, NoteServiceError> {
        Ok(self.repo.list_subjects()?)
    }

    /// Rewrites subject order to match `ordered_ids`.
    pub fn reorder_subjects(&mut self, ordered_ids: &[SubjectId]) -> Result<(), NoteServiceError> {
        ensure_distinct(ordered_ids)?;
        self.repo.reorder_subjects(ordered_ids)?;
        Ok(())
    }

    /// Appends a note to `subject_id`.
    pub fn create_note(
        &self,
        subject_id: SubjectId,
        title: &str,
        content: &str,
    ) -> Result<Note, NoteServiceError> {
        let note = Note::new(subject_id, title, content);
        Ok(self.repo.create_note(&note)?)
    }

    /// Replaces title and content of a note.
    pub fn update_note(
        &self,
        id: NoteId,
        title: &str,
        content: &str,
    ) -> Result<Note, NoteServiceError> {
        self.repo.update_note(id, title, content)?;
        self.repo
            .get_note(id)?
            .ok_or(NoteServiceError::NoteNotFound(id))
    }

    /// Sets or clears the display color of a note.
    pub fn set_note_color(
        &self,
        id: NoteId,
        color: Option<&str>,
    ) -> Result<Note, NoteServiceError> {
        let normalized = color.map(normalize_color).transpose()?;
        self.repo.set_note_color(id, normalized.as_deref())?;
        self.repo
            .get_note(id)?
            .ok_or(NoteServiceError::NoteNotFound(id))
    }

    /// Moves a note to the end of another subject.
    pub fn move_note(&self, id: NoteId, subject_id: SubjectId) -> Result<Note, NoteServiceError> {
        self.repo.move_note(id, subject_id)?;
        self.repo
            .get_note(id)?
            .ok_or(NoteServiceError::NoteNotFound(id))
    }

    pub fn delete_note(&self, id: NoteId) -> Result<(), NoteServiceError> {
        Ok(self.repo.delete_note(id)?)
    }

    pub fn get_note(&self, id: NoteId) -> Result<Option<Note>, NoteServiceError> {
        Ok(self.repo.get_note(id)?)
    }

    /// Lists notes of a subject in display order.
    pub fn list_notes(&self, subject_id: SubjectId) -> Result<Vec<Note>, NoteServiceError> {
        if self.repo.get_subject(subject_id)?.is_none() {
            return Err(NoteServiceError::SubjectNotFound(subject_id));
        }
        Ok(self.repo.list_notes(subject_id)?)
    }

    /// Rewrites note order inside one subject.
    pub fn reorder_notes(
        &mut self,
        subject_id: SubjectId,
        ordered_ids: &[NoteId],
    ) -> Result<(), NoteServiceError> {
        ensure_distinct(ordered_ids)?;
        self.repo.reorder_notes(subject_id, ordered_ids)?;
        Ok(())
    }
}

fn ensure_distinct(ids: &[Uuid]) -> Result<(), NoteServiceError> {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(*id) {
            return Err(NoteServiceError::DuplicateId(*id));
        }
    }
    Ok(())
}
