//! Subject export/import use-case service.
//!
//! # Responsibility
//! - Serialize a stored subject with its ordered notes into export bytes.
//! - Recreate a subject from export bytes as a new subject.
//!
//! # Invariants
//! - Import never merges into an existing subject. A colliding title gets
//!   the first free ` (n)` suffix, starting at 1.
//! - Imported subjects are appended after the current last subject.
//! - Imported notes keep their exported order.

use crate::export::{decode_export, encode_export, ExportError, ExportOptions, ExportedNote};
use crate::model::subject::{normalize_color, Subject, SubjectId, SubjectValidationError};
use crate::repo::subject_repo::{NewNote, SubjectRepository};
use crate::repo::RepoError;
use crate::service::note_service::NoteServiceError;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum ExportServiceError {
    Export(ExportError),
    Notes(NoteServiceError),
}

impl Display for ExportServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Export(err) => write!(f, "{err}"),
            Self::Notes(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ExportServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Export(err) => Some(err),
            Self::Notes(err) => Some(err),
        }
    }
}

impl From<ExportError> for ExportServiceError {
    fn from(value: ExportError) -> Self {
        Self::Export(value)
    }
}

impl From<NoteServiceError> for ExportServiceError {
    fn from(value: NoteServiceError) -> Self {
        Self::Notes(value)
    }
}

impl From<RepoError> for ExportServiceError {
    fn from(value: RepoError) -> Self {
        Self::Notes(value.into())
    }
}

impl From<SubjectValidationError> for ExportServiceError {
    fn from(value: SubjectValidationError) -> Self {
        Self::Notes(value.into())
    }
}

/// Export facade over a subject repository.
pub struct ExportService<R: SubjectRepository> {
    repo: R,
    options: ExportOptions,
}

impl<R: SubjectRepository> ExportService<R> {
    pub fn new(repo: R, options: ExportOptions) -> Self {
        Self { repo, options }
    }

    /// Encodes `subject_id` and its notes. A non-empty password encrypts the notes.
    pub fn export_subject(
        &self,
        subject_id: SubjectId,
        password: Option<&str>,
    ) -> Result<Vec<u8>, ExportServiceError> {
        let subject = self
            .repo
            .get_subject(subject_id)?
            .ok_or(NoteServiceError::SubjectNotFound(subject_id))?;
        let notes: Vec<ExportedNote> = self
            .repo
            .list_notes(subject_id)?
            .into_iter()
            .map(|note| ExportedNote {
                title: note.title,
                content: note.content,
                color: note.color,
            })
            .collect();

        let bytes = encode_export(
            &subject.title,
            subject.sort_order,
            &notes,
            password,
            self.options,
        )?;
        info!(
            "event=subject_export module=service status=ok subject_id={} notes={} encrypted={} bytes={}",
            subject.id,
            notes.len(),
            password.is_some_and(|value| !value.is_empty()),
            bytes.len()
        );
        Ok(bytes)
    }

    /// Decodes export bytes into a new subject.
    pub fn import_subject(
        &mut self,
        bytes: &[u8],
        password: Option<&str>,
    ) -> Result<Subject, ExportServiceError> {
        let exported = decode_export(bytes, password)?;
        let notes = exported
            .notes
            .into_iter()
            .map(|note| {
                let color = note.color.as_deref().map(normalize_color).transpose()?;
                Ok(NewNote {
                    title: note.title,
                    content: note.content,
                    color,
                })
            })
            .collect::<Result<Vec<_>, ExportServiceError>>()?;

        let existing = self.repo.list_subjects()?;
        let title = unique_title(&exported.title, &existing);
        let sort_order = existing
            .iter()
            .map(|subject| subject.sort_order)
            .max()
            .map_or(0, |last| last.saturating_add(1));

        let subject = self
            .repo
            .create_subject_with_notes(&title, sort_order, &notes)?;
        info!(
            "event=subject_import module=service status=ok subject_id={} notes={} encrypted={}",
            subject.id,
            notes.len(),
            exported.encrypted
        );
        Ok(subject)
    }
}

/// Returns `title`, or `title (n)` with the smallest free `n`.
fn unique_title(title: &str, existing: &[Subject]) -> String {
    let base = title.trim();
    let taken = |candidate: &str| {
        existing
            .iter()
            .any(|subject| subject.title.to_lowercase() == candidate.to_lowercase())
    };
    if !taken(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base} ({n})"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::unique_title;
    use crate::model::subject::Subject;
    use uuid::Uuid;

    fn subject(title: &str) -> Subject {
        Subject {
            id: Uuid::new_v4(),
            title: title.to_string(),
            sort_order: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn unique_title_keeps_free_title() {
        assert_eq!(unique_title("Physics", &[subject("Maths")]), "Physics");
    }

    #[test]
    fn unique_title_picks_smallest_free_suffix() {
        let existing = [subject("physics"), subject("Physics (1)")];
        assert_eq!(unique_title("Physics", &existing), "Physics (2)");
    }
}
