//! Subject/note repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD and ordering APIs over the `subjects` and `notes` tables.
//! - Own multi-row writes (reorder, bulk import) with atomic semantics.
//!
//! # Invariants
//! - Subject titles are unique case-insensitively.
//! - New notes are appended after the current last note of their subject.
//! - Reorder writes `sort_order = position` for every listed id in a single
//!   transaction, and rejects ids that are not in the subject.

use crate::model::subject::{
    normalize_note_title, normalize_subject_title, Note, NoteId, Subject, SubjectId,
};
use crate::repo::{ensure_tables, map_unique_violation, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const SUBJECT_SELECT_SQL: &str = "SELECT
    id,
    title,
    sort_order,
    created_at,
    updated_at
FROM subjects";

const NOTE_SELECT_SQL: &str = "SELECT
    id,
    subject_id,
    title,
    content,
    color,
    sort_order,
    created_at,
    updated_at
FROM notes";

/// Note payload used by bulk import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    pub color: Option<String>,
}

/// Repository interface for subjects and their notes.
pub trait SubjectRepository {
    /// Creates a subject at the end of the subject list.
    fn create_subject(&self, title: &str) -> RepoResult<Subject>;
    fn rename_subject(&self, id: SubjectId, title: &str) -> RepoResult<()>;
    /// Deletes a subject and, through the FK cascade, all of its notes.
    fn delete_subject(&self, id: SubjectId) -> RepoResult<()>;
    fn get_subject(&self, id: SubjectId) -> RepoResult<Option<Subject>>;
    fn find_subject_by_title(&self, title: &str) -> RepoResult<Option<Subject>>;
    /// Lists subjects by `sort_order ASC, title ASC`.
    fn list_subjects(&self) -> RepoResult<Vec<Subject>>;
    fn reorder_subjects(&mut self, ordered_ids: &[SubjectId]) -> RepoResult<()>;
    /// Creates a subject and its notes in one transaction.
    fn create_subject_with_notes(
        &mut self,
        title: &str,
        sort_order: i32,
        notes: &[NewNote],
    ) -> RepoResult<Subject>;

    /// Appends `note` to its subject and returns the stored row.
    fn create_note(&self, note: &Note) -> RepoResult<Note>;
    fn update_note(&self, id: NoteId, title: &str, content: &str) -> RepoResult<()>;
    fn set_note_color(&self, id: NoteId, color: Option<&str>) -> RepoResult<()>;
    /// Moves a note to the end of another subject.
    fn move_note(&self, id: NoteId, subject_id: SubjectId) -> RepoResult<()>;
    fn delete_note(&self, id: NoteId) -> RepoResult<()>;
    fn get_note(&self, id: NoteId) -> RepoResult<Option<Note>>;
    /// Lists a subject's notes by `sort_order ASC, created_at ASC`.
    fn list_notes(&self, subject_id: SubjectId) -> RepoResult<Vec<Note>>;
    fn reorder_notes(&mut self, subject_id: SubjectId, ordered_ids: &[NoteId]) -> RepoResult<()>;
}

/// SQLite-backed subject/note repository.
pub struct SqliteSubjectRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteSubjectRepository<'conn> {
    /// Constructs a repository from a connection opened with `Schema::Notes`.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["subjects", "notes"])?;
        Ok(Self { conn })
    }
}

impl SubjectRepository for SqliteSubjectRepository<'_> {
    fn create_subject(&self, title: &str) -> RepoResult<Subject> {
        let title = normalize_subject_title(title)?;
        let id = Uuid::new_v4();
        insert_subject(self.conn, id, &title, None)?;
        load_subject(self.conn, id)
    }

    fn rename_subject(&self, id: SubjectId, title: &str) -> RepoResult<()> {
        let title = normalize_subject_title(title)?;
        let changed = self
            .conn
            .execute(
                "UPDATE subjects
                 SET
                    title = ?2,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1;",
                params![id.to_string(), title],
            )
            .map_err(|err| map_unique_violation(err, "subject", &title))?;

        if changed == 0 {
            return Err(subject_not_found(id));
        }
        Ok(())
    }

    fn delete_subject(&self, id: SubjectId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM subjects WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(subject_not_found(id));
        }
        Ok(())
    }

    fn get_subject(&self, id: SubjectId) -> RepoResult<Option<Subject>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SUBJECT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_subject_row(row)?)),
            None => Ok(None),
        }
    }

    fn find_subject_by_title(&self, title: &str) -> RepoResult<Option<Subject>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SUBJECT_SELECT_SQL} WHERE title = ?1 COLLATE NOCASE;"
        ))?;
        let mut rows = stmt.query([title.trim()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_subject_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_subjects(&self) -> RepoResult<Vec<Subject>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SUBJECT_SELECT_SQL} ORDER BY sort_order ASC, title COLLATE NOCASE ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut subjects = Vec::new();
        while let Some(row) = rows.next()? {
            subjects.push(parse_subject_row(row)?);
        }
        Ok(subjects)
    }

    fn reorder_subjects(&mut self, ordered_ids: &[SubjectId]) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        for (position, id) in ordered_ids.iter().enumerate() {
            let changed = tx.execute(
                "UPDATE subjects SET sort_order = ?2 WHERE id = ?1;",
                params![id.to_string(), position as i64],
            )?;
            if changed == 0 {
                return Err(subject_not_found(*id));
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn create_subject_with_notes(
        &mut self,
        title: &str,
        sort_order: i32,
        notes: &[NewNote],
    ) -> RepoResult<Subject> {
        let title = normalize_subject_title(title)?;
        let id = Uuid::new_v4();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert_subject(&tx, id, &title, Some(sort_order))?;
        for (position, note) in notes.iter().enumerate() {
            insert_note_at(&tx, id, note, position as i64)?;
        }
        tx.commit()?;
        load_subject(self.conn, id)
    }

    fn create_note(&self, note: &Note) -> RepoResult<Note> {
        let title = normalize_note_title(&note.title)?;
        ensure_subject_exists(self.conn, note.subject_id)?;
        self.conn.execute(
            "INSERT INTO notes (id, subject_id, title, content, color, sort_order)
             SELECT ?1, ?2, ?3, ?4, ?5, COALESCE(MAX(sort_order), -1) + 1
             FROM notes
             WHERE subject_id = ?2;",
            params![
                note.id.to_string(),
                note.subject_id.to_string(),
                title,
                note.content.as_str(),
                note.color.as_deref(),
            ],
        )?;
        self.get_note(note.id)?
            .ok_or_else(|| RepoError::InvalidData("created note missing on read-back".to_string()))
    }

    fn update_note(&self, id: NoteId, title: &str, content: &str) -> RepoResult<()> {
        let title = normalize_note_title(title)?;
        let changed = self.conn.execute(
            "UPDATE notes
             SET
                title = ?2,
                content = ?3,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), title, content],
        )?;
        if changed == 0 {
            return Err(note_not_found(id));
        }
        Ok(())
    }

    fn set_note_color(&self, id: NoteId, color: Option<&str>) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE notes
             SET
                color = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), color],
        )?;
        if changed == 0 {
            return Err(note_not_found(id));
        }
        Ok(())
    }

    fn move_note(&self, id: NoteId, subject_id: SubjectId) -> RepoResult<()> {
        ensure_subject_exists(self.conn, subject_id)?;
        let changed = self.conn.execute(
            "UPDATE notes
             SET
                subject_id = ?2,
                sort_order = (
                    SELECT COALESCE(MAX(sort_order), -1) + 1
                    FROM notes
                    WHERE subject_id = ?2
                ),
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), subject_id.to_string()],
        )?;
        if changed == 0 {
            return Err(note_not_found(id));
        }
        Ok(())
    }

    fn delete_note(&self, id: NoteId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM notes WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(note_not_found(id));
        }
        Ok(())
    }

    fn get_note(&self, id: NoteId) -> RepoResult<Option<Note>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{NOTE_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_note_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_notes(&self, subject_id: SubjectId) -> RepoResult<Vec<Note>> {
        let mut stmt = self.conn.prepare(&format!(
            "{NOTE_SELECT_SQL}
             WHERE subject_id = ?1
             ORDER BY sort_order ASC, created_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([subject_id.to_string()])?;
        let mut notes = Vec::new();
        while let Some(row) = rows.next()? {
            notes.push(parse_note_row(row)?);
        }
        Ok(notes)
    }

    fn reorder_notes(&mut self, subject_id: SubjectId, ordered_ids: &[NoteId]) -> RepoResult<()> {
        let subject_text = subject_id.to_string();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        for (position, id) in ordered_ids.iter().enumerate() {
            let changed = tx.execute(
                "UPDATE notes
                 SET sort_order = ?3
                 WHERE id = ?1
                   AND subject_id = ?2;",
                params![id.to_string(), subject_text.as_str(), position as i64],
            )?;
            if changed == 0 {
                return Err(note_not_found(*id));
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn insert_subject(
    conn: &Connection,
    id: SubjectId,
    title: &str,
    sort_order: Option<i32>,
) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO subjects (id, title, sort_order)
         SELECT ?1, ?2, COALESCE(?3, COALESCE(MAX(sort_order), -1) + 1)
         FROM subjects;",
        params![id.to_string(), title, sort_order],
    )
    .map_err(|err| map_unique_violation(err, "subject", title))?;
    Ok(())
}

fn insert_note_at(
    tx: &Transaction<'_>,
    subject_id: SubjectId,
    note: &NewNote,
    position: i64,
) -> RepoResult<()> {
    let title = normalize_note_title(&note.title)?;
    tx.execute(
        "INSERT INTO notes (id, subject_id, title, content, color, sort_order)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            Uuid::new_v4().to_string(),
            subject_id.to_string(),
            title,
            note.content.as_str(),
            note.color.as_deref(),
            position,
        ],
    )?;
    Ok(())
}

fn load_subject(conn: &Connection, id: SubjectId) -> RepoResult<Subject> {
    conn.query_row(
        &format!("{SUBJECT_SELECT_SQL} WHERE id = ?1;"),
        [id.to_string()],
        |row| Ok(parse_subject_row(row)),
    )
    .optional()?
    .unwrap_or_else(|| Err(subject_not_found(id)))
}

fn ensure_subject_exists(conn: &Connection, id: SubjectId) -> RepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM subjects WHERE id = ?1);",
        [id.to_string()],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(subject_not_found(id));
    }
    Ok(())
}

fn parse_subject_row(row: &Row<'_>) -> RepoResult<Subject> {
    let id_text: String = row.get("id")?;
    Ok(Subject {
        id: parse_uuid(&id_text, "subjects.id")?,
        title: row.get("title")?,
        sort_order: row.get("sort_order")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_note_row(row: &Row<'_>) -> RepoResult<Note> {
    let id_text: String = row.get("id")?;
    let subject_text: String = row.get("subject_id")?;
    Ok(Note {
        id: parse_uuid(&id_text, "notes.id")?,
        subject_id: parse_uuid(&subject_text, "notes.subject_id")?,
        title: row.get("title")?,
        content: row.get("content")?,
        color: row.get("color")?,
        sort_order: row.get("sort_order")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn subject_not_found(id: SubjectId) -> RepoError {
    RepoError::NotFound {
        entity: "subject",
        id,
    }
}

fn note_not_found(id: NoteId) -> RepoError {
    RepoError::NotFound { entity: "note", id }
}
