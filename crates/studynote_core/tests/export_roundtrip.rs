use studynote_core::db::{open_db_in_memory, Schema};
use studynote_core::export::is_encrypted_export;
use studynote_core::{
    ExportError, ExportOptions, ExportService, ExportServiceError, NoteService, Subject,
    SqliteSubjectRepository, SubjectId,
};
use uuid::Uuid;

fn options() -> ExportOptions {
    ExportOptions {
        key_iterations: 1_000,
        compression_level: 6,
    }
}

/// Creates "Physics" with three notes, the middle one colored.
fn seed(conn: &mut rusqlite::Connection) -> Subject {
    let notes = NoteService::new(SqliteSubjectRepository::try_new(conn).unwrap());
    let subject = notes.create_subject("Physics").unwrap();
    notes
        .create_note(subject.id, "Kinematics", "v = u + at")
        .unwrap();
    let colored = notes.create_note(subject.id, "Dynamics", "F = ma").unwrap();
    notes.set_note_color(colored.id, Some("#00aa00")).unwrap();
    notes.create_note(subject.id, "Energy", "").unwrap();
    subject
}

fn note_summary(
    conn: &mut rusqlite::Connection,
    subject_id: SubjectId,
) -> Vec<(String, String, Option<String>)> {
    NoteService::new(SqliteSubjectRepository::try_new(conn).unwrap())
        .list_notes(subject_id)
        .unwrap()
        .into_iter()
        .map(|note| (note.title, note.content, note.color))
        .collect()
}

#[test]
fn plain_round_trip_preserves_ordered_notes() {
    let mut conn = open_db_in_memory(Schema::Notes).unwrap();
    let subject = seed(&mut conn);
    let original = note_summary(&mut conn, subject.id);

    let mut service =
        ExportService::new(SqliteSubjectRepository::try_new(&mut conn).unwrap(), options());
    let bytes = service.export_subject(subject.id, None).unwrap();
    assert!(!is_encrypted_export(&bytes).unwrap());

    let imported = service.import_subject(&bytes, None).unwrap();
    assert_eq!(imported.title, "Physics (1)");
    assert_eq!(imported.sort_order, subject.sort_order + 1);
    drop(service);

    assert_eq!(note_summary(&mut conn, imported.id), original);
}

#[test]
fn encrypted_round_trip_into_a_fresh_database() {
    let mut source = open_db_in_memory(Schema::Notes).unwrap();
    let subject = seed(&mut source);
    let original = note_summary(&mut source, subject.id);
    let bytes = ExportService::new(
        SqliteSubjectRepository::try_new(&mut source).unwrap(),
        options(),
    )
    .export_subject(subject.id, Some("password1"))
    .unwrap();
    assert!(is_encrypted_export(&bytes).unwrap());

    let mut target = open_db_in_memory(Schema::Notes).unwrap();
    let mut service =
        ExportService::new(SqliteSubjectRepository::try_new(&mut target).unwrap(), options());

    assert!(matches!(
        service.import_subject(&bytes, None),
        Err(ExportServiceError::Export(ExportError::PasswordRequired))
    ));
    assert!(matches!(
        service.import_subject(&bytes, Some("password2")),
        Err(ExportServiceError::Export(ExportError::Decryption))
    ));

    let imported = service.import_subject(&bytes, Some("password1")).unwrap();
    assert_eq!(imported.title, "Physics");
    drop(service);
    assert_eq!(note_summary(&mut target, imported.id), original);
}

#[test]
fn encrypted_export_imports_under_different_key_settings() {
    let mut source = open_db_in_memory(Schema::Notes).unwrap();
    let subject = seed(&mut source);
    let original = note_summary(&mut source, subject.id);
    let exporter_options = ExportOptions {
        key_iterations: 20_000,
        compression_level: 9,
    };
    let bytes = ExportService::new(
        SqliteSubjectRepository::try_new(&mut source).unwrap(),
        exporter_options,
    )
    .export_subject(subject.id, Some("password1"))
    .unwrap();

    let mut target = open_db_in_memory(Schema::Notes).unwrap();
    let imported = ExportService::new(
        SqliteSubjectRepository::try_new(&mut target).unwrap(),
        options(),
    )
    .import_subject(&bytes, Some("password1"))
    .unwrap();
    assert_eq!(note_summary(&mut target, imported.id), original);
}

#[test]
fn failed_import_leaves_no_subject_behind() {
    let mut conn = open_db_in_memory(Schema::Notes).unwrap();
    let mut service =
        ExportService::new(SqliteSubjectRepository::try_new(&mut conn).unwrap(), options());

    assert!(matches!(
        service.import_subject(b"garbage", None),
        Err(ExportServiceError::Export(ExportError::Malformed(_)))
    ));
    drop(service);

    let subjects = NoteService::new(SqliteSubjectRepository::try_new(&mut conn).unwrap())
        .list_subjects()
        .unwrap();
    assert!(subjects.is_empty());
}

#[test]
fn exporting_unknown_subject_fails() {
    let mut conn = open_db_in_memory(Schema::Notes).unwrap();
    let service =
        ExportService::new(SqliteSubjectRepository::try_new(&mut conn).unwrap(), options());

    assert!(service.export_subject(Uuid::new_v4(), None).is_err());
}
