//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose stable, use-case-level functions to Dart via FRB.
//! - Translate core errors into envelopes the UI can show directly.
//! - Hold authenticated project sessions for the lifetime of the process.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - IDs cross the boundary as UUID strings.
//! - Sessions are never persisted; a process restart logs everyone out.
//! - A stored session is re-validated against the project records on every
//!   use and dropped after `SESSION_IDLE_TTL` without use.

use log::{info, warn};
use once_cell::sync::Lazy;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use studynote_core::db::{open_db, Schema};
use studynote_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    AccessError, CoreConfig, Credential, CredentialKind, ExportService, Member, NewProject,
    NewTask, Note, NoteService, NoteServiceError, Project, ProjectService, ProjectServiceError,
    ProjectSession, SqliteProjectRepository, SqliteSubjectRepository, SqliteTaskRepository,
    Subject, Task, TaskService, TaskServiceError, TaskStatus,
};
use uuid::Uuid;

const DATA_DIR_ENV: &str = "STUDYNOTE_DATA_DIR";
const SESSION_IDLE_TTL: Duration = Duration::from_secs(12 * 60 * 60);
const SESSION_EXPIRED: &str = "Session expired. Please sign in again.";

static CONFIG: Lazy<Mutex<Option<CoreConfig>>> = Lazy::new(|| Mutex::new(None));
static SESSIONS: Lazy<Mutex<HashMap<Uuid, SessionEntry>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

#[derive(Debug, Clone)]
struct SessionEntry {
    session: ProjectSession,
    last_used: Instant,
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Points core at the app-private data directory.
///
/// `password_hash_iterations` overrides the PBKDF2 work factor when set.
///
/// # FFI contract
/// - Creates `data_dir` when missing.
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn configure(data_dir: String, password_hash_iterations: Option<u32>) -> String {
    let mut config = CoreConfig::with_data_dir(data_dir.trim());
    if let Some(iterations) = password_hash_iterations {
        config.password_hash_iterations = iterations;
    }
    if let Err(err) = config.validate() {
        return err.to_string();
    }
    if let Err(err) = std::fs::create_dir_all(&config.data_dir) {
        return format!("failed to create data_dir: {err}");
    }
    *lock(&CONFIG) = Some(config);
    String::new()
}

/// Generic action response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    /// Whether operation succeeded.
    pub ok: bool,
    /// Optional created/affected record ID.
    pub id: Option<String>,
    /// Human-readable response message for diagnostics/UI.
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>, id: Option<String>) -> Self {
        Self {
            ok: true,
            id,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id: None,
            message: message.into(),
        }
    }

    fn from_result(result: Result<Option<String>, String>, success: &str) -> Self {
        match result {
            Ok(id) => Self::success(success, id),
            Err(message) => Self::failure(message),
        }
    }
}

macro_rules! list_response {
    ($(#[$meta:meta])* $name:ident, $item:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub ok: bool,
            pub items: Vec<$item>,
            pub message: String,
        }

        impl $name {
            fn from_result(result: Result<Vec<$item>, String>) -> Self {
                match result {
                    Ok(items) => Self {
                        ok: true,
                        message: format!("{} item(s).", items.len()),
                        items,
                    },
                    Err(message) => Self {
                        ok: false,
                        items: Vec::new(),
                        message,
                    },
                }
            }
        }
    };
}

list_response!(
    /// Subject list envelope, ordered by position.
    SubjectListResponse,
    SubjectItem
);
list_response!(
    /// Note list envelope, ordered by position.
    NoteListResponse,
    NoteItem
);
list_response!(ProjectListResponse, ProjectItem);
list_response!(TaskListResponse, TaskItem);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectItem {
    pub id: String,
    pub title: String,
    pub sort_order: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteItem {
    pub id: String,
    pub subject_id: String,
    pub title: String,
    pub content: String,
    /// `#rrggbb` or `None`.
    pub color: Option<String>,
    pub sort_order: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectItem {
    pub id: String,
    pub name: String,
    pub project_protected: bool,
    pub members_enabled: bool,
    pub roles_enabled: bool,
    /// Login prompt to show: `none|project_password|member|role`.
    pub required_credential: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskItem {
    pub id: String,
    pub title: String,
    pub description: String,
    /// `todo|in_progress|done`.
    pub status: String,
    pub owner: String,
    pub assignee_id: Option<String>,
    pub due_at: Option<i64>,
}

/// Login result envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResponse {
    pub ok: bool,
    /// Opaque token for session-scoped calls.
    pub session_token: Option<String>,
    /// Actor text form (`admin`, `member:<id>`, `role:<id>`).
    pub actor: Option<String>,
    /// Capability bit set of the session.
    pub capabilities: u32,
    pub message: String,
}

/// Export bytes envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResponse {
    pub ok: bool,
    pub bytes: Vec<u8>,
    pub message: String,
}

#[flutter_rust_bridge::frb(sync)]
pub fn subject_create(title: String) -> ActionResponse {
    ActionResponse::from_result(
        with_note_service(|service| service.create_subject(&title))
            .map(|subject| Some(subject.id.to_string())),
        "Subject created.",
    )
}

#[flutter_rust_bridge::frb(sync)]
pub fn subject_rename(subject_id: String, title: String) -> ActionResponse {
    let result = parse_id(&subject_id, "subject_id").and_then(|id| {
        with_note_service(|service| service.rename_subject(id, &title))
            .map(|subject| Some(subject.id.to_string()))
    });
    ActionResponse::from_result(result, "Subject renamed.")
}

#[flutter_rust_bridge::frb(sync)]
pub fn subject_delete(subject_id: String) -> ActionResponse {
    let result = parse_id(&subject_id, "subject_id")
        .and_then(|id| with_note_service(|service| service.delete_subject(id)).map(|()| None));
    ActionResponse::from_result(result, "Subject deleted.")
}

#[flutter_rust_bridge::frb(sync)]
pub fn subject_list() -> SubjectListResponse {
    SubjectListResponse::from_result(
        with_note_service(|service| service.list_subjects())
            .map(|subjects| subjects.into_iter().map(to_subject_item).collect()),
    )
}

#[flutter_rust_bridge::frb(sync)]
pub fn subject_reorder(ordered_ids: Vec<String>) -> ActionResponse {
    let result = parse_ids(&ordered_ids, "ordered_ids").and_then(|ids| {
        with_note_service(|service| service.reorder_subjects(&ids)).map(|()| None)
    });
    ActionResponse::from_result(result, "Subjects reordered.")
}

#[flutter_rust_bridge::frb(sync)]
pub fn note_create(subject_id: String, title: String, content: String) -> ActionResponse {
    let result = parse_id(&subject_id, "subject_id").and_then(|id| {
        with_note_service(|service| service.create_note(id, &title, &content))
            .map(|note| Some(note.id.to_string()))
    });
    ActionResponse::from_result(result, "Note created.")
}

#[flutter_rust_bridge::frb(sync)]
pub fn note_update(note_id: String, title: String, content: String) -> ActionResponse {
    let result = parse_id(&note_id, "note_id").and_then(|id| {
        with_note_service(|service| service.update_note(id, &title, &content))
            .map(|note| Some(note.id.to_string()))
    });
    ActionResponse::from_result(result, "Note updated.")
}

#[flutter_rust_bridge::frb(sync)]
pub fn note_set_color(note_id: String, color: Option<String>) -> ActionResponse {
    let result = parse_id(&note_id, "note_id").and_then(|id| {
        with_note_service(|service| service.set_note_color(id, color.as_deref()))
            .map(|note| Some(note.id.to_string()))
    });
    ActionResponse::from_result(result, "Note color updated.")
}

#[flutter_rust_bridge::frb(sync)]
pub fn note_move(note_id: String, subject_id: String) -> ActionResponse {
    let result = parse_id(&note_id, "note_id").and_then(|note_id| {
        let subject_id = parse_id(&subject_id, "subject_id")?;
        with_note_service(|service| service.move_note(note_id, subject_id))
            .map(|note| Some(note.id.to_string()))
    });
    ActionResponse::from_result(result, "Note moved.")
}

#[flutter_rust_bridge::frb(sync)]
pub fn note_delete(note_id: String) -> ActionResponse {
    let result = parse_id(&note_id, "note_id")
        .and_then(|id| with_note_service(|service| service.delete_note(id)).map(|()| None));
    ActionResponse::from_result(result, "Note deleted.")
}

#[flutter_rust_bridge::frb(sync)]
pub fn note_list(subject_id: String) -> NoteListResponse {
    NoteListResponse::from_result(parse_id(&subject_id, "subject_id").and_then(|id| {
        with_note_service(|service| service.list_notes(id))
            .map(|notes| notes.into_iter().map(to_note_item).collect())
    }))
}

#[flutter_rust_bridge::frb(sync)]
pub fn note_reorder(subject_id: String, ordered_ids: Vec<String>) -> ActionResponse {
    let result = parse_id(&subject_id, "subject_id").and_then(|subject_id| {
        let ids = parse_ids(&ordered_ids, "ordered_ids")?;
        with_note_service(|service| service.reorder_notes(subject_id, &ids)).map(|()| None)
    });
    ActionResponse::from_result(result, "Notes reordered.")
}

/// Encodes a subject for sharing. `Some` non-empty password encrypts notes.
#[flutter_rust_bridge::frb(sync)]
pub fn subject_export(subject_id: String, password: Option<String>) -> ExportResponse {
    let result = parse_id(&subject_id, "subject_id").and_then(|id| {
        let (config, mut conn) = open_store(Schema::Notes)?;
        let repo = SqliteSubjectRepository::try_new(&mut conn).map_err(|err| err.to_string())?;
        ExportService::new(repo, config.export_options())
            .export_subject(id, password.as_deref())
            .map_err(|err| err.to_string())
    });
    match result {
        Ok(bytes) => ExportResponse {
            ok: true,
            message: format!("Exported {} byte(s).", bytes.len()),
            bytes,
        },
        Err(message) => ExportResponse {
            ok: false,
            bytes: Vec::new(),
            message,
        },
    }
}

/// Imports export bytes as a new subject.
#[flutter_rust_bridge::frb(sync)]
pub fn subject_import(bytes: Vec<u8>, password: Option<String>) -> ActionResponse {
    let result = open_store(Schema::Notes).and_then(|(config, mut conn)| {
        let repo = SqliteSubjectRepository::try_new(&mut conn).map_err(|err| err.to_string())?;
        ExportService::new(repo, config.export_options())
            .import_subject(&bytes, password.as_deref())
            .map(|subject| Some(subject.id.to_string()))
            .map_err(|err| err.to_string())
    });
    ActionResponse::from_result(result, "Subject imported.")
}

/// Creates a project. An empty `password` leaves it unprotected.
#[flutter_rust_bridge::frb(sync)]
pub fn project_create(
    name: String,
    password: String,
    members_enabled: bool,
    roles_enabled: bool,
) -> ActionResponse {
    let request = NewProject {
        name,
        password,
        members_enabled,
        roles_enabled,
    };
    ActionResponse::from_result(
        with_project_service(|service| service.create_project(&request))
            .map(|project| Some(project.id.to_string())),
        "Project created.",
    )
}

#[flutter_rust_bridge::frb(sync)]
pub fn project_list() -> ProjectListResponse {
    ProjectListResponse::from_result(
        with_project_service(|service| service.list_projects())
            .map(|projects| projects.iter().map(to_project_item).collect()),
    )
}

/// Registers a member account on a members-enabled project.
///
/// `project_password` is checked only when the project is protected.
#[flutter_rust_bridge::frb(sync)]
pub fn project_signup(
    project_id: String,
    username: String,
    password: String,
    project_password: String,
) -> ActionResponse {
    let result = parse_id(&project_id, "project_id").and_then(|id| {
        with_project_service(|service| {
            service.signup_member(id, &username, &password, &project_password)
        })
        .map(|member: Member| Some(member.id.to_string()))
    });
    ActionResponse::from_result(result, "Signed up.")
}

/// Enters a project and opens a session.
///
/// Which fields are read depends on the project's entry mode:
/// `username` for member projects, `role_name` for role projects, and
/// `password` for every protected mode.
#[flutter_rust_bridge::frb(sync)]
pub fn project_login(
    project_id: String,
    username: Option<String>,
    role_name: Option<String>,
    password: String,
) -> LoginResponse {
    let result = parse_id(&project_id, "project_id").and_then(|id| {
        with_project_service(|service| {
            let mut gate = service.open_gate(id)?;
            let credential = match gate.required_credential() {
                CredentialKind::None => Credential::None,
                CredentialKind::ProjectPassword => Credential::ProjectPassword(password),
                CredentialKind::Member => Credential::Member {
                    username: username.unwrap_or_default(),
                    password,
                },
                CredentialKind::Role => Credential::Role {
                    role_name: role_name.unwrap_or_default(),
                    password,
                },
            };
            Ok(gate.submit(&service.evaluator(), &credential)?)
        })
    });

    match result {
        Ok(session) => {
            let token = Uuid::new_v4();
            let response = LoginResponse {
                ok: true,
                session_token: Some(token.to_string()),
                actor: Some(session.actor.to_db()),
                capabilities: session.capabilities.bits(),
                message: "Signed in.".to_string(),
            };
            info!(
                "event=session_open module=ffi status=ok project_id={}",
                session.project_id
            );
            let mut sessions = lock(&SESSIONS);
            let now = Instant::now();
            evict_idle(&mut sessions, now);
            sessions.insert(
                token,
                SessionEntry {
                    session,
                    last_used: now,
                },
            );
            response
        }
        Err(message) => LoginResponse {
            ok: false,
            session_token: None,
            actor: None,
            capabilities: 0,
            message,
        },
    }
}

/// Drops a session token. Unknown tokens are reported, not ignored.
#[flutter_rust_bridge::frb(sync)]
pub fn project_logout(session_token: String) -> ActionResponse {
    let result = parse_id(&session_token, "session_token").and_then(|token| {
        lock(&SESSIONS)
            .remove(&token)
            .map(|entry| Some(entry.session.project_id.to_string()))
            .ok_or_else(|| SESSION_EXPIRED.to_string())
    });
    ActionResponse::from_result(result, "Signed out.")
}

#[flutter_rust_bridge::frb(sync)]
pub fn task_create(
    session_token: String,
    title: String,
    description: String,
    due_at: Option<i64>,
) -> ActionResponse {
    let request = NewTask {
        title,
        description,
        assignee_id: None,
        due_at,
    };
    ActionResponse::from_result(
        with_task_service(&session_token, |service| service.create_task(&request))
            .map(|task| Some(task.id.to_string())),
        "Task created.",
    )
}

#[flutter_rust_bridge::frb(sync)]
pub fn task_list(session_token: String) -> TaskListResponse {
    TaskListResponse::from_result(
        with_task_service(&session_token, |service| service.list_tasks())
            .map(|tasks| tasks.into_iter().map(to_task_item).collect()),
    )
}

#[flutter_rust_bridge::frb(sync)]
pub fn task_set_status(session_token: String, task_id: String, status: String) -> ActionResponse {
    let result = parse_id(&task_id, "task_id").and_then(|id| {
        let status = TaskStatus::parse(status.trim())
            .ok_or_else(|| format!("invalid task status `{status}`"))?;
        with_task_service(&session_token, |service| service.set_status(id, status))
            .map(|task| Some(task.id.to_string()))
    });
    ActionResponse::from_result(result, "Task updated.")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn current_config() -> CoreConfig {
    if let Some(config) = lock(&CONFIG).clone() {
        return config;
    }
    let data_dir = std::env::var(DATA_DIR_ENV)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("studynote"));
    CoreConfig::with_data_dir(data_dir)
}

fn open_store(schema: Schema) -> Result<(CoreConfig, Connection), String> {
    let config = current_config();
    std::fs::create_dir_all(&config.data_dir)
        .map_err(|err| format!("failed to create data_dir: {err}"))?;
    let path = match schema {
        Schema::Notes => config.notes_db_path(),
        Schema::Project => config.project_db_path(),
    };
    let conn = open_db(&path, schema).map_err(|err| format!("{schema} DB open failed: {err}"))?;
    Ok((config, conn))
}

fn with_note_service<T>(
    f: impl FnOnce(&mut NoteService<SqliteSubjectRepository<'_>>) -> Result<T, NoteServiceError>,
) -> Result<T, String> {
    let (_, mut conn) = open_store(Schema::Notes)?;
    let repo = SqliteSubjectRepository::try_new(&mut conn)
        .map_err(|err| format!("notes repo init failed: {err}"))?;
    let mut service = NoteService::new(repo);
    f(&mut service).map_err(|err| err.to_string())
}

fn with_project_service<T>(
    f: impl FnOnce(
        &mut ProjectService<SqliteProjectRepository<'_>>,
    ) -> Result<T, ProjectServiceError>,
) -> Result<T, String> {
    let (config, mut conn) = open_store(Schema::Project)?;
    let repo = SqliteProjectRepository::try_new(&mut conn)
        .map_err(|err| format!("project repo init failed: {err}"))?;
    let mut service = ProjectService::new(repo, config.password_hasher());
    f(&mut service).map_err(|err| match err {
        ProjectServiceError::Access(access) => access.user_message().to_string(),
        other => other.to_string(),
    })
}

fn with_task_service<T>(
    session_token: &str,
    f: impl FnOnce(&TaskService<'_, SqliteTaskRepository<'_>>) -> Result<T, TaskServiceError>,
) -> Result<T, String> {
    let token = parse_id(session_token, "session_token")?;
    let stored = {
        let mut sessions = lock(&SESSIONS);
        evict_idle(&mut sessions, Instant::now());
        sessions.get(&token).map(|entry| entry.session.clone())
    }
    .ok_or_else(|| {
        warn!("event=session_lookup module=ffi status=error error_code=unknown_token");
        SESSION_EXPIRED.to_string()
    })?;

    let (config, mut conn) = open_store(Schema::Project)?;
    let session = {
        let repo = SqliteProjectRepository::try_new(&mut conn)
            .map_err(|err| format!("project repo init failed: {err}"))?;
        match ProjectService::new(repo, config.password_hasher()).refresh_session(&stored) {
            Ok(session) => session,
            Err(
                ProjectServiceError::Access(AccessError::SessionRevoked)
                | ProjectServiceError::ProjectNotFound(_),
            ) => {
                lock(&SESSIONS).remove(&token);
                warn!(
                    "event=session_lookup module=ffi status=error error_code=revoked project_id={}",
                    stored.project_id
                );
                return Err(SESSION_EXPIRED.to_string());
            }
            Err(err) => return Err(err.to_string()),
        }
    };
    if let Some(entry) = lock(&SESSIONS).get_mut(&token) {
        entry.session = session.clone();
        entry.last_used = Instant::now();
    }

    let repo = SqliteTaskRepository::try_new(&conn)
        .map_err(|err| format!("task repo init failed: {err}"))?;
    let service = TaskService::new(repo, &session);
    f(&service).map_err(|err| err.to_string())
}

fn evict_idle(sessions: &mut HashMap<Uuid, SessionEntry>, now: Instant) {
    let before = sessions.len();
    sessions.retain(|_, entry| now.saturating_duration_since(entry.last_used) < SESSION_IDLE_TTL);
    let evicted = before - sessions.len();
    if evicted > 0 {
        info!("event=session_evict module=ffi status=ok count={evicted}");
    }
}

fn parse_id(raw: &str, field: &str) -> Result<Uuid, String> {
    Uuid::parse_str(raw.trim()).map_err(|_| format!("invalid {field}: `{raw}`"))
}

fn parse_ids(raw: &[String], field: &str) -> Result<Vec<Uuid>, String> {
    raw.iter().map(|value| parse_id(value, field)).collect()
}

fn to_subject_item(subject: Subject) -> SubjectItem {
    SubjectItem {
        id: subject.id.to_string(),
        title: subject.title,
        sort_order: subject.sort_order,
    }
}

fn to_note_item(note: Note) -> NoteItem {
    NoteItem {
        id: note.id.to_string(),
        subject_id: note.subject_id.to_string(),
        title: note.title,
        content: note.content,
        color: note.color,
        sort_order: note.sort_order,
    }
}

fn to_project_item(project: &Project) -> ProjectItem {
    ProjectItem {
        id: project.id.to_string(),
        name: project.name.clone(),
        project_protected: project.project_protected,
        members_enabled: project.members_enabled,
        roles_enabled: project.roles_enabled,
        required_credential: studynote_core::required_credential(project)
            .as_str()
            .to_string(),
    }
}

fn to_task_item(task: Task) -> TaskItem {
    TaskItem {
        id: task.id.to_string(),
        title: task.title,
        description: task.description,
        status: task.status.as_str().to_string(),
        owner: task.owner.to_db(),
        assignee_id: task.assignee_id.map(|id| id.to_string()),
        due_at: task.due_at,
    }
}
