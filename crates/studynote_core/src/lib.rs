//! Core domain logic for StudyNote.
//! This crate is the single source of truth for business invariants.

pub mod access;
pub mod config;
pub mod crypto;
pub mod db;
pub mod export;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use access::{
    required_credential, AccessError, AccessEvaluator, Credential, CredentialKind, GateState,
    PermissionDenied, ProjectGate, ProjectSession,
};
pub use config::{ConfigError, CoreConfig};
pub use crypto::password::{check_new_password, PasswordHasher, PasswordPolicyError};
pub use db::{open_db, open_db_in_memory, DbError, Schema};
pub use export::{decode_export, encode_export, ExportError, ExportOptions, ExportedSubject};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::project::{
    Actor, Capability, Member, MemberId, Project, ProjectId, Role, RoleId, Task, TaskId,
    TaskStatus,
};
pub use model::subject::{Note, NoteId, Subject, SubjectId, SubjectValidationError};
pub use repo::project_repo::{ProjectRepository, SqliteProjectRepository};
pub use repo::subject_repo::{NewNote, SqliteSubjectRepository, SubjectRepository};
pub use repo::task_repo::{SqliteTaskRepository, TaskRepository};
pub use repo::{RepoError, RepoResult};
pub use service::export_service::{ExportService, ExportServiceError};
pub use service::note_service::{NoteService, NoteServiceError};
pub use service::project_service::{
    NewProject, NewRole, ProjectService, ProjectServiceError, ProjectSettings,
};
pub use service::task_service::{NewTask, TaskService, TaskServiceError, TaskUpdate};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
