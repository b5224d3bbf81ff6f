//! SQLite storage bootstrap for the two StudyNote schemas.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the notes and project stores.
//! - Apply each schema's migrations in deterministic order.
//!
//! # Invariants
//! - The notes and project schemas live in separate database files and never
//!   share a migration list.
//! - Migration version is tracked per file via `PRAGMA user_version`.
//! - Core code must not read/write application data before migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Independent database schemas owned by core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Schema {
    /// Subjects and their notes.
    Notes,
    /// Projects, members, roles and tasks.
    Project,
}

impl Schema {
    /// Stable label used in log events and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Notes => "notes",
            Self::Project => "project",
        }
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        schema: Schema,
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                schema,
                db_version,
                latest_supported,
            } => write!(
                f,
                "{schema} database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
