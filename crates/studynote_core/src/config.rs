//! Core runtime configuration.
//!
//! # Responsibility
//! - Describe where core keeps its databases and logs.
//! - Carry security/export tunables shared by services.
//!
//! # Invariants
//! - `data_dir` must be absolute after validation.
//! - Missing JSON fields fall back to `CoreConfig::default()` values.

use crate::crypto::password::{PasswordHasher, DEFAULT_HASH_ITERATIONS};
use crate::export::ExportOptions;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const NOTES_DB_FILE_NAME: &str = "notes.sqlite3";
const PROJECT_DB_FILE_NAME: &str = "project.sqlite3";
const LOG_DIR_NAME: &str = "logs";
const MIN_HASH_ITERATIONS: u32 = 1_000;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Runtime configuration handed to core by the host app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// App-private directory holding both databases and the log folder.
    pub data_dir: PathBuf,
    /// One of `trace|debug|info|warn|error`.
    pub log_level: String,
    /// PBKDF2 iterations for password digests and export keys.
    pub password_hash_iterations: u32,
    /// zlib level for exports, 0..=9.
    pub export_compression_level: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: std::env::temp_dir().join("studynote"),
            log_level: crate::logging::default_log_level().to_string(),
            password_hash_iterations: DEFAULT_HASH_ITERATIONS,
            export_compression_level: 6,
        }
    }
}

impl CoreConfig {
    /// Config rooted at `data_dir` with default tunables.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.data_dir.is_absolute() {
            return Err(ConfigError::Invalid(format!(
                "data_dir must be an absolute path, got `{}`",
                self.data_dir.display()
            )));
        }
        crate::logging::normalize_level(&self.log_level).map_err(ConfigError::Invalid)?;
        if self.password_hash_iterations < MIN_HASH_ITERATIONS {
            return Err(ConfigError::Invalid(format!(
                "password_hash_iterations must be >= {MIN_HASH_ITERATIONS}"
            )));
        }
        if self.export_compression_level > 9 {
            return Err(ConfigError::Invalid(
                "export_compression_level must be within 0..=9".to_string(),
            ));
        }
        Ok(())
    }

    pub fn notes_db_path(&self) -> PathBuf {
        self.data_dir.join(NOTES_DB_FILE_NAME)
    }

    pub fn project_db_path(&self) -> PathBuf {
        self.data_dir.join(PROJECT_DB_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join(LOG_DIR_NAME)
    }

    pub fn password_hasher(&self) -> PasswordHasher {
        PasswordHasher::new(self.password_hash_iterations)
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            key_iterations: self.password_hash_iterations,
            compression_level: self.export_compression_level,
        }
    }
}
