//! Project access evaluation.
//!
//! # Responsibility
//! - Decide, at project entry, whether a supplied credential grants access.
//! - Resolve the identity and capability set the session acts with.
//!
//! # Invariants
//! - Members and roles both disabled: entry is `Actor::Admin` once the
//!   project password (if protected) verifies. No other check applies.
//! - Members enabled: member passwords are hashed over
//!   `member_salt || project_salt`.
//! - Roles enabled with members disabled: role passwords are hashed over the
//!   role salt alone.
//! - Stored sessions are re-validated with `refresh` before reuse.
//! - Every mismatch is reported as `AccessError::IncorrectCredential`; there
//!   is no lockout or retry counting.

use crate::crypto::password::PasswordHasher;
use crate::crypto::CryptoError;
use crate::model::project::{Actor, Capability, Project, ProjectId, RoleId};
use crate::repo::project_repo::ProjectRepository;
use crate::repo::RepoError;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod gate;

pub use gate::{GateState, ProjectGate};

/// Credential shape a project expects at entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// Unprotected project without members or roles.
    None,
    ProjectPassword,
    Member,
    Role,
}

impl CredentialKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ProjectPassword => "project_password",
            Self::Member => "member",
            Self::Role => "role",
        }
    }
}

/// Credential supplied by the person entering a project.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    None,
    ProjectPassword(String),
    Member { username: String, password: String },
    Role { role_name: String, password: String },
}

impl Credential {
    pub fn kind(&self) -> CredentialKind {
        match self {
            Self::None => CredentialKind::None,
            Self::ProjectPassword(_) => CredentialKind::ProjectPassword,
            Self::Member { .. } => CredentialKind::Member,
            Self::Role { .. } => CredentialKind::Role,
        }
    }
}

// Manual impl keeps passwords out of debug output and logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "Credential::None"),
            Self::ProjectPassword(_) => write!(f, "Credential::ProjectPassword(..)"),
            Self::Member { username, .. } => {
                write!(f, "Credential::Member {{ username: {username:?}, .. }}")
            }
            Self::Role { role_name, .. } => {
                write!(f, "Credential::Role {{ role_name: {role_name:?}, .. }}")
            }
        }
    }
}

/// Authenticated project session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSession {
    pub project_id: ProjectId,
    pub actor: Actor,
    /// Effective role; `None` for implicit admin.
    pub role_id: Option<RoleId>,
    pub capabilities: Capability,
}

impl ProjectSession {
    /// Session with full privileges.
    pub fn admin(project_id: ProjectId) -> Self {
        Self {
            project_id,
            actor: Actor::Admin,
            role_id: None,
            capabilities: Capability::admin(),
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability)
    }

    /// Fails with `PermissionDenied` unless every flag in `capability` is held.
    pub fn require(&self, capability: Capability) -> Result<(), PermissionDenied> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(PermissionDenied {
                required: capability,
            })
        }
    }
}

/// Session lacks a capability required by an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionDenied {
    pub required: Capability,
}

impl Display for PermissionDenied {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "permission denied: requires {:?}", self.required)
    }
}

impl Error for PermissionDenied {}

/// Access evaluation failures.
#[derive(Debug)]
pub enum AccessError {
    /// Unknown account/role or wrong password.
    IncorrectCredential(CredentialKind),
    /// Credential shape does not match the project's entry mode.
    UnexpectedCredential {
        expected: CredentialKind,
        supplied: CredentialKind,
    },
    /// Account, role or entry mode behind a session changed since sign-in.
    SessionRevoked,
    Repo(RepoError),
    Crypto(CryptoError),
}

impl AccessError {
    /// User-visible text for the login screen.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::IncorrectCredential(CredentialKind::Member) => "Incorrect username or password.",
            Self::IncorrectCredential(CredentialKind::Role) => "Incorrect role or password.",
            Self::IncorrectCredential(_) => "Incorrect password.",
            Self::UnexpectedCredential { .. } => "This project uses a different sign-in method.",
            Self::SessionRevoked => "Session expired. Please sign in again.",
            Self::Repo(_) | Self::Crypto(_) => "Unable to open the project. Please try again.",
        }
    }
}

impl Display for AccessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IncorrectCredential(kind) => write!(f, "incorrect {} credential", kind.as_str()),
            Self::UnexpectedCredential { expected, supplied } => write!(
                f,
                "expected {} credential, got {}",
                expected.as_str(),
                supplied.as_str()
            ),
            Self::SessionRevoked => write!(f, "session is no longer valid"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Crypto(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Crypto(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for AccessError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<CryptoError> for AccessError {
    fn from(value: CryptoError) -> Self {
        Self::Crypto(value)
    }
}

/// Returns the credential shape `project` expects at entry.
pub fn required_credential(project: &Project) -> CredentialKind {
    if project.members_enabled {
        CredentialKind::Member
    } else if project.roles_enabled {
        CredentialKind::Role
    } else if project.project_protected {
        CredentialKind::ProjectPassword
    } else {
        CredentialKind::None
    }
}

/// Evaluates credentials against project records.
pub struct AccessEvaluator<'r, R: ProjectRepository + ?Sized> {
    repo: &'r R,
    hasher: PasswordHasher,
}

impl<'r, R: ProjectRepository + ?Sized> AccessEvaluator<'r, R> {
    pub fn new(repo: &'r R, hasher: PasswordHasher) -> Self {
        Self { repo, hasher }
    }

    /// Grants or denies entry to `project` for `credential`.
    pub fn evaluate(
        &self,
        project: &Project,
        credential: &Credential,
    ) -> Result<ProjectSession, AccessError> {
        let expected = required_credential(project);
        let result = if project.grants_implicit_admin() {
            self.enter_as_admin(project, credential)
        } else if project.members_enabled {
            self.enter_as_member(project, credential)
        } else {
            self.enter_as_role(project, credential)
        };

        match &result {
            Ok(session) => info!(
                "event=project_entry module=access status=ok project_id={} mode={} actor={}",
                project.id,
                expected.as_str(),
                session.actor.to_db()
            ),
            Err(err) => warn!(
                "event=project_entry module=access status=denied project_id={} mode={} error={}",
                project.id,
                expected.as_str(),
                err
            ),
        }
        result
    }

    fn enter_as_admin(
        &self,
        project: &Project,
        credential: &Credential,
    ) -> Result<ProjectSession, AccessError> {
        let password = match credential {
            Credential::None => "",
            Credential::ProjectPassword(password) => password.as_str(),
            other => {
                return Err(AccessError::UnexpectedCredential {
                    expected: required_credential(project),
                    supplied: other.kind(),
                })
            }
        };

        if project.project_protected
            && !self
                .hasher
                .verify(password, &[project.salt.as_str()], &project.password_hash)?
        {
            return Err(AccessError::IncorrectCredential(
                CredentialKind::ProjectPassword,
            ));
        }

        Ok(ProjectSession::admin(project.id))
    }

    fn enter_as_member(
        &self,
        project: &Project,
        credential: &Credential,
    ) -> Result<ProjectSession, AccessError> {
        let (username, password) = match credential {
            Credential::Member { username, password } => (username.trim(), password.as_str()),
            Credential::None => return Err(AccessError::IncorrectCredential(CredentialKind::Member)),
            other => {
                return Err(AccessError::UnexpectedCredential {
                    expected: CredentialKind::Member,
                    supplied: other.kind(),
                })
            }
        };

        let member = self
            .repo
            .find_member_by_username(project.id, username)?
            .ok_or(AccessError::IncorrectCredential(CredentialKind::Member))?;
        let salts = [member.password.salt.as_str(), project.salt.as_str()];
        if !self
            .hasher
            .verify(password, &salts, &member.password.hash)?
        {
            return Err(AccessError::IncorrectCredential(CredentialKind::Member));
        }

        let capabilities = self.member_capabilities(project, member.role_id)?;

        Ok(ProjectSession {
            project_id: project.id,
            actor: Actor::Member(member.id),
            role_id: Some(member.role_id),
            capabilities,
        })
    }

    /// Re-reads the records behind `session` and returns it with current
    /// capabilities.
    ///
    /// Fails with `SessionRevoked` when the member or role is gone or the
    /// project no longer admits this kind of actor.
    pub fn refresh(
        &self,
        project: &Project,
        session: &ProjectSession,
    ) -> Result<ProjectSession, AccessError> {
        if session.project_id != project.id {
            return Err(AccessError::SessionRevoked);
        }

        let refreshed = match session.actor {
            Actor::Admin if project.grants_implicit_admin() => ProjectSession::admin(project.id),
            Actor::Member(member_id) if project.members_enabled => {
                let member = self
                    .repo
                    .get_member(member_id)?
                    .filter(|member| member.project_id == project.id)
                    .ok_or(AccessError::SessionRevoked)?;
                ProjectSession {
                    project_id: project.id,
                    actor: session.actor,
                    role_id: Some(member.role_id),
                    capabilities: self.member_capabilities(project, member.role_id)?,
                }
            }
            Actor::Role(role_id) if required_credential(project) == CredentialKind::Role => {
                let role = self
                    .repo
                    .get_role(role_id)?
                    .filter(|role| role.project_id == project.id)
                    .ok_or(AccessError::SessionRevoked)?;
                ProjectSession {
                    project_id: project.id,
                    actor: session.actor,
                    role_id: Some(role.id),
                    capabilities: role.capabilities,
                }
            }
            _ => return Err(AccessError::SessionRevoked),
        };

        if refreshed.capabilities != session.capabilities {
            info!(
                "event=session_refresh module=access status=ok project_id={} actor={} capabilities={}",
                project.id,
                refreshed.actor.to_db(),
                refreshed.capabilities.bits()
            );
        }
        Ok(refreshed)
    }

    /// Member capabilities follow the assigned role only while roles are on.
    fn member_capabilities(
        &self,
        project: &Project,
        role_id: RoleId,
    ) -> Result<Capability, AccessError> {
        if !project.roles_enabled {
            return Ok(Capability::admin());
        }
        match self.repo.get_role(role_id)? {
            Some(role) => Ok(role.capabilities),
            None => {
                warn!(
                    "event=project_entry module=access status=degraded project_id={} error_code=member_role_missing",
                    project.id
                );
                Ok(Capability::empty())
            }
        }
    }

    fn enter_as_role(
        &self,
        project: &Project,
        credential: &Credential,
    ) -> Result<ProjectSession, AccessError> {
        let (role_name, password) = match credential {
            Credential::Role {
                role_name,
                password,
            } => (role_name.as_str(), password.as_str()),
            Credential::None => return Err(AccessError::IncorrectCredential(CredentialKind::Role)),
            other => {
                return Err(AccessError::UnexpectedCredential {
                    expected: CredentialKind::Role,
                    supplied: other.kind(),
                })
            }
        };

        let role = self
            .repo
            .find_role_by_name(project.id, role_name)?
            .ok_or(AccessError::IncorrectCredential(CredentialKind::Role))?;
        if !self
            .hasher
            .verify(password, &[role.password.salt.as_str()], &role.password.hash)?
        {
            return Err(AccessError::IncorrectCredential(CredentialKind::Role));
        }

        Ok(ProjectSession {
            project_id: project.id,
            actor: Actor::Role(role.id),
            role_id: Some(role.id),
            capabilities: role.capabilities,
        })
    }
}
