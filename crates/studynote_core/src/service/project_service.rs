//! Project/member/role use-case service.
//!
//! # Responsibility
//! - Create projects with their reserved roles and salted password.
//! - Gate every settings mutation on the acting session's capabilities.
//! - Hand out access evaluators for project entry.
//!
//! # Invariants
//! - A project salt is generated for every project, even without password.
//! - The `admin` role always shares the project password; `none` has none.
//! - New signups default to the `none` role unless settings name another.
//! - Signups on a protected project require the project password.
//! - The first member to sign up holds the `admin` role.
//! - Reserved roles are never deleted, renamed or given other capabilities.
//! - New passwords pass `check_new_password` before they are hashed.

use crate::access::{
    AccessError, AccessEvaluator, Credential, CredentialKind, PermissionDenied, ProjectGate,
    ProjectSession,
};
use crate::crypto::password::{check_new_password, PasswordHasher, PasswordPolicyError};
use crate::crypto::CryptoError;
use crate::model::project::{
    is_reserved_role_name, Actor, Capability, Member, MemberId, PasswordDigest, Project,
    ProjectId, Role, RoleId, ADMIN_ROLE_NAME, NONE_ROLE_NAME,
};
use crate::repo::project_repo::ProjectRepository;
use crate::repo::RepoError;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]{1,32}$").expect("valid username regex"));

/// Service error for project use-cases.
#[derive(Debug)]
pub enum ProjectServiceError {
    BlankName,
    InvalidUsername(String),
    Password(PasswordPolicyError),
    ProjectNotFound(ProjectId),
    MemberNotFound(MemberId),
    RoleNotFound(RoleId),
    DuplicateUsername(String),
    DuplicateRole(String),
    /// Target is the `admin` or `none` role.
    ReservedRole(String),
    /// Signup attempted on a project without member accounts.
    MembersDisabled(ProjectId),
    /// Session belongs to another project.
    SessionMismatch {
        session_project: ProjectId,
        target_project: ProjectId,
    },
    PermissionDenied(PermissionDenied),
    Access(AccessError),
    Crypto(CryptoError),
    Repo(RepoError),
}

impl Display for ProjectServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "name cannot be blank"),
            Self::InvalidUsername(name) => write!(
                f,
                "invalid username `{name}`; use 1-32 letters, digits, `_`, `.` or `-`"
            ),
            Self::Password(err) => write!(f, "{err}"),
            Self::ProjectNotFound(id) => write!(f, "project not found: {id}"),
            Self::MemberNotFound(id) => write!(f, "member not found: {id}"),
            Self::RoleNotFound(id) => write!(f, "role not found: {id}"),
            Self::DuplicateUsername(name) => write!(f, "username `{name}` is already taken"),
            Self::DuplicateRole(name) => write!(f, "role `{name}` already exists"),
            Self::ReservedRole(name) => write!(f, "role `{name}` is reserved"),
            Self::MembersDisabled(id) => write!(f, "project {id} does not accept members"),
            Self::SessionMismatch {
                session_project,
                target_project,
            } => write!(
                f,
                "session for project {session_project} cannot act on project {target_project}"
            ),
            Self::PermissionDenied(err) => write!(f, "{err}"),
            Self::Access(err) => write!(f, "{err}"),
            Self::Crypto(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ProjectServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Password(err) => Some(err),
            Self::PermissionDenied(err) => Some(err),
            Self::Access(err) => Some(err),
            Self::Crypto(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ProjectServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound {
                entity: "project",
                id,
            } => Self::ProjectNotFound(id),
            RepoError::NotFound {
                entity: "member",
                id,
            } => Self::MemberNotFound(id),
            RepoError::NotFound { entity: "role", id } => Self::RoleNotFound(id),
            RepoError::Duplicate {
                entity: "member",
                value,
            } => Self::DuplicateUsername(value),
            RepoError::Duplicate {
                entity: "role",
                value,
            } => Self::DuplicateRole(value),
            other => Self::Repo(other),
        }
    }
}

impl From<PasswordPolicyError> for ProjectServiceError {
    fn from(value: PasswordPolicyError) -> Self {
        Self::Password(value)
    }
}

impl From<PermissionDenied> for ProjectServiceError {
    fn from(value: PermissionDenied) -> Self {
        Self::PermissionDenied(value)
    }
}

impl From<AccessError> for ProjectServiceError {
    fn from(value: AccessError) -> Self {
        Self::Access(value)
    }
}

impl From<CryptoError> for ProjectServiceError {
    fn from(value: CryptoError) -> Self {
        Self::Crypto(value)
    }
}

/// Request model for creating a project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewProject {
    pub name: String,
    /// Empty for an unprotected project.
    pub password: String,
    pub members_enabled: bool,
    pub roles_enabled: bool,
}

/// Mutable project settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSettings {
    pub name: String,
    pub members_enabled: bool,
    pub roles_enabled: bool,
    /// Keeps the current default role when `None`.
    pub member_default_role: Option<RoleId>,
}

/// Request model for creating a custom role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRole {
    pub name: String,
    /// Empty for a role without password.
    pub password: String,
    pub capabilities: Capability,
}

/// Project service facade over repository implementations.
pub struct ProjectService<R: ProjectRepository> {
    repo: R,
    hasher: PasswordHasher,
}

impl<R: ProjectRepository> ProjectService<R> {
    pub fn new(repo: R, hasher: PasswordHasher) -> Self {
        Self { repo, hasher }
    }

    /// Evaluator bound to this service's repository.
    pub fn evaluator(&self) -> AccessEvaluator<'_, R> {
        AccessEvaluator::new(&self.repo, self.hasher)
    }

    /// Entry gate for `project_id`, awaiting a credential.
    pub fn open_gate(&self, project_id: ProjectId) -> Result<ProjectGate, ProjectServiceError> {
        Ok(ProjectGate::new(self.load_project(project_id)?))
    }

    /// Evaluates `credential` for `project_id` in one step.
    pub fn enter(
        &self,
        project_id: ProjectId,
        credential: &Credential,
    ) -> Result<ProjectSession, ProjectServiceError> {
        let project = self.load_project(project_id)?;
        Ok(self.evaluator().evaluate(&project, credential)?)
    }

    /// Re-validates a stored session against current project records.
    pub fn refresh_session(
        &self,
        session: &ProjectSession,
    ) -> Result<ProjectSession, ProjectServiceError> {
        let project = self.load_project(session.project_id)?;
        Ok(self.evaluator().refresh(&project, session)?)
    }

    /// Creates a project with its `admin` and `none` roles.
    pub fn create_project(&mut self, request: &NewProject) -> Result<Project, ProjectServiceError> {
        let name = normalize_name(&request.name)?;
        check_new_password(&request.password, true)?;

        let salt = self.hasher.generate_salt();
        let password_hash = if request.password.is_empty() {
            String::new()
        } else {
            self.hasher.hash(&request.password, &[salt.as_str()])?
        };

        let project_id = Uuid::new_v4();
        let now = now_epoch_ms();
        let admin_role = Role {
            id: Uuid::new_v4(),
            project_id,
            name: ADMIN_ROLE_NAME.to_string(),
            password: PasswordDigest {
                salt: salt.clone(),
                hash: password_hash.clone(),
            },
            capabilities: Capability::admin(),
            created_at: now,
        };
        let none_role = Role {
            id: Uuid::new_v4(),
            project_id,
            name: NONE_ROLE_NAME.to_string(),
            password: PasswordDigest::none(),
            capabilities: Capability::empty(),
            created_at: now,
        };
        let member_default_role = none_role.id;

        let project = Project {
            id: project_id,
            name,
            salt,
            project_protected: !password_hash.is_empty(),
            password_hash,
            members_enabled: request.members_enabled,
            roles_enabled: request.roles_enabled,
            member_default_role,
            created_at: now,
            updated_at: now,
        };
        self.repo.create_project(&project, &[admin_role, none_role])?;
        info!(
            "event=project_create module=service status=ok project_id={} protected={} members={} roles={}",
            project.id, project.project_protected, project.members_enabled, project.roles_enabled
        );
        self.load_project(project_id)
    }

    pub fn get_project(&self, id: ProjectId) -> Result<Option<Project>, ProjectServiceError> {
        Ok(self.repo.get_project(id)?)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>, ProjectServiceError> {
        Ok(self.repo.list_projects()?)
    }

    /// Rewrites name, gating flags and default role. Requires `MODIFY_PROJECT`.
    pub fn update_settings(
        &self,
        session: &ProjectSession,
        settings: &ProjectSettings,
    ) -> Result<Project, ProjectServiceError> {
        session.require(Capability::MODIFY_PROJECT)?;
        let mut project = self.load_project(session.project_id)?;

        if let Some(role_id) = settings.member_default_role {
            self.load_role(project.id, role_id)?;
            project.member_default_role = role_id;
        } else if settings.roles_enabled && !project.roles_enabled {
            let default_role = self.load_role(project.id, project.member_default_role)?;
            if default_role.name == ADMIN_ROLE_NAME {
                project.member_default_role = self.load_none_role(project.id)?.id;
            }
        }
        project.name = normalize_name(&settings.name)?;
        project.members_enabled = settings.members_enabled;
        project.roles_enabled = settings.roles_enabled;

        self.repo.update_project_settings(&project)?;
        info!(
            "event=project_update module=service status=ok project_id={} members={} roles={}",
            project.id, project.members_enabled, project.roles_enabled
        );
        self.load_project(project.id)
    }

    /// Sets or clears the project password. Requires `MODIFY_PROJECT`.
    ///
    /// The `admin` role password follows the project password.
    pub fn change_password(
        &mut self,
        session: &ProjectSession,
        new_password: &str,
    ) -> Result<(), ProjectServiceError> {
        session.require(Capability::MODIFY_PROJECT)?;
        check_new_password(new_password, true)?;
        let project = self.load_project(session.project_id)?;

        let password_hash = if new_password.is_empty() {
            String::new()
        } else {
            self.hasher.hash(new_password, &[project.salt.as_str()])?
        };
        self.repo.update_project_password(project.id, &password_hash)?;
        info!(
            "event=project_password_change module=service status=ok project_id={} protected={}",
            project.id,
            !password_hash.is_empty()
        );
        Ok(())
    }

    /// Deletes the project with its tasks, members and roles. Requires `DELETE_PROJECT`.
    pub fn delete_project(&mut self, session: &ProjectSession) -> Result<(), ProjectServiceError> {
        session.require(Capability::DELETE_PROJECT)?;
        self.repo.delete_project_cascade(session.project_id)?;
        info!(
            "event=project_delete module=service status=ok project_id={}",
            session.project_id
        );
        Ok(())
    }

    /// Registers a member account.
    ///
    /// A protected project admits signups only with its project password.
    /// The first member of a project holds the `admin` role; later members
    /// get the project's default role.
    pub fn signup_member(
        &self,
        project_id: ProjectId,
        username: &str,
        password: &str,
        project_password: &str,
    ) -> Result<Member, ProjectServiceError> {
        let project = self.load_project(project_id)?;
        if !project.members_enabled {
            return Err(ProjectServiceError::MembersDisabled(project_id));
        }
        if project.project_protected
            && !self.hasher.verify(
                project_password,
                &[project.salt.as_str()],
                &project.password_hash,
            )?
        {
            warn!(
                "event=member_signup module=service status=denied project_id={} error_code=project_password",
                project_id
            );
            return Err(AccessError::IncorrectCredential(CredentialKind::ProjectPassword).into());
        }

        let username = username.trim();
        if !USERNAME_RE.is_match(username) {
            return Err(ProjectServiceError::InvalidUsername(username.to_string()));
        }
        check_new_password(password, true)?;
        if self
            .repo
            .find_member_by_username(project_id, username)?
            .is_some()
        {
            return Err(ProjectServiceError::DuplicateUsername(username.to_string()));
        }

        let role_id = if self.repo.list_members(project_id)?.is_empty() {
            self.repo
                .find_role_by_name(project_id, ADMIN_ROLE_NAME)?
                .map_or(project.member_default_role, |role| role.id)
        } else {
            project.member_default_role
        };

        let member = Member {
            id: Uuid::new_v4(),
            project_id,
            username: username.to_string(),
            password: self.hasher.digest(password, &[project.salt.as_str()])?,
            role_id,
            created_at: now_epoch_ms(),
        };
        self.repo.create_member(&member)?;
        info!(
            "event=member_signup module=service status=ok project_id={} member_id={}",
            project_id, member.id
        );
        Ok(member)
    }

    /// Replaces the password of the session's own member account.
    pub fn change_member_password(
        &self,
        session: &ProjectSession,
        new_password: &str,
    ) -> Result<(), ProjectServiceError> {
        let Actor::Member(member_id) = session.actor else {
            return Err(ProjectServiceError::PermissionDenied(PermissionDenied {
                required: Capability::MODIFY_MEMBERS,
            }));
        };
        check_new_password(new_password, true)?;
        let project = self.load_project(session.project_id)?;
        let digest = self.hasher.digest(new_password, &[project.salt.as_str()])?;
        self.repo.update_member_password(member_id, &digest)?;
        Ok(())
    }

    /// Lists members by username. Requires `VIEW_MEMBERS`.
    pub fn list_members(&self, session: &ProjectSession) -> Result<Vec<Member>, ProjectServiceError> {
        session.require(Capability::VIEW_MEMBERS)?;
        Ok(self.repo.list_members(session.project_id)?)
    }

    /// Moves a member to another role. Requires `MODIFY_MEMBERS`.
    pub fn assign_member_role(
        &self,
        session: &ProjectSession,
        member_id: MemberId,
        role_id: RoleId,
    ) -> Result<Member, ProjectServiceError> {
        session.require(Capability::MODIFY_MEMBERS)?;
        let member = self.load_member(session.project_id, member_id)?;
        self.load_role(session.project_id, role_id)?;
        self.repo.update_member_role(member.id, role_id)?;
        Ok(Member { role_id, ..member })
    }

    /// Removes a member account. Requires `DELETE_MEMBERS`.
    pub fn delete_member(
        &self,
        session: &ProjectSession,
        member_id: MemberId,
    ) -> Result<(), ProjectServiceError> {
        session.require(Capability::DELETE_MEMBERS)?;
        let member = self.load_member(session.project_id, member_id)?;
        self.repo.delete_member(member.id)?;
        info!(
            "event=member_delete module=service status=ok project_id={} member_id={}",
            session.project_id, member.id
        );
        Ok(())
    }

    /// Lists roles by name. Requires `VIEW_ROLES`.
    pub fn list_roles(&self, session: &ProjectSession) -> Result<Vec<Role>, ProjectServiceError> {
        session.require(Capability::VIEW_ROLES)?;
        Ok(self.repo.list_roles(session.project_id)?)
    }

    /// Creates a custom role. Requires `MODIFY_ROLES`.
    ///
    /// Names are unique per project ignoring case; reserved names are refused.
    pub fn create_role(
        &self,
        session: &ProjectSession,
        request: &NewRole,
    ) -> Result<Role, ProjectServiceError> {
        session.require(Capability::MODIFY_ROLES)?;
        let name = normalize_name(&request.name)?;
        if is_reserved_role_name(&name) {
            return Err(ProjectServiceError::ReservedRole(name));
        }
        check_new_password(&request.password, true)?;
        if self
            .repo
            .find_role_by_name(session.project_id, &name)?
            .is_some()
        {
            return Err(ProjectServiceError::DuplicateRole(name));
        }

        let role = Role {
            id: Uuid::new_v4(),
            project_id: session.project_id,
            name,
            password: self.hasher.digest(&request.password, &[])?,
            capabilities: request.capabilities,
            created_at: now_epoch_ms(),
        };
        self.repo.create_role(&role)?;
        info!(
            "event=role_create module=service status=ok project_id={} role_id={} capabilities={}",
            role.project_id,
            role.id,
            role.capabilities.bits()
        );
        Ok(role)
    }

    /// Replaces the capability set of a custom role. Requires `MODIFY_ROLES`.
    pub fn update_role_capabilities(
        &self,
        session: &ProjectSession,
        role_id: RoleId,
        capabilities: Capability,
    ) -> Result<Role, ProjectServiceError> {
        session.require(Capability::MODIFY_ROLES)?;
        let mut role = self.load_role(session.project_id, role_id)?;
        if role.is_reserved() {
            return Err(ProjectServiceError::ReservedRole(role.name));
        }
        role.capabilities = capabilities;
        self.repo.update_role(&role)?;
        Ok(role)
    }

    /// Sets or clears a role password. Requires `MODIFY_ROLES`.
    pub fn set_role_password(
        &self,
        session: &ProjectSession,
        role_id: RoleId,
        password: &str,
    ) -> Result<(), ProjectServiceError> {
        session.require(Capability::MODIFY_ROLES)?;
        check_new_password(password, true)?;
        let mut role = self.load_role(session.project_id, role_id)?;
        role.password = self.hasher.digest(password, &[])?;
        self.repo.update_role(&role)?;
        Ok(())
    }

    /// Deletes a custom role. Requires `DELETE_ROLES`.
    ///
    /// Members holding the role fall back to `none`. Returns how many were moved.
    pub fn delete_role(
        &mut self,
        session: &ProjectSession,
        role_id: RoleId,
    ) -> Result<usize, ProjectServiceError> {
        session.require(Capability::DELETE_ROLES)?;
        let role = self.load_role(session.project_id, role_id)?;
        if role.is_reserved() {
            return Err(ProjectServiceError::ReservedRole(role.name));
        }
        let fallback = self.load_none_role(session.project_id)?;

        let reassigned = self.repo.delete_role(role.id, fallback.id)?;
        info!(
            "event=role_delete module=service status=ok project_id={} role_id={} reassigned={}",
            session.project_id, role.id, reassigned
        );
        Ok(reassigned)
    }

    fn load_project(&self, id: ProjectId) -> Result<Project, ProjectServiceError> {
        self.repo
            .get_project(id)?
            .ok_or(ProjectServiceError::ProjectNotFound(id))
    }

    fn load_none_role(&self, project_id: ProjectId) -> Result<Role, ProjectServiceError> {
        let role = self
            .repo
            .find_role_by_name(project_id, NONE_ROLE_NAME)?
            .ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "project {project_id} has no `{NONE_ROLE_NAME}` role"
                ))
            })?;
        Ok(role)
    }

    fn load_role(&self, project_id: ProjectId, id: RoleId) -> Result<Role, ProjectServiceError> {
        let role = self
            .repo
            .get_role(id)?
            .ok_or(ProjectServiceError::RoleNotFound(id))?;
        ensure_same_project(project_id, role.project_id)?;
        Ok(role)
    }

    fn load_member(
        &self,
        project_id: ProjectId,
        id: MemberId,
    ) -> Result<Member, ProjectServiceError> {
        let member = self
            .repo
            .get_member(id)?
            .ok_or(ProjectServiceError::MemberNotFound(id))?;
        ensure_same_project(project_id, member.project_id)?;
        Ok(member)
    }
}

fn ensure_same_project(
    session_project: ProjectId,
    target_project: ProjectId,
) -> Result<(), ProjectServiceError> {
    if session_project != target_project {
        return Err(ProjectServiceError::SessionMismatch {
            session_project,
            target_project,
        });
    }
    Ok(())
}

fn normalize_name(value: &str) -> Result<String, ProjectServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ProjectServiceError::BlankName);
    }
    Ok(trimmed.to_string())
}

pub(crate) fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}
