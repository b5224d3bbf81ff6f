//! Project workspace domain model.
//!
//! # Responsibility
//! - Define project, member, role and task records of the project schema.
//! - Define the role capability set and the reserved roles.
//!
//! # Invariants
//! - Every project owns exactly one `admin` and one `none` role.
//! - Reserved roles are never deleted, renamed or duplicated.
//! - An empty `password_hash` means "no password"; its salt is ignored.
//! - Members and roles reference their project by value only.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ProjectId = Uuid;
pub type MemberId = Uuid;
pub type RoleId = Uuid;
pub type TaskId = Uuid;

/// Name of the reserved full-privilege role.
pub const ADMIN_ROLE_NAME: &str = "admin";
/// Name of the reserved no-privilege role.
pub const NONE_ROLE_NAME: &str = "none";

bitflags! {
    /// Independent capability flags granted by a role.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Capability: u32 {
        const VIEW_TASK         = 1 << 0;
        const CREATE_TASK       = 1 << 1;
        const MODIFY_OWN_TASK   = 1 << 2;
        const MODIFY_OTHER_TASK = 1 << 3;
        const DELETE_OWN_TASK   = 1 << 4;
        const DELETE_OTHER_TASK = 1 << 5;
        const ASSIGN_TASK       = 1 << 6;
        const VIEW_MEMBERS      = 1 << 7;
        const MODIFY_MEMBERS    = 1 << 8;
        const DELETE_MEMBERS    = 1 << 9;
        const VIEW_ROLES        = 1 << 10;
        const MODIFY_ROLES      = 1 << 11;
        const DELETE_ROLES      = 1 << 12;
        const MODIFY_PROJECT    = 1 << 13;
        const DELETE_PROJECT    = 1 << 14;
    }
}

impl Capability {
    /// Full capability set held by the `admin` role.
    pub fn admin() -> Self {
        Self::all()
    }

    /// Decodes a persisted bit set, dropping unknown bits.
    pub fn from_db(value: i64) -> Self {
        Self::from_bits_truncate(value as u32)
    }

    pub fn to_db(self) -> i64 {
        i64::from(self.bits())
    }
}

/// Returns whether `name` is one of the reserved role names.
pub fn is_reserved_role_name(name: &str) -> bool {
    let trimmed = name.trim();
    trimmed.eq_ignore_ascii_case(ADMIN_ROLE_NAME) || trimmed.eq_ignore_ascii_case(NONE_ROLE_NAME)
}

/// Salted password digest as persisted. Both fields are hex strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordDigest {
    pub salt: String,
    pub hash: String,
}

impl PasswordDigest {
    /// Digest meaning "no password set".
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        !self.hash.is_empty()
    }
}

/// Collaborative workspace with optional password/member/role gating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    /// Project salt. Always present; it also salts member passwords.
    pub salt: String,
    /// Empty when the project has no password.
    pub password_hash: String,
    pub project_protected: bool,
    pub members_enabled: bool,
    pub roles_enabled: bool,
    /// Role assigned to new member signups.
    pub member_default_role: RoleId,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Project {
    /// Every entrant is admin when neither members nor roles gate entry.
    pub fn grants_implicit_admin(&self) -> bool {
        !self.members_enabled && !self.roles_enabled
    }
}

/// Named account scoped to one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub project_id: ProjectId,
    pub username: String,
    pub password: PasswordDigest,
    pub role_id: RoleId,
    pub created_at: i64,
}

/// Named capability set within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub project_id: ProjectId,
    pub name: String,
    pub password: PasswordDigest,
    pub capabilities: Capability,
    pub created_at: i64,
}

impl Role {
    pub fn is_reserved(&self) -> bool {
        is_reserved_role_name(&self.name)
    }
}

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// Identity a project session acts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Actor {
    Admin,
    Member(MemberId),
    Role(RoleId),
}

impl Actor {
    /// Stable text form: `admin`, `member:<uuid>` or `role:<uuid>`.
    pub fn to_db(self) -> String {
        match self {
            Self::Admin => "admin".to_string(),
            Self::Member(id) => format!("member:{id}"),
            Self::Role(id) => format!("role:{id}"),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        if value == "admin" {
            return Some(Self::Admin);
        }
        let (kind, id) = value.split_once(':')?;
        let id = Uuid::parse_str(id).ok()?;
        match kind {
            "member" => Some(Self::Member(id)),
            "role" => Some(Self::Role(id)),
            _ => None,
        }
    }
}

/// Unit of work inside a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    /// Who created the task.
    pub owner: Actor,
    pub assignee_id: Option<MemberId>,
    /// Epoch milliseconds.
    pub due_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}
