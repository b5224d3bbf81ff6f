//! Project/member/role repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist the records the access evaluator reads at project entry.
//! - Own cascading deletes, which are not enforced by the schema.
//!
//! # Invariants
//! - Usernames are unique per project; role names are unique per project
//!   case-insensitively. Violations surface as `RepoError::Duplicate`.
//! - `delete_project_cascade` removes tasks, members, roles and the project
//!   row in one transaction.
//! - Deleting a role reassigns its members to a fallback role first.
//! - The `admin` role password is written together with the project password.

use crate::model::project::{
    Capability, Member, MemberId, PasswordDigest, Project, ProjectId, Role, RoleId,
    ADMIN_ROLE_NAME,
};
use crate::repo::{
    bool_to_int, ensure_tables, map_unique_violation, parse_bool, parse_uuid, RepoError,
    RepoResult,
};
use rusqlite::{params, Connection, Row, TransactionBehavior};

const PROJECT_SELECT_SQL: &str = "SELECT
    id,
    name,
    salt,
    password_hash,
    project_protected,
    members_enabled,
    roles_enabled,
    member_default_role,
    created_at,
    updated_at
FROM projects";

const MEMBER_SELECT_SQL: &str = "SELECT
    id,
    project_id,
    username,
    salt,
    password_hash,
    role_id,
    created_at
FROM members";

const ROLE_SELECT_SQL: &str = "SELECT
    id,
    project_id,
    name,
    salt,
    password_hash,
    capabilities,
    created_at
FROM roles";

/// Repository interface for project access-control records.
pub trait ProjectRepository {
    /// Inserts a project together with its initial roles.
    fn create_project(&mut self, project: &Project, roles: &[Role]) -> RepoResult<()>;
    fn get_project(&self, id: ProjectId) -> RepoResult<Option<Project>>;
    /// Lists projects by name.
    fn list_projects(&self) -> RepoResult<Vec<Project>>;
    /// Writes name, gating flags and default role.
    fn update_project_settings(&self, project: &Project) -> RepoResult<()>;
    /// Sets the project password and mirrors it onto the `admin` role in
    /// one transaction. An empty hash clears protection.
    fn update_project_password(&mut self, id: ProjectId, password_hash: &str) -> RepoResult<()>;
    fn delete_project_cascade(&mut self, id: ProjectId) -> RepoResult<()>;

    fn create_member(&self, member: &Member) -> RepoResult<()>;
    fn get_member(&self, id: MemberId) -> RepoResult<Option<Member>>;
    fn find_member_by_username(
        &self,
        project_id: ProjectId,
        username: &str,
    ) -> RepoResult<Option<Member>>;
    fn list_members(&self, project_id: ProjectId) -> RepoResult<Vec<Member>>;
    fn update_member_role(&self, id: MemberId, role_id: RoleId) -> RepoResult<()>;
    fn update_member_password(&self, id: MemberId, password: &PasswordDigest) -> RepoResult<()>;
    fn delete_member(&self, id: MemberId) -> RepoResult<()>;

    fn create_role(&self, role: &Role) -> RepoResult<()>;
    fn get_role(&self, id: RoleId) -> RepoResult<Option<Role>>;
    fn find_role_by_name(&self, project_id: ProjectId, name: &str) -> RepoResult<Option<Role>>;
    fn list_roles(&self, project_id: ProjectId) -> RepoResult<Vec<Role>>;
    /// Writes capabilities and password of an existing role.
    fn update_role(&self, role: &Role) -> RepoResult<()>;
    /// Moves members of `id` to `fallback` and deletes the role atomically.
    fn delete_role(&mut self, id: RoleId, fallback: RoleId) -> RepoResult<usize>;
}

/// SQLite-backed project repository.
pub struct SqliteProjectRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteProjectRepository<'conn> {
    /// Constructs a repository from a connection opened with `Schema::Project`.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["projects", "members", "roles", "tasks"])?;
        Ok(Self { conn })
    }
}

impl ProjectRepository for SqliteProjectRepository<'_> {
    fn create_project(&mut self, project: &Project, roles: &[Role]) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO projects (
                id,
                name,
                salt,
                password_hash,
                project_protected,
                members_enabled,
                roles_enabled,
                member_default_role
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                project.id.to_string(),
                project.name.as_str(),
                project.salt.as_str(),
                project.password_hash.as_str(),
                bool_to_int(project.project_protected),
                bool_to_int(project.members_enabled),
                bool_to_int(project.roles_enabled),
                project.member_default_role.to_string(),
            ],
        )?;
        for role in roles {
            insert_role(&tx, role)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get_project(&self, id: ProjectId) -> RepoResult<Option<Project>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PROJECT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_project_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_projects(&self) -> RepoResult<Vec<Project>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PROJECT_SELECT_SQL} ORDER BY name COLLATE NOCASE ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut projects = Vec::new();
        while let Some(row) = rows.next()? {
            projects.push(parse_project_row(row)?);
        }
        Ok(projects)
    }

    fn update_project_settings(&self, project: &Project) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE projects
             SET
                name = ?2,
                project_protected = ?3,
                members_enabled = ?4,
                roles_enabled = ?5,
                member_default_role = ?6,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                project.id.to_string(),
                project.name.as_str(),
                bool_to_int(project.project_protected),
                bool_to_int(project.members_enabled),
                bool_to_int(project.roles_enabled),
                project.member_default_role.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(not_found("project", project.id));
        }
        Ok(())
    }

    fn update_project_password(&mut self, id: ProjectId, password_hash: &str) -> RepoResult<()> {
        let id_text = id.to_string();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE projects
             SET
                password_hash = ?2,
                project_protected = ?3,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                id_text.as_str(),
                password_hash,
                bool_to_int(!password_hash.is_empty())
            ],
        )?;
        if changed == 0 {
            return Err(not_found("project", id));
        }
        tx.execute(
            "UPDATE roles
             SET
                salt = (SELECT salt FROM projects WHERE id = ?1),
                password_hash = ?2
             WHERE project_id = ?1 AND name = ?3;",
            params![id_text.as_str(), password_hash, ADMIN_ROLE_NAME],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete_project_cascade(&mut self, id: ProjectId) -> RepoResult<()> {
        let id_text = id.to_string();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM tasks WHERE project_id = ?1;", [id_text.as_str()])?;
        tx.execute("DELETE FROM members WHERE project_id = ?1;", [id_text.as_str()])?;
        tx.execute("DELETE FROM roles WHERE project_id = ?1;", [id_text.as_str()])?;
        let changed = tx.execute("DELETE FROM projects WHERE id = ?1;", [id_text.as_str()])?;
        if changed == 0 {
            return Err(not_found("project", id));
        }
        tx.commit()?;
        Ok(())
    }

    fn create_member(&self, member: &Member) -> RepoResult<()> {
        self.conn
            .execute(
                "INSERT INTO members (id, project_id, username, salt, password_hash, role_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                params![
                    member.id.to_string(),
                    member.project_id.to_string(),
                    member.username.as_str(),
                    member.password.salt.as_str(),
                    member.password.hash.as_str(),
                    member.role_id.to_string(),
                ],
            )
            .map_err(|err| map_unique_violation(err, "member", &member.username))?;
        Ok(())
    }

    fn get_member(&self, id: MemberId) -> RepoResult<Option<Member>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{MEMBER_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_member_row(row)?)),
            None => Ok(None),
        }
    }

    fn find_member_by_username(
        &self,
        project_id: ProjectId,
        username: &str,
    ) -> RepoResult<Option<Member>> {
        let mut stmt = self.conn.prepare(&format!(
            "{MEMBER_SELECT_SQL} WHERE project_id = ?1 AND username = ?2;"
        ))?;
        let mut rows = stmt.query(params![project_id.to_string(), username])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_member_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_members(&self, project_id: ProjectId) -> RepoResult<Vec<Member>> {
        let mut stmt = self.conn.prepare(&format!(
            "{MEMBER_SELECT_SQL} WHERE project_id = ?1 ORDER BY username ASC;"
        ))?;
        let mut rows = stmt.query([project_id.to_string()])?;
        let mut members = Vec::new();
        while let Some(row) = rows.next()? {
            members.push(parse_member_row(row)?);
        }
        Ok(members)
    }

    fn update_member_role(&self, id: MemberId, role_id: RoleId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE members SET role_id = ?2 WHERE id = ?1;",
            params![id.to_string(), role_id.to_string()],
        )?;
        if changed == 0 {
            return Err(not_found("member", id));
        }
        Ok(())
    }

    fn update_member_password(&self, id: MemberId, password: &PasswordDigest) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE members SET salt = ?2, password_hash = ?3 WHERE id = ?1;",
            params![
                id.to_string(),
                password.salt.as_str(),
                password.hash.as_str()
            ],
        )?;
        if changed == 0 {
            return Err(not_found("member", id));
        }
        Ok(())
    }

    fn delete_member(&self, id: MemberId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM members WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(not_found("member", id));
        }
        Ok(())
    }

    fn create_role(&self, role: &Role) -> RepoResult<()> {
        insert_role(self.conn, role)
    }

    fn get_role(&self, id: RoleId) -> RepoResult<Option<Role>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ROLE_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_role_row(row)?)),
            None => Ok(None),
        }
    }

    fn find_role_by_name(&self, project_id: ProjectId, name: &str) -> RepoResult<Option<Role>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ROLE_SELECT_SQL} WHERE project_id = ?1 AND name = ?2 COLLATE NOCASE;"
        ))?;
        let mut rows = stmt.query(params![project_id.to_string(), name.trim()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_role_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_roles(&self, project_id: ProjectId) -> RepoResult<Vec<Role>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ROLE_SELECT_SQL} WHERE project_id = ?1 ORDER BY name COLLATE NOCASE ASC;"
        ))?;
        let mut rows = stmt.query([project_id.to_string()])?;
        let mut roles = Vec::new();
        while let Some(row) = rows.next()? {
            roles.push(parse_role_row(row)?);
        }
        Ok(roles)
    }

    fn update_role(&self, role: &Role) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE roles
             SET
                salt = ?2,
                password_hash = ?3,
                capabilities = ?4
             WHERE id = ?1;",
            params![
                role.id.to_string(),
                role.password.salt.as_str(),
                role.password.hash.as_str(),
                role.capabilities.to_db(),
            ],
        )?;
        if changed == 0 {
            return Err(not_found("role", role.id));
        }
        Ok(())
    }

    fn delete_role(&mut self, id: RoleId, fallback: RoleId) -> RepoResult<usize> {
        let id_text = id.to_string();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let reassigned = tx.execute(
            "UPDATE members SET role_id = ?2 WHERE role_id = ?1;",
            params![id_text.as_str(), fallback.to_string()],
        )?;
        tx.execute(
            "UPDATE projects
             SET member_default_role = ?2
             WHERE member_default_role = ?1;",
            params![id_text.as_str(), fallback.to_string()],
        )?;
        let changed = tx.execute("DELETE FROM roles WHERE id = ?1;", [id_text.as_str()])?;
        if changed == 0 {
            return Err(not_found("role", id));
        }
        tx.commit()?;
        Ok(reassigned)
    }
}

fn insert_role(conn: &Connection, role: &Role) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO roles (id, project_id, name, salt, password_hash, capabilities)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            role.id.to_string(),
            role.project_id.to_string(),
            role.name.as_str(),
            role.password.salt.as_str(),
            role.password.hash.as_str(),
            role.capabilities.to_db(),
        ],
    )
    .map_err(|err| map_unique_violation(err, "role", &role.name))?;
    Ok(())
}

fn parse_project_row(row: &Row<'_>) -> RepoResult<Project> {
    let id_text: String = row.get("id")?;
    let default_role_text: String = row.get("member_default_role")?;
    Ok(Project {
        id: parse_uuid(&id_text, "projects.id")?,
        name: row.get("name")?,
        salt: row.get("salt")?,
        password_hash: row.get("password_hash")?,
        project_protected: parse_bool(
            row.get("project_protected")?,
            "projects.project_protected",
        )?,
        members_enabled: parse_bool(row.get("members_enabled")?, "projects.members_enabled")?,
        roles_enabled: parse_bool(row.get("roles_enabled")?, "projects.roles_enabled")?,
        member_default_role: parse_uuid(&default_role_text, "projects.member_default_role")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_member_row(row: &Row<'_>) -> RepoResult<Member> {
    let id_text: String = row.get("id")?;
    let project_text: String = row.get("project_id")?;
    let role_text: String = row.get("role_id")?;
    Ok(Member {
        id: parse_uuid(&id_text, "members.id")?,
        project_id: parse_uuid(&project_text, "members.project_id")?,
        username: row.get("username")?,
        password: PasswordDigest {
            salt: row.get("salt")?,
            hash: row.get("password_hash")?,
        },
        role_id: parse_uuid(&role_text, "members.role_id")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_role_row(row: &Row<'_>) -> RepoResult<Role> {
    let id_text: String = row.get("id")?;
    let project_text: String = row.get("project_id")?;
    Ok(Role {
        id: parse_uuid(&id_text, "roles.id")?,
        project_id: parse_uuid(&project_text, "roles.project_id")?,
        name: row.get("name")?,
        password: PasswordDigest {
            salt: row.get("salt")?,
            hash: row.get("password_hash")?,
        },
        capabilities: Capability::from_db(row.get("capabilities")?),
        created_at: row.get("created_at")?,
    })
}

fn not_found(entity: &'static str, id: uuid::Uuid) -> RepoError {
    RepoError::NotFound { entity, id }
}
