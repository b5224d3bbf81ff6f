//! Task repository contract and SQLite implementation.
//!
//! # Invariants
//! - Tasks are always scoped by `project_id`; cross-project reads return
//!   `None`.
//! - `owner` is persisted in `Actor::to_db` form and must parse back.

use crate::model::project::{Actor, MemberId, ProjectId, Task, TaskId, TaskStatus};
use crate::repo::{ensure_tables, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};

const TASK_SELECT_SQL: &str = "SELECT
    id,
    project_id,
    title,
    description,
    status,
    owner,
    assignee_id,
    due_at,
    created_at,
    updated_at
FROM tasks";

/// Repository interface for project tasks.
pub trait TaskRepository {
    fn create_task(&self, task: &Task) -> RepoResult<()>;
    fn get_task(&self, project_id: ProjectId, id: TaskId) -> RepoResult<Option<Task>>;
    /// Lists tasks by `created_at ASC, id ASC`.
    fn list_tasks(&self, project_id: ProjectId) -> RepoResult<Vec<Task>>;
    /// Writes title, description, status, assignee and due date.
    fn update_task(&self, task: &Task) -> RepoResult<()>;
    fn delete_task(&self, project_id: ProjectId, id: TaskId) -> RepoResult<()>;
    /// Returns whether `member_id` belongs to `project_id`.
    fn member_exists(&self, project_id: ProjectId, member_id: MemberId) -> RepoResult<bool>;
}

/// SQLite-backed task repository.
pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    /// Constructs a repository from a connection opened with `Schema::Project`.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["tasks", "members"])?;
        Ok(Self { conn })
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn create_task(&self, task: &Task) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO tasks (
                id,
                project_id,
                title,
                description,
                status,
                owner,
                assignee_id,
                due_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                task.id.to_string(),
                task.project_id.to_string(),
                task.title.as_str(),
                task.description.as_str(),
                task.status.as_str(),
                task.owner.to_db(),
                task.assignee_id.map(|id| id.to_string()),
                task.due_at,
            ],
        )?;
        Ok(())
    }

    fn get_task(&self, project_id: ProjectId, id: TaskId) -> RepoResult<Option<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL} WHERE id = ?1 AND project_id = ?2;"
        ))?;
        let mut rows = stmt.query(params![id.to_string(), project_id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_task_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_tasks(&self, project_id: ProjectId) -> RepoResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL}
             WHERE project_id = ?1
             ORDER BY created_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([project_id.to_string()])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        Ok(tasks)
    }

    fn update_task(&self, task: &Task) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE tasks
             SET
                title = ?3,
                description = ?4,
                status = ?5,
                assignee_id = ?6,
                due_at = ?7,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND project_id = ?2;",
            params![
                task.id.to_string(),
                task.project_id.to_string(),
                task.title.as_str(),
                task.description.as_str(),
                task.status.as_str(),
                task.assignee_id.map(|id| id.to_string()),
                task.due_at,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "task",
                id: task.id,
            });
        }
        Ok(())
    }

    fn delete_task(&self, project_id: ProjectId, id: TaskId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM tasks WHERE id = ?1 AND project_id = ?2;",
            params![id.to_string(), project_id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound { entity: "task", id });
        }
        Ok(())
    }

    fn member_exists(&self, project_id: ProjectId, member_id: MemberId) -> RepoResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM members WHERE id = ?1 AND project_id = ?2;",
            params![member_id.to_string(), project_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let id_text: String = row.get("id")?;
    let project_text: String = row.get("project_id")?;

    let status_text: String = row.get("status")?;
    let status = TaskStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid task status `{status_text}` in tasks.status"))
    })?;

    let owner_text: String = row.get("owner")?;
    let owner = Actor::parse(&owner_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid task owner `{owner_text}` in tasks.owner"))
    })?;

    let assignee_id: Option<MemberId> = match row.get::<_, Option<String>>("assignee_id")? {
        Some(value) => Some(parse_uuid(&value, "tasks.assignee_id")?),
        None => None,
    };

    Ok(Task {
        id: parse_uuid(&id_text, "tasks.id")?,
        project_id: parse_uuid(&project_text, "tasks.project_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status,
        owner,
        assignee_id,
        due_at: row.get("due_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
