//! Project task use-case service.
//!
//! # Responsibility
//! - Provide task CRUD scoped to one authenticated project session.
//! - Map each operation to the capability it requires.
//!
//! # Invariants
//! - A task is "own" when the session actor created it, or when the session
//!   member is its assignee. Own tasks need `MODIFY_OWN_TASK` /
//!   `DELETE_OWN_TASK`; every other task needs the `*_OTHER_TASK` flag.
//! - Assignees must be members of the session's project.

use crate::access::{PermissionDenied, ProjectSession};
use crate::model::project::{Actor, Capability, MemberId, Task, TaskId, TaskStatus};
use crate::repo::task_repo::TaskRepository;
use crate::repo::RepoError;
use crate::service::project_service::now_epoch_ms;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Service error for task use-cases.
#[derive(Debug)]
pub enum TaskServiceError {
    BlankTitle,
    TaskNotFound(TaskId),
    /// Assignee is not a member of the session's project.
    UnknownAssignee(MemberId),
    PermissionDenied(PermissionDenied),
    Repo(RepoError),
}

impl Display for TaskServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTitle => write!(f, "task title cannot be blank"),
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::UnknownAssignee(id) => write!(f, "assignee is not a project member: {id}"),
            Self::PermissionDenied(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TaskServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::PermissionDenied(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for TaskServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity: "task", id } => Self::TaskNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<PermissionDenied> for TaskServiceError {
    fn from(value: PermissionDenied) -> Self {
        Self::PermissionDenied(value)
    }
}

/// Request model for creating a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub assignee_id: Option<MemberId>,
    /// Epoch milliseconds.
    pub due_at: Option<i64>,
}

/// Editable task fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskUpdate {
    pub title: String,
    pub description: String,
    pub due_at: Option<i64>,
}

/// Task service facade bound to one project session.
pub struct TaskService<'s, R: TaskRepository> {
    repo: R,
    session: &'s ProjectSession,
}

impl<'s, R: TaskRepository> TaskService<'s, R> {
    pub fn new(repo: R, session: &'s ProjectSession) -> Self {
        Self { repo, session }
    }

    /// Creates a task owned by the session actor. Requires `CREATE_TASK`.
    ///
    /// Setting an assignee at creation also requires `ASSIGN_TASK`.
    pub fn create_task(&self, request: &NewTask) -> Result<Task, TaskServiceError> {
        self.session.require(Capability::CREATE_TASK)?;
        if let Some(assignee_id) = request.assignee_id {
            self.session.require(Capability::ASSIGN_TASK)?;
            self.ensure_member(assignee_id)?;
        }

        let now = now_epoch_ms();
        let task = Task {
            id: Uuid::new_v4(),
            project_id: self.session.project_id,
            title: normalize_title(&request.title)?,
            description: request.description.clone(),
            status: TaskStatus::Todo,
            owner: self.session.actor,
            assignee_id: request.assignee_id,
            due_at: request.due_at,
            created_at: now,
            updated_at: now,
        };
        self.repo.create_task(&task)?;
        info!(
            "event=task_create module=service status=ok project_id={} task_id={}",
            task.project_id, task.id
        );
        self.load(task.id)
    }

    /// Lists project tasks by creation time. Requires `VIEW_TASK`.
    pub fn list_tasks(&self) -> Result<Vec<Task>, TaskServiceError> {
        self.session.require(Capability::VIEW_TASK)?;
        Ok(self.repo.list_tasks(self.session.project_id)?)
    }

    pub fn get_task(&self, id: TaskId) -> Result<Task, TaskServiceError> {
        self.session.require(Capability::VIEW_TASK)?;
        self.load(id)
    }

    /// Replaces title, description and due date.
    pub fn update_task(&self, id: TaskId, update: &TaskUpdate) -> Result<Task, TaskServiceError> {
        let mut task = self.load(id)?;
        self.require_modify(&task)?;
        task.title = normalize_title(&update.title)?;
        task.description = update.description.clone();
        task.due_at = update.due_at;
        self.repo.update_task(&task)?;
        self.load(id)
    }

    pub fn set_status(&self, id: TaskId, status: TaskStatus) -> Result<Task, TaskServiceError> {
        let mut task = self.load(id)?;
        self.require_modify(&task)?;
        task.status = status;
        self.repo.update_task(&task)?;
        self.load(id)
    }

    /// Sets or clears the assignee. Requires `ASSIGN_TASK`.
    pub fn assign_task(
        &self,
        id: TaskId,
        assignee_id: Option<MemberId>,
    ) -> Result<Task, TaskServiceError> {
        self.session.require(Capability::ASSIGN_TASK)?;
        let mut task = self.load(id)?;
        if let Some(member_id) = assignee_id {
            self.ensure_member(member_id)?;
        }
        task.assignee_id = assignee_id;
        self.repo.update_task(&task)?;
        self.load(id)
    }

    pub fn delete_task(&self, id: TaskId) -> Result<(), TaskServiceError> {
        let task = self.load(id)?;
        let required = if self.is_own(&task) {
            Capability::DELETE_OWN_TASK
        } else {
            Capability::DELETE_OTHER_TASK
        };
        self.session.require(required)?;
        self.repo.delete_task(self.session.project_id, id)?;
        info!(
            "event=task_delete module=service status=ok project_id={} task_id={}",
            self.session.project_id, id
        );
        Ok(())
    }

    fn require_modify(&self, task: &Task) -> Result<(), TaskServiceError> {
        let required = if self.is_own(task) {
            Capability::MODIFY_OWN_TASK
        } else {
            Capability::MODIFY_OTHER_TASK
        };
        Ok(self.session.require(required)?)
    }

    fn is_own(&self, task: &Task) -> bool {
        if task.owner == self.session.actor {
            return true;
        }
        matches!(
            (self.session.actor, task.assignee_id),
            (Actor::Member(member_id), Some(assignee_id)) if member_id == assignee_id
        )
    }

    fn ensure_member(&self, member_id: MemberId) -> Result<(), TaskServiceError> {
        if !self
            .repo
            .member_exists(self.session.project_id, member_id)?
        {
            return Err(TaskServiceError::UnknownAssignee(member_id));
        }
        Ok(())
    }

    fn load(&self, id: TaskId) -> Result<Task, TaskServiceError> {
        self.repo
            .get_task(self.session.project_id, id)?
            .ok_or(TaskServiceError::TaskNotFound(id))
    }
}

fn normalize_title(value: &str) -> Result<String, TaskServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TaskServiceError::BlankTitle);
    }
    Ok(trimmed.to_string())
}
