//! Two-state entry flow for one project screen.

use super::{
    required_credential, AccessError, AccessEvaluator, Credential, CredentialKind, ProjectSession,
};
use crate::model::project::Project;
use crate::repo::project_repo::ProjectRepository;

/// Entry state of a project screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    AwaitingCredential,
    Authenticated(ProjectSession),
}

/// Holds a project until a credential is accepted.
///
/// A failed submit leaves the gate awaiting; a successful one is final for
/// the gate's lifetime. Nothing is persisted.
#[derive(Debug, Clone)]
pub struct ProjectGate {
    project: Project,
    state: GateState,
}

impl ProjectGate {
    pub fn new(project: Project) -> Self {
        Self {
            project,
            state: GateState::AwaitingCredential,
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    /// Prompt the UI should show while awaiting.
    pub fn required_credential(&self) -> CredentialKind {
        required_credential(&self.project)
    }

    pub fn session(&self) -> Option<&ProjectSession> {
        match &self.state {
            GateState::Authenticated(session) => Some(session),
            GateState::AwaitingCredential => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }

    /// Evaluates `credential` and transitions to `Authenticated` on success.
    ///
    /// Once authenticated, further submits return the existing session.
    pub fn submit<R: ProjectRepository + ?Sized>(
        &mut self,
        evaluator: &AccessEvaluator<'_, R>,
        credential: &Credential,
    ) -> Result<ProjectSession, AccessError> {
        if let GateState::Authenticated(session) = &self.state {
            return Ok(session.clone());
        }

        let session = evaluator.evaluate(&self.project, credential)?;
        self.state = GateState::Authenticated(session.clone());
        Ok(session)
    }
}
