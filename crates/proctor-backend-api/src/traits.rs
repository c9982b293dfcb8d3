//! Collaborator traits

use async_trait::async_trait;
use proctor_api::{AnswerValue, FinalizeReason, ResponseSet, SessionManifest};
use proctor_util::{QuestionId, SessionId};
use thiserror::Error;

/// Errors from backend and sensor operations
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Session already submitted")]
    AlreadySubmitted,

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BackendError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Remote session backend.
///
/// Implementations own transport, timeouts and grading. The session runtime
/// calls them from spawned tasks and never blocks a state transition on them.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Fetch the questions and duration for a session.
    /// Fails with `NotFound` or `Unauthorized`.
    async fn fetch_session(&self, session_id: &SessionId) -> BackendResult<SessionManifest>;

    /// Best-effort save of one in-progress answer. Carries the full current
    /// value, never a delta.
    async fn save_response(
        &self,
        session_id: &SessionId,
        question_id: &QuestionId,
        value: &AnswerValue,
    ) -> BackendResult<()>;

    /// Submit the final answer set. `AlreadySubmitted` means the goal
    /// already holds.
    async fn submit_session(
        &self,
        session_id: &SessionId,
        responses: &ResponseSet,
        reason: FinalizeReason,
    ) -> BackendResult<()>;
}

/// Source of suspected proctoring violations.
///
/// The core does not interpret what a violation is; it counts what is
/// reported by each poll.
#[async_trait]
pub trait ProctoringSensor: Send + Sync {
    /// Violations observed since the previous poll
    async fn poll(&self) -> BackendResult<Vec<String>>;
}

/// Sensor that never reports anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSensor;

#[async_trait]
impl ProctoringSensor for NullSensor {
    async fn poll(&self) -> BackendResult<Vec<String>> {
        Ok(Vec::new())
    }
}
