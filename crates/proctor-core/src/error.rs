//! Guard errors raised by the session core
//!
//! These indicate a calling-contract violation by the presentation layer.
//! Load, save and submit failures are not errors here; they are reported to
//! the coordinator as outcomes and surfaced as events.

use proctor_api::{QuestionKind, SessionStatus};
use proctor_util::QuestionId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Clock already started")]
    AlreadyStarted,

    #[error("Session is not running (status: {status:?})")]
    SessionNotRunning { status: SessionStatus },

    #[error("Unknown question: {0}")]
    UnknownQuestion(QuestionId),

    #[error("Answer shape does not match {expected} question {question_id}")]
    InvalidAnswerShape {
        question_id: QuestionId,
        expected: QuestionKind,
    },

    #[error("Question {question_id} is {actual}, not multiple-choice")]
    InvalidQuestionType {
        question_id: QuestionId,
        actual: QuestionKind,
    },

    #[error("Question {question_id} has no option '{option}'")]
    UnknownOption {
        question_id: QuestionId,
        option: String,
    },

    #[error("No submission retry available")]
    RetryUnavailable,
}

impl CoreError {
    pub fn not_running(status: SessionStatus) -> Self {
        Self::SessionNotRunning { status }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
