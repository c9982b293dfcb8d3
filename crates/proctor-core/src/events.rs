//! Core events emitted by the coordinator

use proctor_api::{AnswerValue, FinalizeReason, ResponseSet, WarningSeverity};
use proctor_util::{QuestionId, SessionId};

/// An autosave the caller should perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSave {
    pub session_id: SessionId,
    pub question_id: QuestionId,
    /// Full current value, never a delta
    pub value: AnswerValue,
    /// Store revision of `value`; echoed back in the completion
    pub revision: u64,
}

/// A final submission the caller should perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub session_id: SessionId,
    pub responses: ResponseSet,
    pub reason: FinalizeReason,
    /// 1 for the first attempt, 2 for the retry
    pub attempt: u32,
}

/// Result of a save reported back to the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Failed(String),
}

/// Result of a submission reported back to the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    /// The backend already holds a submission for this session
    AlreadySubmitted,
    Failed(String),
}

/// Events emitted by the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    /// Session loaded; clock and proctoring poll should start
    SessionStarted {
        session_id: SessionId,
        exam_title: String,
        student_name: String,
        total_duration_seconds: u64,
        question_count: usize,
    },

    /// Session could not be loaded
    LoadFailed { session_id: SessionId, error: String },

    /// Low-time warning threshold reached
    TimeWarning {
        remaining_seconds: u64,
        severity: WarningSeverity,
        message: Option<String>,
    },

    /// A violation was counted
    ViolationRecorded {
        count: usize,
        threshold: u32,
        detail: String,
    },

    /// Clock and proctoring poll must be cancelled
    TimersStopped,

    /// Finalize guard taken with this reason
    FinalizeStarted { reason: FinalizeReason },

    /// Caller must submit these answers and report the outcome
    SubmitDue(SubmitRequest),

    /// Session submitted
    Completed {
        reason: FinalizeReason,
        responses: ResponseSet,
    },

    /// Submission failed
    SubmitFailed {
        reason: FinalizeReason,
        error: String,
        retry_available: bool,
    },

    /// Session disposed by leaving the exam screen
    Exited,
}
