//! Events delivered to the presentation layer

use chrono::{DateTime, Local};
use proctor_util::SessionId;
use serde::{Deserialize, Serialize};

use crate::{FinalizeReason, ResponseSet, WarningSeverity};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl SessionEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            timestamp: proctor_util::now(),
            payload,
        }
    }
}

/// Everything the presentation layer is told about a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Session loaded and the clock is running
    Started {
        session_id: SessionId,
        exam_title: String,
        student_name: String,
        total_duration_seconds: u64,
        question_count: usize,
    },

    /// Session could not be loaded; nothing else will happen
    LoadFailed { message: String },

    /// Low-time warning threshold reached
    TimeWarning {
        remaining_seconds: u64,
        severity: WarningSeverity,
        message: Option<String>,
    },

    /// A proctoring violation was counted
    ViolationRecorded {
        count: usize,
        threshold: u32,
        detail: String,
    },

    /// Submission started
    Finalizing { reason: FinalizeReason },

    /// Session submitted (onComplete)
    Completed {
        reason: FinalizeReason,
        responses: ResponseSet,
    },

    /// Submission failed
    SubmitFailed {
        reason: FinalizeReason,
        message: String,
        retry_available: bool,
    },

    /// Exam screen exited; the session is disposed (onExit)
    Exited,
}
