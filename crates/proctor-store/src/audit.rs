//! Audit event types

use chrono::{DateTime, Local};
use proctor_api::{FinalizeReason, SessionStatus};
use proctor_util::{ExamId, QuestionId, SessionId, StudentId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Types of audit events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Session runner process started
    ServiceStarted,

    /// Session runner process stopped
    ServiceStopped,

    /// Session delivered by the backend; clock started
    SessionLoaded {
        session_id: SessionId,
        exam_id: ExamId,
        student_id: StudentId,
        total_duration_seconds: u64,
        question_count: usize,
    },

    /// Session could not be loaded
    LoadFailed { session_id: SessionId, error: String },

    /// Proctoring violation counted
    ViolationRecorded {
        session_id: SessionId,
        count: usize,
        detail: String,
    },

    /// Autosave of one answer failed (will be retried)
    SaveFailed {
        session_id: SessionId,
        question_id: QuestionId,
        error: String,
    },

    /// Finalize guard taken; submission starting
    FinalizeStarted {
        session_id: SessionId,
        reason: FinalizeReason,
        answered_count: usize,
    },

    /// Backend accepted the final answers
    SessionSubmitted {
        session_id: SessionId,
        reason: FinalizeReason,
        elapsed: Duration,
    },

    /// Final submission failed
    SubmitFailed {
        session_id: SessionId,
        reason: FinalizeReason,
        error: String,
        retry_available: bool,
    },

    /// Exam screen exited
    SessionExited {
        session_id: SessionId,
        status: SessionStatus,
    },
}

impl AuditEventType {
    /// Session this event belongs to, if any
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            AuditEventType::ServiceStarted | AuditEventType::ServiceStopped => None,
            AuditEventType::SessionLoaded { session_id, .. }
            | AuditEventType::LoadFailed { session_id, .. }
            | AuditEventType::ViolationRecorded { session_id, .. }
            | AuditEventType::SaveFailed { session_id, .. }
            | AuditEventType::FinalizeStarted { session_id, .. }
            | AuditEventType::SessionSubmitted { session_id, .. }
            | AuditEventType::SubmitFailed { session_id, .. }
            | AuditEventType::SessionExited { session_id, .. } => Some(session_id),
        }
    }
}

/// Full audit event with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: proctor_util::now(),
            event,
        }
    }
}
