//! Shared types for exam sessions

use chrono::{DateTime, Local};
use proctor_util::{ExamId, QuestionId, SessionId, StudentId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Question kind, which determines the legal answer shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    MultipleChoice,
    Numerical,
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QuestionKind::SingleChoice => "single-choice",
            QuestionKind::MultipleChoice => "multiple-choice",
            QuestionKind::Numerical => "numerical",
        };
        f.write_str(name)
    }
}

/// A question as delivered by the backend. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,

    /// 1-based display position
    pub ordinal: u32,

    #[serde(rename = "type")]
    pub kind: QuestionKind,

    /// Question text, opaque to the core
    #[serde(default)]
    pub prompt: String,

    /// Option tokens for choice questions, in display order
    #[serde(default)]
    pub options: Vec<String>,

    pub marks: f64,

    #[serde(default)]
    pub negative_marks: Option<f64>,
}

impl Question {
    pub fn is_choice(&self) -> bool {
        matches!(
            self.kind,
            QuestionKind::SingleChoice | QuestionKind::MultipleChoice
        )
    }

    pub fn has_option(&self, token: &str) -> bool {
        self.options.iter().any(|o| o == token)
    }
}

/// A student's answer to one question.
///
/// Serialized untagged: a single token is a JSON string, a set of tokens a
/// JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    /// One option token (single-choice) or a typed number (numerical)
    Single(String),
    /// Selected option tokens (multiple-choice)
    Multiple(BTreeSet<String>),
}

impl AnswerValue {
    pub fn single(token: impl Into<String>) -> Self {
        Self::Single(token.into())
    }

    pub fn multiple<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Multiple(tokens.into_iter().map(Into::into).collect())
    }

    /// True when nothing is selected. Only a multiple-choice set can be empty.
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Single(_) => false,
            AnswerValue::Multiple(set) => set.is_empty(),
        }
    }
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerValue::Single(token) => f.write_str(token),
            AnswerValue::Multiple(set) => {
                let joined: Vec<&str> = set.iter().map(String::as_str).collect();
                write!(f, "{{{}}}", joined.join(", "))
            }
        }
    }
}

/// A recorded answer with its bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub value: AnswerValue,
    pub last_modified_at: DateTime<Local>,
    /// Store-wide write counter; a higher revision is a later write
    pub revision: u64,
}

/// Full answer set keyed by question, as submitted to the backend
pub type ResponseSet = BTreeMap<QuestionId, AnswerValue>;

/// Derived per-question status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Answered,
    Unanswered,
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Waiting for the backend to deliver the session
    Loading,
    /// Clock running; the only state that accepts answers
    Running,
    /// Submission in flight
    Finalizing,
    /// Terminal: the backend holds the final answers
    Submitted,
    /// Terminal: load or submission failed
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Submitted | SessionStatus::Failed)
    }
}

/// Why a session was finalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeReason {
    Manual,
    Timeout,
    Violations,
}

impl fmt::Display for FinalizeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FinalizeReason::Manual => "manual",
            FinalizeReason::Timeout => "timeout",
            FinalizeReason::Violations => "violations",
        };
        f.write_str(name)
    }
}

/// One reported proctoring violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub timestamp: DateTime<Local>,
    pub detail: String,
}

/// Warning severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningSeverity {
    Info,
    Warn,
    Critical,
}

/// Low-time warning configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningThreshold {
    /// Seconds before expiry to issue this warning
    pub seconds_before: u64,
    pub severity: WarningSeverity,
    pub message: Option<String>,
}

/// Session contents as delivered by `fetch_session`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionManifest {
    pub exam_id: ExamId,
    pub student_id: StudentId,
    pub exam_title: String,
    pub student_name: String,
    pub total_duration_seconds: u64,
    pub questions: Vec<Question>,
}

/// Read-only snapshot of a session for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: Option<SessionId>,
    pub exam_title: Option<String>,
    pub status: SessionStatus,
    pub total_duration_seconds: u64,
    pub remaining_seconds: u64,
    pub current_index: usize,
    pub question_count: usize,
    pub answered_count: usize,
    pub violation_count: usize,
    pub escalation_threshold: u32,
    pub finalize_reason: Option<FinalizeReason>,
    /// A failed submission may be retried
    pub retry_available: bool,
    /// The exam screen has been exited; timers are cancelled
    pub disposed: bool,
}

impl SessionView {
    /// View of a session that has not been loaded yet
    pub fn loading(escalation_threshold: u32) -> Self {
        Self {
            session_id: None,
            exam_title: None,
            status: SessionStatus::Loading,
            total_duration_seconds: 0,
            remaining_seconds: 0,
            current_index: 0,
            question_count: 0,
            answered_count: 0,
            violation_count: 0,
            escalation_threshold,
            finalize_reason: None,
            retry_available: false,
            disposed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_value_json_shapes() {
        let single: AnswerValue = serde_json::from_str("\"A\"").unwrap();
        assert_eq!(single, AnswerValue::single("A"));

        let multi: AnswerValue = serde_json::from_str("[\"C\", \"A\"]").unwrap();
        assert_eq!(multi, AnswerValue::multiple(["A", "C"]));
        assert_eq!(serde_json::to_string(&multi).unwrap(), "[\"A\",\"C\"]");
    }

    #[test]
    fn empty_set_is_empty_answer() {
        assert!(AnswerValue::Multiple(BTreeSet::new()).is_empty());
        assert!(!AnswerValue::single("").is_empty());
    }

    #[test]
    fn question_parses_with_type_field() {
        let json = r#"{
            "id": "q1",
            "ordinal": 1,
            "type": "multiple_choice",
            "options": ["A", "B", "C"],
            "marks": 4.0,
            "negative_marks": 1.0
        }"#;

        let question: Question = serde_json::from_str(json).unwrap();
        assert_eq!(question.kind, QuestionKind::MultipleChoice);
        assert!(question.is_choice());
        assert!(question.has_option("B"));
        assert!(!question.has_option("D"));
        assert_eq!(question.negative_marks, Some(1.0));
    }

    #[test]
    fn terminal_statuses() {
        assert!(SessionStatus::Submitted.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(!SessionStatus::Finalizing.is_terminal());
        assert!(!SessionStatus::Running.is_terminal());
    }

    #[test]
    fn finalize_reason_display() {
        assert_eq!(FinalizeReason::Timeout.to_string(), "timeout");
        assert_eq!(FinalizeReason::Violations.to_string(), "violations");
    }
}
