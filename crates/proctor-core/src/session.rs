//! Exam session aggregate

use chrono::{DateTime, Local};
use proctor_api::{Question, SessionManifest, WarningThreshold};
use proctor_util::{ExamId, MonotonicInstant, SessionId, StudentId};
use std::collections::HashSet;
use std::time::Duration;

/// One student's attempt, as delivered by the backend.
///
/// Questions and duration are fixed at load time.
#[derive(Debug, Clone)]
pub struct ExamSession {
    pub session_id: SessionId,
    pub exam_id: ExamId,
    pub student_id: StudentId,
    pub exam_title: String,
    pub student_name: String,

    /// Immutable after load
    pub total_duration_seconds: u64,

    /// Display order; no insertion or removal during the session
    pub questions: Vec<Question>,

    /// Wall-clock start time (for display/logging)
    pub started_at: DateTime<Local>,

    /// Monotonic start time (for elapsed-time accounting)
    pub started_at_mono: MonotonicInstant,

    /// Warning thresholds already issued (seconds before expiry)
    pub warnings_issued: Vec<u64>,
}

/// Check a delivered manifest before building a session from it.
///
/// Question ids must be unique and choice questions must list their options.
pub fn validate_manifest(manifest: &SessionManifest) -> Result<(), String> {
    let mut seen = HashSet::new();
    for question in &manifest.questions {
        if !seen.insert(&question.id) {
            return Err(format!("Duplicate question id {}", question.id));
        }
        if question.is_choice() && question.options.is_empty() {
            return Err(format!(
                "Question {} is {} but lists no options",
                question.id, question.kind
            ));
        }
    }
    Ok(())
}

impl ExamSession {
    pub fn from_manifest(
        session_id: SessionId,
        manifest: SessionManifest,
        now: DateTime<Local>,
        now_mono: MonotonicInstant,
    ) -> Self {
        Self {
            session_id,
            exam_id: manifest.exam_id,
            student_id: manifest.student_id,
            exam_title: manifest.exam_title,
            student_name: manifest.student_name,
            total_duration_seconds: manifest.total_duration_seconds,
            questions: manifest.questions,
            started_at: now,
            started_at_mono: now_mono,
            warnings_issued: Vec::new(),
        }
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    /// Warnings that should fire now, given the remaining time.
    ///
    /// A threshold at or above the total duration never fires: the student
    /// would be warned the moment the exam opens.
    pub fn pending_warnings<'a>(
        &self,
        remaining_seconds: u64,
        warnings: &'a [WarningThreshold],
    ) -> Vec<&'a WarningThreshold> {
        warnings
            .iter()
            .filter(|w| w.seconds_before < self.total_duration_seconds)
            .filter(|w| remaining_seconds <= w.seconds_before)
            .filter(|w| !self.warnings_issued.contains(&w.seconds_before))
            .collect()
    }

    pub fn mark_warning_issued(&mut self, threshold: u64) {
        if !self.warnings_issued.contains(&threshold) {
            self.warnings_issued.push(threshold);
        }
    }

    pub fn elapsed(&self, now_mono: MonotonicInstant) -> Duration {
        now_mono.duration_since(self.started_at_mono)
    }
}
