//! Mock collaborators for testing

use async_trait::async_trait;
use proctor_api::{
    AnswerValue, FinalizeReason, Question, QuestionKind, ResponseSet, SessionManifest,
};
use proctor_util::{ExamId, QuestionId, SessionId, StudentId};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{BackendError, BackendResult, ProctoringSensor, SessionBackend};

/// Failure a mock call can be configured to return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    NotFound,
    Unauthorized,
    AlreadySubmitted,
    Network,
}

impl MockFailure {
    fn into_error(self, session_id: &SessionId) -> BackendError {
        match self {
            MockFailure::NotFound => BackendError::NotFound(session_id.clone()),
            MockFailure::Unauthorized => BackendError::Unauthorized,
            MockFailure::AlreadySubmitted => BackendError::AlreadySubmitted,
            MockFailure::Network => BackendError::network("Mock network failure"),
        }
    }
}

/// A recorded `save_response` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSave {
    pub session_id: SessionId,
    pub question_id: QuestionId,
    pub value: AnswerValue,
}

/// A recorded `submit_session` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSubmission {
    pub session_id: SessionId,
    pub responses: ResponseSet,
    pub reason: FinalizeReason,
}

/// In-memory session backend for unit/integration testing
pub struct MockBackend {
    manifest: Mutex<Option<SessionManifest>>,

    /// Failure returned by `fetch_session`
    pub fetch_failure: Arc<Mutex<Option<MockFailure>>>,

    /// Number of upcoming `save_response` calls that fail
    pub failing_saves: Arc<Mutex<usize>>,

    /// Failures returned by upcoming `submit_session` calls, in order
    pub submit_failures: Arc<Mutex<VecDeque<MockFailure>>>,

    /// Delay before `submit_session` completes (simulates an in-flight call)
    pub submit_delay: Arc<Mutex<Option<Duration>>>,

    saves: Mutex<Vec<RecordedSave>>,
    submissions: Mutex<Vec<RecordedSubmission>>,
    submit_attempts: AtomicUsize,
}

impl MockBackend {
    pub fn new(manifest: SessionManifest) -> Self {
        Self {
            manifest: Mutex::new(Some(manifest)),
            fetch_failure: Arc::new(Mutex::new(None)),
            failing_saves: Arc::new(Mutex::new(0)),
            submit_failures: Arc::new(Mutex::new(VecDeque::new())),
            submit_delay: Arc::new(Mutex::new(None)),
            saves: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
            submit_attempts: AtomicUsize::new(0),
        }
    }

    /// Backend that knows no sessions at all
    pub fn empty() -> Self {
        let backend = Self::new(sample_manifest(0, 0));
        *backend.manifest.lock().unwrap() = None;
        backend
    }

    pub fn fail_fetch(&self, failure: MockFailure) {
        *self.fetch_failure.lock().unwrap() = Some(failure);
    }

    pub fn fail_next_saves(&self, count: usize) {
        *self.failing_saves.lock().unwrap() = count;
    }

    pub fn fail_next_submit(&self, failure: MockFailure) {
        self.submit_failures.lock().unwrap().push_back(failure);
    }

    pub fn set_submit_delay(&self, delay: Option<Duration>) {
        *self.submit_delay.lock().unwrap() = delay;
    }

    /// Successful saves, in completion order
    pub fn saves(&self) -> Vec<RecordedSave> {
        self.saves.lock().unwrap().clone()
    }

    /// Accepted submissions
    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.lock().unwrap().clone()
    }

    /// Every call to `submit_session`, including failed ones
    pub fn submit_attempts(&self) -> usize {
        self.submit_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionBackend for MockBackend {
    async fn fetch_session(&self, session_id: &SessionId) -> BackendResult<SessionManifest> {
        if let Some(failure) = *self.fetch_failure.lock().unwrap() {
            return Err(failure.into_error(session_id));
        }

        self.manifest
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| BackendError::NotFound(session_id.clone()))
    }

    async fn save_response(
        &self,
        session_id: &SessionId,
        question_id: &QuestionId,
        value: &AnswerValue,
    ) -> BackendResult<()> {
        {
            let mut failing = self.failing_saves.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(BackendError::network("Mock save failure"));
            }
        }

        self.saves.lock().unwrap().push(RecordedSave {
            session_id: session_id.clone(),
            question_id: question_id.clone(),
            value: value.clone(),
        });
        Ok(())
    }

    async fn submit_session(
        &self,
        session_id: &SessionId,
        responses: &ResponseSet,
        reason: FinalizeReason,
    ) -> BackendResult<()> {
        self.submit_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.submit_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.submit_failures.lock().unwrap().pop_front();
        if let Some(failure) = failure {
            return Err(failure.into_error(session_id));
        }

        self.submissions.lock().unwrap().push(RecordedSubmission {
            session_id: session_id.clone(),
            responses: responses.clone(),
            reason,
        });
        Ok(())
    }
}

/// Sensor that replays queued batches of violations, one batch per poll
#[derive(Default)]
pub struct ScriptedSensor {
    batches: Mutex<VecDeque<Vec<String>>>,
    polls: AtomicUsize,
}

impl ScriptedSensor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a batch to be returned by a future poll
    pub fn push_batch<I, S>(&self, details: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.batches
            .lock()
            .unwrap()
            .push_back(details.into_iter().map(Into::into).collect());
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProctoringSensor for ScriptedSensor {
    async fn poll(&self) -> BackendResult<Vec<String>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// Manifest with `question_count` single-choice questions (`q1`, `q2`, ...)
/// offering options `A`-`D`.
pub fn sample_manifest(question_count: usize, total_duration_seconds: u64) -> SessionManifest {
    let questions = (1..=question_count)
        .map(|n| Question {
            id: QuestionId::new(format!("q{}", n)),
            ordinal: n as u32,
            kind: QuestionKind::SingleChoice,
            prompt: format!("Question {}", n),
            options: ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect(),
            marks: 4.0,
            negative_marks: Some(1.0),
        })
        .collect();

    SessionManifest {
        exam_id: ExamId::new("exam-1"),
        student_id: StudentId::new("student-1"),
        exam_title: "Sample Exam".into(),
        student_name: "Test Student".into(),
        total_duration_seconds,
        questions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_fetch_and_submit() {
        let backend = MockBackend::new(sample_manifest(2, 60));
        let session_id = SessionId::new("s-1");

        let manifest = backend.fetch_session(&session_id).await.unwrap();
        assert_eq!(manifest.questions.len(), 2);

        let mut responses = ResponseSet::new();
        responses.insert(QuestionId::new("q1"), AnswerValue::single("A"));
        backend
            .submit_session(&session_id, &responses, FinalizeReason::Manual)
            .await
            .unwrap();

        let submissions = backend.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].responses, responses);
        assert_eq!(backend.submit_attempts(), 1);
    }

    #[tokio::test]
    async fn mock_injected_failures() {
        let backend = MockBackend::new(sample_manifest(1, 60));
        let session_id = SessionId::new("s-1");

        backend.fail_next_saves(1);
        let value = AnswerValue::single("B");
        let q1 = QuestionId::new("q1");
        assert!(backend.save_response(&session_id, &q1, &value).await.is_err());
        assert!(backend.save_response(&session_id, &q1, &value).await.is_ok());
        assert_eq!(backend.saves().len(), 1);

        backend.fail_next_submit(MockFailure::Network);
        let result = backend
            .submit_session(&session_id, &ResponseSet::new(), FinalizeReason::Timeout)
            .await;
        assert!(matches!(result, Err(BackendError::Network(_))));
        assert!(backend.submissions().is_empty());
        assert_eq!(backend.submit_attempts(), 1);
    }

    #[tokio::test]
    async fn empty_backend_reports_not_found() {
        let backend = MockBackend::empty();
        let result = backend.fetch_session(&SessionId::new("missing")).await;
        assert!(matches!(result, Err(BackendError::NotFound(_))));
    }

    #[tokio::test]
    async fn scripted_sensor_replays_batches() {
        let sensor = ScriptedSensor::new();
        sensor.push_batch(["tab switch", "face not visible"]);

        assert_eq!(sensor.poll().await.unwrap().len(), 2);
        assert!(sensor.poll().await.unwrap().is_empty());
        assert_eq!(sensor.poll_count(), 2);
    }
}
