//! Integration tests for the session runtime
//!
//! These drive whole sessions end to end on tokio's paused clock.

use proctor_api::{
    AnswerValue, EventPayload, FinalizeReason, QuestionStatus, ResponseSet, SessionStatus,
    WarningSeverity, WarningThreshold,
};
use proctor_backend_api::{MockBackend, MockFailure, NullSensor, ScriptedSensor, sample_manifest};
use proctor_config::SessionPolicy;
use proctor_core::CoreError;
use proctor_store::{AuditEventType, SqliteStore, Store};
use proctor_util::{ExamId, QuestionId, SessionId};
use proctord::{ExamDriver, ExamError, ExamHandle, FileBackend};
use std::sync::Arc;
use std::time::Duration;

fn make_test_policy() -> SessionPolicy {
    SessionPolicy {
        escalation_threshold: 3,
        proctoring_poll_interval: Duration::from_secs(1),
        autosave_interval: Duration::from_secs(2),
        warnings: vec![],
    }
}

fn q(n: usize) -> QuestionId {
    QuestionId::new(format!("q{}", n))
}

struct Harness {
    backend: Arc<MockBackend>,
    sensor: Arc<ScriptedSensor>,
    store: Arc<SqliteStore>,
    handle: ExamHandle,
}

fn start(policy: SessionPolicy, backend: MockBackend) -> Harness {
    start_with_exam(policy, backend, "exam-1")
}

fn start_with_exam(policy: SessionPolicy, backend: MockBackend, exam_id: &str) -> Harness {
    let backend = Arc::new(backend);
    let sensor = Arc::new(ScriptedSensor::new());
    let store = Arc::new(SqliteStore::in_memory().unwrap());

    let driver = ExamDriver::new(policy, backend.clone(), sensor.clone(), store.clone());
    let handle = driver.spawn(ExamId::new(exam_id), SessionId::new("sess-1"));

    Harness {
        backend,
        sensor,
        store,
        handle,
    }
}

/// Collect events up to and including the first one matching `done`
async fn events_until(
    handle: &mut ExamHandle,
    done: impl Fn(&EventPayload) -> bool,
) -> Vec<EventPayload> {
    tokio::time::timeout(Duration::from_secs(3600), async {
        let mut seen = Vec::new();
        loop {
            let event = handle.next_event().await.expect("event stream ended");
            let finished = done(&event.payload);
            seen.push(event.payload);
            if finished {
                return seen;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

async fn wait_started(handle: &mut ExamHandle) {
    let events = events_until(handle, |e| {
        matches!(e, EventPayload::Started { .. } | EventPayload::LoadFailed { .. })
    })
    .await;
    assert!(
        matches!(events.last(), Some(EventPayload::Started { .. })),
        "session failed to start: {:?}",
        events
    );
}

fn is_completed(event: &EventPayload) -> bool {
    matches!(event, EventPayload::Completed { .. })
}

fn completed(events: &[EventPayload]) -> (FinalizeReason, ResponseSet) {
    match events.last() {
        Some(EventPayload::Completed { reason, responses }) => (*reason, responses.clone()),
        other => panic!("expected Completed, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_submits_partial_answers() {
    let mut h = start(make_test_policy(), MockBackend::new(sample_manifest(2, 5)));
    wait_started(&mut h.handle).await;

    h.handle.answer(q(1), AnswerValue::single("A")).await.unwrap();
    assert!(h.handle.navigate(1).await.unwrap());

    let events = events_until(&mut h.handle, is_completed).await;
    assert!(events.contains(&EventPayload::Finalizing {
        reason: FinalizeReason::Timeout
    }));

    let (reason, responses) = completed(&events);
    assert_eq!(reason, FinalizeReason::Timeout);
    let mut expected = ResponseSet::new();
    expected.insert(q(1), AnswerValue::single("A"));
    assert_eq!(responses, expected);

    let submissions = h.backend.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].responses, expected);
    assert_eq!(h.backend.submit_attempts(), 1);

    let view = h.handle.view();
    assert_eq!(view.status, SessionStatus::Submitted);
    assert_eq!(view.remaining_seconds, 0);
    assert_eq!(view.current_index, 1);
    assert_eq!(view.finalize_reason, Some(FinalizeReason::Timeout));
}

#[tokio::test(start_paused = true)]
async fn test_violations_force_submission() {
    let mut h = start(make_test_policy(), MockBackend::new(sample_manifest(2, 600)));
    h.sensor.push_batch(["tab switch"]);
    h.sensor.push_batch(["face missing", "second person"]);
    wait_started(&mut h.handle).await;

    let events = events_until(&mut h.handle, is_completed).await;

    let counts: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            EventPayload::ViolationRecorded { count, .. } => Some(*count),
            _ => None,
        })
        .collect();
    assert_eq!(counts, vec![1, 2, 3]);

    let (reason, responses) = completed(&events);
    assert_eq!(reason, FinalizeReason::Violations);
    assert!(responses.is_empty());
    assert_eq!(h.backend.submit_attempts(), 1);

    let view = h.handle.view();
    assert_eq!(view.status, SessionStatus::Submitted);
    assert_eq!(view.violation_count, 3);
    assert!(view.remaining_seconds > 0);
}

#[tokio::test(start_paused = true)]
async fn test_zero_intervals_still_poll() {
    let policy = SessionPolicy {
        proctoring_poll_interval: Duration::ZERO,
        autosave_interval: Duration::ZERO,
        ..make_test_policy()
    };
    let mut h = start(policy, MockBackend::new(sample_manifest(2, 600)));
    for detail in ["tab switch", "face missing", "second person"] {
        h.sensor.push_batch([detail]);
    }
    let mut views = h.handle.watch();
    wait_started(&mut h.handle).await;

    tokio::time::timeout(Duration::from_secs(60), async {
        while views.borrow_and_update().status != SessionStatus::Submitted {
            views.changed().await.expect("runtime stopped");
        }
    })
    .await
    .expect("violations never escalated");

    let view = views.borrow().clone();
    assert_eq!(view.violation_count, 3);
    assert_eq!(view.finalize_reason, Some(FinalizeReason::Violations));
    assert_eq!(h.backend.submit_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_manual_submit_with_all_answered() {
    let mut h = start(make_test_policy(), MockBackend::new(sample_manifest(3, 600)));
    wait_started(&mut h.handle).await;

    for n in 1..=3 {
        h.handle.answer(q(n), AnswerValue::single("C")).await.unwrap();
    }
    let view = h.handle.view();
    assert_eq!(view.answered_count, view.question_count);
    assert_eq!(
        h.handle.statuses().await.unwrap(),
        vec![QuestionStatus::Answered; 3]
    );

    h.handle.submit().await.unwrap();
    let events = events_until(&mut h.handle, is_completed).await;

    let (reason, responses) = completed(&events);
    assert_eq!(reason, FinalizeReason::Manual);
    assert_eq!(responses.len(), 3);
    assert_eq!(h.handle.view().status, SessionStatus::Submitted);

    // Answers are frozen once submitted
    let err = h
        .handle
        .answer(q(1), AnswerValue::single("D"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ExamError::Core(CoreError::not_running(SessionStatus::Submitted))
    );
}

#[tokio::test(start_paused = true)]
async fn test_manual_submit_races_expiry() {
    let backend = MockBackend::new(sample_manifest(1, 2));
    backend.set_submit_delay(Some(Duration::from_secs(5)));
    let mut h = start(make_test_policy(), backend);
    wait_started(&mut h.handle).await;

    h.handle.submit().await.unwrap();
    // A second press while in flight is a no-op
    h.handle.submit().await.unwrap();

    let events = events_until(&mut h.handle, is_completed).await;
    let finalizing = events
        .iter()
        .filter(|e| matches!(e, EventPayload::Finalizing { .. }))
        .count();
    assert_eq!(finalizing, 1);

    let (reason, _) = completed(&events);
    assert_eq!(reason, FinalizeReason::Manual);
    assert_eq!(h.backend.submit_attempts(), 1);
    assert_eq!(h.handle.view().remaining_seconds, 2);
}

#[tokio::test(start_paused = true)]
async fn test_submit_failure_then_retry() {
    let backend = MockBackend::new(sample_manifest(2, 600));
    backend.fail_next_submit(MockFailure::Network);
    let mut h = start(make_test_policy(), backend);
    wait_started(&mut h.handle).await;

    h.handle.answer(q(2), AnswerValue::single("B")).await.unwrap();
    h.handle.submit().await.unwrap();

    let events = events_until(&mut h.handle, |e| {
        matches!(e, EventPayload::SubmitFailed { .. })
    })
    .await;
    assert!(matches!(
        events.last(),
        Some(EventPayload::SubmitFailed {
            reason: FinalizeReason::Manual,
            retry_available: true,
            ..
        })
    ));

    let view = h.handle.view();
    assert_eq!(view.status, SessionStatus::Failed);
    assert!(view.retry_available);

    h.handle.retry().await.unwrap();
    let events = events_until(&mut h.handle, is_completed).await;
    let (reason, responses) = completed(&events);
    assert_eq!(reason, FinalizeReason::Manual);
    assert_eq!(responses.get(&q(2)), Some(&AnswerValue::single("B")));

    assert_eq!(h.backend.submit_attempts(), 2);
    assert_eq!(h.backend.submissions().len(), 1);
    assert_eq!(
        h.handle.retry().await,
        Err(ExamError::Core(CoreError::RetryUnavailable))
    );
}

#[tokio::test(start_paused = true)]
async fn test_retry_allowed_only_once() {
    let backend = MockBackend::new(sample_manifest(1, 600));
    backend.fail_next_submit(MockFailure::Network);
    backend.fail_next_submit(MockFailure::Network);
    let mut h = start(make_test_policy(), backend);
    wait_started(&mut h.handle).await;

    h.handle.submit().await.unwrap();
    events_until(&mut h.handle, |e| matches!(e, EventPayload::SubmitFailed { .. })).await;

    h.handle.retry().await.unwrap();
    let events =
        events_until(&mut h.handle, |e| matches!(e, EventPayload::SubmitFailed { .. })).await;
    assert!(matches!(
        events.last(),
        Some(EventPayload::SubmitFailed {
            retry_available: false,
            ..
        })
    ));

    assert_eq!(
        h.handle.retry().await,
        Err(ExamError::Core(CoreError::RetryUnavailable))
    );
    assert_eq!(h.backend.submit_attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_already_submitted_counts_as_success() {
    let backend = MockBackend::new(sample_manifest(1, 600));
    backend.fail_next_submit(MockFailure::AlreadySubmitted);
    let mut h = start(make_test_policy(), backend);
    wait_started(&mut h.handle).await;

    h.handle.submit().await.unwrap();
    let events = events_until(&mut h.handle, |e| {
        matches!(e, EventPayload::Completed { .. } | EventPayload::SubmitFailed { .. })
    })
    .await;

    assert!(is_completed(events.last().unwrap()));
    assert_eq!(h.handle.view().status, SessionStatus::Submitted);
}

#[tokio::test(start_paused = true)]
async fn test_load_failure() {
    let mut h = start(make_test_policy(), MockBackend::empty());

    let events =
        events_until(&mut h.handle, |e| matches!(e, EventPayload::LoadFailed { .. })).await;
    assert_eq!(events.len(), 1);
    assert_eq!(h.handle.view().status, SessionStatus::Failed);

    let err = h
        .handle
        .answer(q(1), AnswerValue::single("A"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ExamError::Core(CoreError::not_running(SessionStatus::Failed))
    );
    assert!(h.handle.submit().await.is_err());

    let audits = h
        .store
        .get_session_audits(&SessionId::new("sess-1"))
        .unwrap();
    assert!(matches!(audits[0].event, AuditEventType::LoadFailed { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_load_fails() {
    let backend = MockBackend::new(sample_manifest(1, 60));
    backend.fail_fetch(MockFailure::Unauthorized);
    let mut h = start(make_test_policy(), backend);

    let events =
        events_until(&mut h.handle, |e| matches!(e, EventPayload::LoadFailed { .. })).await;
    assert!(matches!(
        events.last(),
        Some(EventPayload::LoadFailed { message }) if message == "Unauthorized"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_exam_mismatch_fails_load() {
    let mut h = start_with_exam(
        make_test_policy(),
        MockBackend::new(sample_manifest(1, 60)),
        "other-exam",
    );

    events_until(&mut h.handle, |e| matches!(e, EventPayload::LoadFailed { .. })).await;
    assert_eq!(h.handle.view().status, SessionStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_failed_save_retried_by_autosave() {
    let backend = MockBackend::new(sample_manifest(2, 600));
    backend.fail_next_saves(1);
    let mut h = start(make_test_policy(), backend);
    wait_started(&mut h.handle).await;

    h.handle.answer(q(1), AnswerValue::single("B")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(h.backend.saves().is_empty());

    // Next autosave cycle resends
    tokio::time::sleep(Duration::from_secs(2)).await;
    let saves = h.backend.saves();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].question_id, q(1));
    assert_eq!(saves[0].value, AnswerValue::single("B"));

    let audits = h
        .store
        .get_session_audits(&SessionId::new("sess-1"))
        .unwrap();
    assert!(
        audits
            .iter()
            .any(|a| matches!(a.event, AuditEventType::SaveFailed { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn test_multiple_choice_toggle_saves_full_value() {
    let mut manifest = sample_manifest(1, 600);
    manifest.questions[0].kind = proctor_api::QuestionKind::MultipleChoice;
    let mut h = start(make_test_policy(), MockBackend::new(manifest));
    wait_started(&mut h.handle).await;

    h.handle.toggle(q(1), "A").await.unwrap();
    h.handle.toggle(q(1), "C").await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(
        h.handle.get_answer(q(1)).await.unwrap(),
        Some(AnswerValue::multiple(["A", "C"]))
    );
    let last = h.backend.saves().pop().unwrap();
    assert_eq!(last.value, AnswerValue::multiple(["A", "C"]));
}

#[tokio::test(start_paused = true)]
async fn test_time_warning_issued() {
    let mut policy = make_test_policy();
    policy.warnings = vec![WarningThreshold {
        seconds_before: 2,
        severity: WarningSeverity::Critical,
        message: Some("2 seconds left".into()),
    }];
    let mut h = start(policy, MockBackend::new(sample_manifest(1, 4)));
    wait_started(&mut h.handle).await;

    let events = events_until(&mut h.handle, is_completed).await;
    let warnings: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            EventPayload::TimeWarning {
                remaining_seconds,
                severity,
                ..
            } => Some((*remaining_seconds, *severity)),
            _ => None,
        })
        .collect();
    assert_eq!(warnings, vec![(2, WarningSeverity::Critical)]);
}

#[tokio::test(start_paused = true)]
async fn test_exit_cancels_timers() {
    let mut h = start(make_test_policy(), MockBackend::new(sample_manifest(2, 5)));
    wait_started(&mut h.handle).await;

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(h.sensor.poll_count(), 2);

    h.handle.exit().await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    // Clock never reached zero and no poll ran after exit
    assert_eq!(h.sensor.poll_count(), 2);
    assert_eq!(h.backend.submit_attempts(), 0);
    assert!(h.handle.view().disposed);

    assert_eq!(
        h.handle.next_event().await.map(|e| e.payload),
        Some(EventPayload::Exited)
    );
    assert!(h.handle.next_event().await.is_none());
    assert_eq!(
        h.handle.answer(q(1), AnswerValue::single("A")).await,
        Err(ExamError::Closed)
    );
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_exits() {
    let h = start(make_test_policy(), MockBackend::new(sample_manifest(1, 5)));
    let sensor = h.sensor.clone();
    let backend = h.backend.clone();
    let store = h.store.clone();
    let mut handle = h.handle;
    wait_started(&mut handle).await;

    drop(handle);
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(sensor.poll_count(), 0);
    assert_eq!(backend.submit_attempts(), 0);

    let audits = store.get_session_audits(&SessionId::new("sess-1")).unwrap();
    assert!(matches!(
        audits.last().map(|a| &a.event),
        Some(AuditEventType::SessionExited { .. })
    ));
}

#[tokio::test]
async fn test_file_backend_session() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FileBackend::new(dir.path()));
    let session_id = SessionId::new("sess-file");

    let manifest_path = backend.manifest_path(&session_id);
    std::fs::create_dir_all(manifest_path.parent().unwrap()).unwrap();
    std::fs::write(
        &manifest_path,
        serde_json::to_vec(&sample_manifest(2, 600)).unwrap(),
    )
    .unwrap();

    let driver = ExamDriver::new(
        make_test_policy(),
        backend.clone(),
        Arc::new(NullSensor),
        Arc::new(SqliteStore::in_memory().unwrap()),
    );
    let mut handle = driver.spawn(ExamId::new("exam-1"), session_id.clone());
    wait_started(&mut handle).await;

    handle.answer(q(2), AnswerValue::single("D")).await.unwrap();
    handle.submit().await.unwrap();
    events_until(&mut handle, is_completed).await;

    let record = backend.load_submission(&session_id).await.unwrap().unwrap();
    assert_eq!(record.reason, FinalizeReason::Manual);
    assert_eq!(record.responses.get(&q(2)), Some(&AnswerValue::single("D")));

    handle.exit().await.unwrap();
}
