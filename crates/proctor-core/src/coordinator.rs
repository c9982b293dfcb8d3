//! Session state machine

use chrono::{DateTime, Local};
use proctor_api::{
    AnswerValue, FinalizeReason, Question, QuestionStatus, ResponseSet, SessionManifest,
    SessionStatus, SessionView,
};
use proctor_config::SessionPolicy;
use proctor_store::{AuditEvent, AuditEventType, Store};
use proctor_util::{ExamId, MonotonicInstant, QuestionId, SessionId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    Clock, ClockEvent, CoreError, CoreEvent, CoreResult, ExamSession, NavigationController,
    PendingSave, ResponseStore, SaveOutcome, SubmitOutcome, SubmitRequest, ViolationEvent,
    ViolationTracker, validate_manifest,
};

/// Submission retries allowed after a failed finalize
pub const SUBMIT_RETRY_LIMIT: u32 = 1;

/// Exactly-once guard around the finalize effect body.
///
/// Claimed before any submission is handed out; released only when a
/// submission fails and a retry remains.
#[derive(Debug, Default)]
struct FinalizeGuard {
    claimed: bool,
    reason: Option<FinalizeReason>,
    snapshot: Option<ResponseSet>,
    attempts: u32,
    retries_left: u32,
}

/// The top-level session state machine.
///
/// Owns the clock, response store, violation tracker and navigation for one
/// session. Every termination path (manual submit, clock expiry, violation
/// escalation) goes through [`finalize`](Self::finalize), which runs its
/// effect body at most once.
///
/// The coordinator does no I/O. Operations return [`CoreEvent`]s and
/// [`PendingSave`]s; the caller performs them and reports outcomes through
/// `on_*` methods.
pub struct SubmissionCoordinator {
    policy: SessionPolicy,
    store: Arc<dyn Store>,
    status: SessionStatus,
    requested: Option<(ExamId, SessionId)>,
    session: Option<ExamSession>,
    clock: Clock,
    responses: ResponseStore,
    violations: ViolationTracker,
    navigation: NavigationController,
    guard: FinalizeGuard,
    saves_in_flight: HashMap<QuestionId, u64>,
    disposed: bool,
}

impl SubmissionCoordinator {
    pub fn new(policy: SessionPolicy, store: Arc<dyn Store>) -> Self {
        let violations = ViolationTracker::new(policy.escalation_threshold);

        Self {
            policy,
            store,
            status: SessionStatus::Loading,
            requested: None,
            session: None,
            clock: Clock::new(),
            responses: ResponseStore::new(&[]),
            violations,
            navigation: NavigationController::new(&[]),
            guard: FinalizeGuard {
                retries_left: SUBMIT_RETRY_LIMIT,
                ..Default::default()
            },
            saves_in_flight: HashMap::new(),
            disposed: false,
        }
    }

    // Loading

    /// Record which session is being fetched. The caller then invokes
    /// `fetch_session` and reports back with [`on_session_loaded`] or
    /// [`on_load_failed`].
    ///
    /// [`on_session_loaded`]: Self::on_session_loaded
    /// [`on_load_failed`]: Self::on_load_failed
    pub fn begin_load(&mut self, exam_id: ExamId, session_id: SessionId) -> CoreResult<()> {
        if self.requested.is_some() || self.status != SessionStatus::Loading {
            return Err(CoreError::AlreadyStarted);
        }

        debug!(exam_id = %exam_id, session_id = %session_id, "Loading session");
        self.requested = Some((exam_id, session_id));
        Ok(())
    }

    /// Populate the session and start the clock
    pub fn on_session_loaded(
        &mut self,
        manifest: SessionManifest,
        now: DateTime<Local>,
        now_mono: MonotonicInstant,
    ) -> Vec<CoreEvent> {
        let (exam_id, session_id) = match &self.requested {
            Some(ids) if self.status == SessionStatus::Loading && !self.disposed => ids.clone(),
            _ => {
                debug!("Ignoring session delivery outside loading");
                return Vec::new();
            }
        };

        if manifest.exam_id != exam_id {
            let error = format!(
                "Session {} belongs to exam {}, not {}",
                session_id, manifest.exam_id, exam_id
            );
            return self.on_load_failed(error);
        }
        if let Err(error) = validate_manifest(&manifest) {
            return self.on_load_failed(format!("Session {} rejected: {}", session_id, error));
        }

        let session = ExamSession::from_manifest(session_id.clone(), manifest, now, now_mono);

        self.responses = ResponseStore::new(&session.questions);
        self.navigation = NavigationController::new(&session.questions);
        if let Err(e) = self.clock.start(session.total_duration_seconds) {
            warn!(session_id = %session_id, error = %e, "Clock start rejected");
        }
        self.status = SessionStatus::Running;

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::SessionLoaded {
            session_id: session_id.clone(),
            exam_id: session.exam_id.clone(),
            student_id: session.student_id.clone(),
            total_duration_seconds: session.total_duration_seconds,
            question_count: session.question_count(),
        }));

        info!(
            session_id = %session_id,
            exam_id = %session.exam_id,
            question_count = session.question_count(),
            duration_secs = session.total_duration_seconds,
            "Session started"
        );

        let event = CoreEvent::SessionStarted {
            session_id,
            exam_title: session.exam_title.clone(),
            student_name: session.student_name.clone(),
            total_duration_seconds: session.total_duration_seconds,
            question_count: session.question_count(),
        };
        self.session = Some(session);

        vec![event]
    }

    /// The session could not be fetched. No partial session exists and no
    /// retry is attempted.
    pub fn on_load_failed(&mut self, error: impl Into<String>) -> Vec<CoreEvent> {
        let session_id = match &self.requested {
            Some((_, session_id)) if self.status == SessionStatus::Loading => session_id.clone(),
            _ => return Vec::new(),
        };
        let error = error.into();

        self.status = SessionStatus::Failed;
        self.violations.seal(SessionStatus::Failed);

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::LoadFailed {
            session_id: session_id.clone(),
            error: error.clone(),
        }));

        warn!(session_id = %session_id, error = %error, "Session load failed");

        vec![CoreEvent::LoadFailed { session_id, error }]
    }

    // Answer capture

    /// Record an answer and return the saves to fire.
    pub fn record_answer(
        &mut self,
        question_id: &QuestionId,
        value: AnswerValue,
        now: DateTime<Local>,
    ) -> CoreResult<Vec<PendingSave>> {
        self.ensure_running()?;
        self.responses.set_answer(question_id, value, now)?;
        debug!(question_id = %question_id, "Answer recorded");
        Ok(self.collect_saves())
    }

    /// Toggle one option of a multiple-choice answer and return the saves to
    /// fire.
    pub fn toggle_option(
        &mut self,
        question_id: &QuestionId,
        option: &str,
        now: DateTime<Local>,
    ) -> CoreResult<Vec<PendingSave>> {
        self.ensure_running()?;
        self.responses.toggle_option(question_id, option, now)?;
        debug!(question_id = %question_id, option, "Option toggled");
        Ok(self.collect_saves())
    }

    /// Autosave cycle: everything dirty that has no save in flight.
    pub fn autosave_due(&mut self) -> Vec<PendingSave> {
        if self.status != SessionStatus::Running || self.disposed {
            return Vec::new();
        }
        self.collect_saves()
    }

    /// Report the outcome of a save. A failure puts the question back in the
    /// dirty set for the next autosave cycle and is never surfaced.
    pub fn on_save_completed(
        &mut self,
        question_id: &QuestionId,
        revision: u64,
        outcome: SaveOutcome,
    ) -> Vec<PendingSave> {
        if self.saves_in_flight.get(question_id) == Some(&revision) {
            self.saves_in_flight.remove(question_id);
        }

        let running = self.status == SessionStatus::Running && !self.disposed;

        match outcome {
            SaveOutcome::Saved => {
                debug!(question_id = %question_id, revision, "Answer saved");
                if running && self.responses.has_dirty() {
                    return self.collect_saves();
                }
            }
            SaveOutcome::Failed(error) => {
                warn!(
                    question_id = %question_id,
                    revision,
                    error = %error,
                    "Autosave failed, will retry"
                );
                if let Some(session) = &self.session {
                    let _ = self.store.append_audit(AuditEvent::new(AuditEventType::SaveFailed {
                        session_id: session.session_id.clone(),
                        question_id: question_id.clone(),
                        error,
                    }));
                }
                if running {
                    self.responses.mark_dirty(question_id);
                }
            }
        }

        Vec::new()
    }

    fn collect_saves(&mut self) -> Vec<PendingSave> {
        let session_id = match &self.session {
            Some(session) => session.session_id.clone(),
            None => return Vec::new(),
        };

        let mut saves = Vec::new();
        for question_id in self.responses.drain_dirty() {
            // One save per question in flight; newer values wait for it
            if self.saves_in_flight.contains_key(&question_id) {
                self.responses.mark_dirty(&question_id);
                continue;
            }

            if let Some(response) = self.responses.response(&question_id) {
                self.saves_in_flight
                    .insert(question_id.clone(), response.revision);
                saves.push(PendingSave {
                    session_id: session_id.clone(),
                    question_id,
                    value: response.value.clone(),
                    revision: response.revision,
                });
            }
        }
        saves
    }

    // Navigation

    /// Move to the question at `index`. Out-of-range requests, and any
    /// request once the session is over, are ignored.
    pub fn navigate(&mut self, index: usize) -> bool {
        if self.navigation_frozen() {
            return false;
        }
        self.navigation.go_to(index)
    }

    pub fn next(&mut self) -> bool {
        if self.navigation_frozen() {
            return false;
        }
        self.navigation.next()
    }

    pub fn previous(&mut self) -> bool {
        if self.navigation_frozen() {
            return false;
        }
        self.navigation.previous()
    }

    fn navigation_frozen(&self) -> bool {
        self.disposed || self.status.is_terminal()
    }

    // Triggers

    /// One second has elapsed.
    pub fn tick(&mut self, now: DateTime<Local>) -> Vec<CoreEvent> {
        if self.status != SessionStatus::Running || self.disposed {
            return Vec::new();
        }

        let mut events = Vec::new();
        let expired = self.clock.tick() == Some(ClockEvent::Expired);
        let remaining = self.clock.remaining_seconds();

        if !expired && let Some(session) = &mut self.session {
            let pending: Vec<_> = session
                .pending_warnings(remaining, &self.policy.warnings)
                .into_iter()
                .cloned()
                .collect();

            for warning in pending {
                session.mark_warning_issued(warning.seconds_before);

                info!(
                    session_id = %session.session_id,
                    threshold_seconds = warning.seconds_before,
                    remaining_secs = remaining,
                    "Time warning issued"
                );

                events.push(CoreEvent::TimeWarning {
                    remaining_seconds: remaining,
                    severity: warning.severity,
                    message: warning.message,
                });
            }
        }

        if expired {
            info!("Clock expired");
            events.extend(self.finalize(FinalizeReason::Timeout, now));
        }

        events
    }

    /// Count one violation reported by the proctoring sensor.
    ///
    /// Fails with `SessionNotRunning` before the session is loaded and after
    /// it has finished. The violation that reaches the escalation threshold
    /// triggers `finalize(Violations)`.
    pub fn record_violation(
        &mut self,
        detail: impl Into<String>,
        now: DateTime<Local>,
    ) -> CoreResult<Vec<CoreEvent>> {
        if self.disposed || self.session.is_none() {
            return Err(CoreError::not_running(self.status));
        }

        let detail = detail.into();
        let escalation = self.violations.record_violation(detail.clone(), now)?;
        let count = self.violations.count();
        let threshold = self.violations.escalation_threshold();

        if let Some(session) = &self.session {
            let _ = self.store.append_audit(AuditEvent::new(
                AuditEventType::ViolationRecorded {
                    session_id: session.session_id.clone(),
                    count,
                    detail: detail.clone(),
                },
            ));
            warn!(
                session_id = %session.session_id,
                count,
                threshold,
                detail = %detail,
                "Proctoring violation recorded"
            );
        }

        let mut events = vec![CoreEvent::ViolationRecorded {
            count,
            threshold,
            detail,
        }];

        if let Some(ViolationEvent::Escalated { count }) = escalation {
            info!(count, threshold, "Violations escalated");
            events.extend(self.finalize(FinalizeReason::Violations, now));
        }

        Ok(events)
    }

    /// Count a batch of violations from one sensor poll. Violations arriving
    /// after the session has finished are dropped.
    pub fn record_violations<I, S>(&mut self, details: I, now: DateTime<Local>) -> Vec<CoreEvent>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut events = Vec::new();
        for detail in details {
            match self.record_violation(detail, now) {
                Ok(more) => events.extend(more),
                Err(e) => {
                    debug!(error = %e, "Dropping violation");
                    break;
                }
            }
        }
        events
    }

    /// The student pressed submit.
    ///
    /// A submit that loses the race against another trigger is a silent
    /// no-op rather than an error.
    pub fn request_manual_submit(&mut self, now: DateTime<Local>) -> CoreResult<Vec<CoreEvent>> {
        if self.disposed {
            return Err(CoreError::not_running(self.status));
        }

        match self.status {
            SessionStatus::Running => Ok(self.finalize(FinalizeReason::Manual, now)),
            SessionStatus::Finalizing | SessionStatus::Submitted => {
                debug!(status = ?self.status, "Manual submit after finalize; ignoring");
                Ok(Vec::new())
            }
            SessionStatus::Loading | SessionStatus::Failed => {
                Err(CoreError::not_running(self.status))
            }
        }
    }

    // Termination

    /// The single termination routine.
    ///
    /// The first call while running claims the guard, stops the clock,
    /// snapshots every answer and hands out one [`SubmitRequest`]. Every other
    /// call returns no events.
    pub fn finalize(&mut self, reason: FinalizeReason, now: DateTime<Local>) -> Vec<CoreEvent> {
        if self.guard.claimed || self.status != SessionStatus::Running || self.disposed {
            debug!(
                reason = %reason,
                status = ?self.status,
                winner = ?self.guard.reason,
                "Finalize already handled"
            );
            return Vec::new();
        }
        let session_id = match &self.session {
            Some(session) => session.session_id.clone(),
            None => return Vec::new(),
        };

        self.guard.claimed = true;
        self.guard.reason = Some(reason);
        self.clock.stop();

        let snapshot = self.responses.snapshot();
        self.guard.snapshot = Some(snapshot.clone());
        self.guard.attempts += 1;
        self.status = SessionStatus::Finalizing;

        let _ = self.store.append_audit(AuditEvent {
            timestamp: now,
            ..AuditEvent::new(AuditEventType::FinalizeStarted {
                session_id: session_id.clone(),
                reason,
                answered_count: snapshot.len(),
            })
        });

        info!(
            session_id = %session_id,
            reason = %reason,
            answered = snapshot.len(),
            remaining_secs = self.clock.remaining_seconds(),
            "Finalizing session"
        );

        vec![
            CoreEvent::TimersStopped,
            CoreEvent::FinalizeStarted { reason },
            CoreEvent::SubmitDue(SubmitRequest {
                session_id,
                responses: snapshot,
                reason,
                attempt: self.guard.attempts,
            }),
        ]
    }

    /// Report the outcome of a submission.
    pub fn on_submit_completed(
        &mut self,
        outcome: SubmitOutcome,
        now_mono: MonotonicInstant,
    ) -> Vec<CoreEvent> {
        if self.status != SessionStatus::Finalizing {
            debug!(status = ?self.status, "Ignoring submit completion");
            return Vec::new();
        }
        let (session_id, elapsed) = match &self.session {
            Some(session) => (session.session_id.clone(), session.elapsed(now_mono)),
            None => return Vec::new(),
        };
        let reason = self.guard.reason.unwrap_or(FinalizeReason::Manual);

        match outcome {
            SubmitOutcome::Accepted | SubmitOutcome::AlreadySubmitted => {
                if outcome == SubmitOutcome::AlreadySubmitted {
                    info!(session_id = %session_id, "Backend already held a submission");
                }

                self.status = SessionStatus::Submitted;
                self.violations.seal(SessionStatus::Submitted);

                let _ = self.store.append_audit(AuditEvent::new(
                    AuditEventType::SessionSubmitted {
                        session_id: session_id.clone(),
                        reason,
                        elapsed,
                    },
                ));

                info!(
                    session_id = %session_id,
                    reason = %reason,
                    elapsed_secs = elapsed.as_secs(),
                    "Session submitted"
                );

                vec![CoreEvent::Completed {
                    reason,
                    responses: self.guard.snapshot.clone().unwrap_or_default(),
                }]
            }
            SubmitOutcome::Failed(error) => {
                let retry_available = self.guard.retries_left > 0;
                if retry_available {
                    self.guard.claimed = false;
                }

                self.status = SessionStatus::Failed;
                self.violations.seal(SessionStatus::Failed);

                let _ = self.store.append_audit(AuditEvent::new(AuditEventType::SubmitFailed {
                    session_id: session_id.clone(),
                    reason,
                    error: error.clone(),
                    retry_available,
                }));

                warn!(
                    session_id = %session_id,
                    reason = %reason,
                    error = %error,
                    retry_available,
                    "Submission failed"
                );

                vec![CoreEvent::SubmitFailed {
                    reason,
                    error,
                    retry_available,
                }]
            }
        }
    }

    /// Manual retry after a failed submission. Available once; resubmits the
    /// original snapshot with the original reason.
    pub fn retry_submit(&mut self) -> CoreResult<Vec<CoreEvent>> {
        if !self.retry_available() {
            return Err(CoreError::RetryUnavailable);
        }
        let (session_id, reason, snapshot) =
            match (&self.session, self.guard.reason, &self.guard.snapshot) {
                (Some(session), Some(reason), Some(snapshot)) => {
                    (session.session_id.clone(), reason, snapshot.clone())
                }
                _ => return Err(CoreError::RetryUnavailable),
            };

        self.guard.claimed = true;
        self.guard.retries_left -= 1;
        self.guard.attempts += 1;
        self.status = SessionStatus::Finalizing;

        info!(
            session_id = %session_id,
            reason = %reason,
            attempt = self.guard.attempts,
            "Retrying submission"
        );

        Ok(vec![CoreEvent::SubmitDue(SubmitRequest {
            session_id,
            responses: snapshot,
            reason,
            attempt: self.guard.attempts,
        })])
    }

    /// Leave the exam screen. Stops every timer and disposes the session;
    /// later triggers and completions are ignored.
    pub fn exit(&mut self) -> Vec<CoreEvent> {
        if self.disposed {
            return Vec::new();
        }
        self.disposed = true;
        self.clock.stop();

        if let Some(session) = &self.session {
            let _ = self.store.append_audit(AuditEvent::new(AuditEventType::SessionExited {
                session_id: session.session_id.clone(),
                status: self.status,
            }));
            info!(
                session_id = %session.session_id,
                status = ?self.status,
                "Exam screen exited"
            );
        }

        vec![CoreEvent::TimersStopped, CoreEvent::Exited]
    }

    fn ensure_running(&self) -> CoreResult<()> {
        if self.status != SessionStatus::Running || self.disposed {
            return Err(CoreError::not_running(self.status));
        }
        Ok(())
    }

    // Observers

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.clock.remaining_seconds()
    }

    pub fn current_index(&self) -> usize {
        self.navigation.current_index()
    }

    pub fn current_question(&self) -> Option<&Question> {
        let session = self.session.as_ref()?;
        session.questions.get(self.navigation.current_index())
    }

    pub fn question_count(&self) -> usize {
        self.navigation.question_count()
    }

    pub fn answered_count(&self) -> usize {
        self.responses.answered_count()
    }

    pub fn violation_count(&self) -> usize {
        self.violations.count()
    }

    pub fn status_of(&self, index: usize) -> Option<QuestionStatus> {
        self.navigation.status_of(index, &self.responses)
    }

    pub fn question_statuses(&self) -> Vec<QuestionStatus> {
        self.navigation.statuses(&self.responses)
    }

    pub fn get_answer(&self, question_id: &QuestionId) -> Option<&AnswerValue> {
        self.responses.get_answer(question_id)
    }

    pub fn finalize_reason(&self) -> Option<FinalizeReason> {
        self.guard.reason
    }

    pub fn retry_available(&self) -> bool {
        self.status == SessionStatus::Failed
            && self.guard.reason.is_some()
            && !self.guard.claimed
            && self.guard.retries_left > 0
            && !self.disposed
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn session(&self) -> Option<&ExamSession> {
        self.session.as_ref()
    }

    /// Read-only snapshot for the presentation layer
    pub fn view(&self) -> SessionView {
        let mut view = SessionView::loading(self.violations.escalation_threshold());
        view.status = self.status;
        view.remaining_seconds = self.remaining_seconds();
        view.current_index = self.current_index();
        view.question_count = self.question_count();
        view.answered_count = self.answered_count();
        view.violation_count = self.violation_count();
        view.finalize_reason = self.guard.reason;
        view.retry_available = self.retry_available();
        view.disposed = self.disposed;

        if let Some(session) = &self.session {
            view.session_id = Some(session.session_id.clone());
            view.exam_title = Some(session.exam_title.clone());
            view.total_duration_seconds = session.total_duration_seconds;
        } else if let Some((_, session_id)) = &self.requested {
            view.session_id = Some(session_id.clone());
        }

        view
    }
}
