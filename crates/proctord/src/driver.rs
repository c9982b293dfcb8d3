//! Session event loop and presentation handle

use proctor_api::{
    AnswerValue, EventPayload, FinalizeReason, Question, QuestionStatus, SessionEvent,
    SessionManifest, SessionView,
};
use proctor_backend_api::{BackendError, BackendResult, ProctoringSensor, SessionBackend};
use proctor_config::SessionPolicy;
use proctor_core::{
    CoreError, CoreEvent, PendingSave, SaveOutcome, SubmissionCoordinator, SubmitOutcome,
    SubmitRequest,
};
use proctor_store::Store;
use proctor_util::{ExamId, MonotonicInstant, QuestionId, SessionId};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{PeriodicTask, SessionTimers};

/// Clock resolution
const CLOCK_PERIOD: Duration = Duration::from_secs(1);

/// Pending presentation commands before senders wait
const COMMAND_BUFFER: usize = 32;

/// Errors returned to the presentation layer
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExamError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Session runtime has shut down")]
    Closed,
}

pub type ExamResult<T> = Result<T, ExamError>;

/// Commands from the presentation layer
#[derive(Debug)]
pub enum ExamCommand {
    Answer {
        question_id: QuestionId,
        value: AnswerValue,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    Toggle {
        question_id: QuestionId,
        option: String,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    Navigate {
        index: usize,
        reply: oneshot::Sender<bool>,
    },
    Next {
        reply: oneshot::Sender<bool>,
    },
    Previous {
        reply: oneshot::Sender<bool>,
    },
    Submit {
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    Retry {
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    CurrentQuestion {
        reply: oneshot::Sender<Option<Question>>,
    },
    Statuses {
        reply: oneshot::Sender<Vec<QuestionStatus>>,
    },
    GetAnswer {
        question_id: QuestionId,
        reply: oneshot::Sender<Option<AnswerValue>>,
    },
    Exit {
        reply: oneshot::Sender<()>,
    },
}

/// Messages produced inside the runtime: timer ticks and backend completions
#[derive(Debug)]
enum RuntimeMessage {
    Loaded(BackendResult<SessionManifest>),
    ClockTick,
    AutosaveTick,
    Violations(BackendResult<Vec<String>>),
    Saved {
        question_id: QuestionId,
        revision: u64,
        result: BackendResult<()>,
    },
    Submitted {
        attempt: u32,
        result: BackendResult<()>,
    },
}

/// Collaborators and policy for running sessions
#[derive(Clone)]
pub struct ExamDriver {
    policy: SessionPolicy,
    backend: Arc<dyn SessionBackend>,
    sensor: Arc<dyn ProctoringSensor>,
    store: Arc<dyn Store>,
}

impl ExamDriver {
    pub fn new(
        policy: SessionPolicy,
        backend: Arc<dyn SessionBackend>,
        sensor: Arc<dyn ProctoringSensor>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            policy,
            backend,
            sensor,
            store,
        }
    }

    /// Start loading `session_id` and run it on a new task.
    ///
    /// Dropping the returned handle exits the session.
    pub fn spawn(&self, exam_id: ExamId, session_id: SessionId) -> ExamHandle {
        let coordinator = SubmissionCoordinator::new(self.policy.clone(), self.store.clone());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (runtime_tx, runtime_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(coordinator.view());
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let runtime = SessionRuntime {
            coordinator,
            policy: self.policy.clone(),
            backend: self.backend.clone(),
            sensor: self.sensor.clone(),
            timers: SessionTimers::new(),
            runtime_tx,
            view_tx,
            event_tx,
        };

        let task = tokio::spawn(runtime.run(exam_id, session_id, command_rx, runtime_rx));

        ExamHandle {
            commands: command_tx,
            view: view_rx,
            events: Some(event_rx),
            task: Some(task),
        }
    }
}

/// The presentation layer's only way to read or mutate a running session
pub struct ExamHandle {
    commands: mpsc::Sender<ExamCommand>,
    view: watch::Receiver<SessionView>,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    task: Option<JoinHandle<()>>,
}

impl ExamHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> ExamCommand) -> ExamResult<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| ExamError::Closed)?;
        rx.await.map_err(|_| ExamError::Closed)
    }

    pub async fn answer(&self, question_id: QuestionId, value: AnswerValue) -> ExamResult<()> {
        self.request(|reply| ExamCommand::Answer {
            question_id,
            value,
            reply,
        })
        .await??;
        Ok(())
    }

    pub async fn toggle(&self, question_id: QuestionId, option: impl Into<String>) -> ExamResult<()> {
        let option = option.into();
        self.request(|reply| ExamCommand::Toggle {
            question_id,
            option,
            reply,
        })
        .await??;
        Ok(())
    }

    pub async fn get_answer(&self, question_id: QuestionId) -> ExamResult<Option<AnswerValue>> {
        self.request(|reply| ExamCommand::GetAnswer { question_id, reply })
            .await
    }

    pub async fn navigate(&self, index: usize) -> ExamResult<bool> {
        self.request(|reply| ExamCommand::Navigate { index, reply })
            .await
    }

    pub async fn next(&self) -> ExamResult<bool> {
        self.request(|reply| ExamCommand::Next { reply }).await
    }

    pub async fn previous(&self) -> ExamResult<bool> {
        self.request(|reply| ExamCommand::Previous { reply }).await
    }

    pub async fn submit(&self) -> ExamResult<()> {
        self.request(|reply| ExamCommand::Submit { reply }).await??;
        Ok(())
    }

    pub async fn retry(&self) -> ExamResult<()> {
        self.request(|reply| ExamCommand::Retry { reply }).await??;
        Ok(())
    }

    pub async fn current_question(&self) -> ExamResult<Option<Question>> {
        self.request(|reply| ExamCommand::CurrentQuestion { reply })
            .await
    }

    /// Answered/unanswered palette in display order
    pub async fn statuses(&self) -> ExamResult<Vec<QuestionStatus>> {
        self.request(|reply| ExamCommand::Statuses { reply }).await
    }

    /// Leave the exam screen and wait for the runtime to stop
    pub async fn exit(&mut self) -> ExamResult<()> {
        let result = self.request(|reply| ExamCommand::Exit { reply }).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        result
    }

    /// Latest snapshot
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// A receiver that observes every view change
    pub fn watch(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Take the event stream to consume it elsewhere.
    /// Returns `None` if already taken.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events.take()
    }

    /// Next event, or `None` once the runtime has stopped or the stream was
    /// taken.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        match &mut self.events {
            Some(events) => events.recv().await,
            None => None,
        }
    }
}

/// State owned by the session task
struct SessionRuntime {
    coordinator: SubmissionCoordinator,
    policy: SessionPolicy,
    backend: Arc<dyn SessionBackend>,
    sensor: Arc<dyn ProctoringSensor>,
    timers: SessionTimers,
    runtime_tx: mpsc::UnboundedSender<RuntimeMessage>,
    view_tx: watch::Sender<SessionView>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionRuntime {
    async fn run(
        mut self,
        exam_id: ExamId,
        session_id: SessionId,
        mut commands: mpsc::Receiver<ExamCommand>,
        mut messages: mpsc::UnboundedReceiver<RuntimeMessage>,
    ) {
        match self.coordinator.begin_load(exam_id, session_id.clone()) {
            Ok(()) => self.spawn_fetch(session_id),
            Err(e) => warn!(error = %e, "Session load rejected"),
        }

        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(ExamCommand::Exit { reply }) => {
                            self.exit();
                            let _ = reply.send(());
                            break;
                        }
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!("Exam handle dropped");
                            self.exit();
                            break;
                        }
                    }
                }

                Some(message) = messages.recv() => {
                    self.handle_message(message);
                }
            }

            self.publish_view();
        }

        self.publish_view();
        debug!("Session runtime stopped");
    }

    fn handle_command(&mut self, command: ExamCommand) {
        let now = proctor_util::now();

        match command {
            ExamCommand::Answer {
                question_id,
                value,
                reply,
            } => {
                let result = self
                    .coordinator
                    .record_answer(&question_id, value, now)
                    .map(|saves| self.spawn_saves(saves));
                let _ = reply.send(result);
            }

            ExamCommand::Toggle {
                question_id,
                option,
                reply,
            } => {
                let result = self
                    .coordinator
                    .toggle_option(&question_id, &option, now)
                    .map(|saves| self.spawn_saves(saves));
                let _ = reply.send(result);
            }

            ExamCommand::Navigate { index, reply } => {
                let _ = reply.send(self.coordinator.navigate(index));
            }

            ExamCommand::Next { reply } => {
                let _ = reply.send(self.coordinator.next());
            }

            ExamCommand::Previous { reply } => {
                let _ = reply.send(self.coordinator.previous());
            }

            ExamCommand::Submit { reply } => {
                let result = self
                    .coordinator
                    .request_manual_submit(now)
                    .map(|events| self.handle_core_events(events));
                let _ = reply.send(result);
            }

            ExamCommand::Retry { reply } => {
                let result = self
                    .coordinator
                    .retry_submit()
                    .map(|events| self.handle_core_events(events));
                let _ = reply.send(result);
            }

            ExamCommand::CurrentQuestion { reply } => {
                let _ = reply.send(self.coordinator.current_question().cloned());
            }

            ExamCommand::Statuses { reply } => {
                let _ = reply.send(self.coordinator.question_statuses());
            }

            ExamCommand::GetAnswer { question_id, reply } => {
                let _ = reply.send(self.coordinator.get_answer(&question_id).cloned());
            }

            ExamCommand::Exit { reply } => {
                self.exit();
                let _ = reply.send(());
            }
        }
    }

    fn handle_message(&mut self, message: RuntimeMessage) {
        let now = proctor_util::now();

        match message {
            RuntimeMessage::Loaded(Ok(manifest)) => {
                let events =
                    self.coordinator
                        .on_session_loaded(manifest, now, MonotonicInstant::now());
                self.handle_core_events(events);
            }

            RuntimeMessage::Loaded(Err(e)) => {
                let events = self.coordinator.on_load_failed(e.to_string());
                self.handle_core_events(events);
            }

            RuntimeMessage::ClockTick => {
                let events = self.coordinator.tick(now);
                self.handle_core_events(events);
            }

            RuntimeMessage::AutosaveTick => {
                let saves = self.coordinator.autosave_due();
                self.spawn_saves(saves);
            }

            RuntimeMessage::Violations(Ok(details)) => {
                if !details.is_empty() {
                    let events = self.coordinator.record_violations(details, now);
                    self.handle_core_events(events);
                }
            }

            RuntimeMessage::Violations(Err(e)) => {
                warn!(error = %e, "Proctoring poll failed");
            }

            RuntimeMessage::Saved {
                question_id,
                revision,
                result,
            } => {
                let outcome = match result {
                    Ok(()) => SaveOutcome::Saved,
                    Err(e) => SaveOutcome::Failed(e.to_string()),
                };
                let saves = self
                    .coordinator
                    .on_save_completed(&question_id, revision, outcome);
                self.spawn_saves(saves);
            }

            RuntimeMessage::Submitted { attempt, result } => {
                let outcome = match result {
                    Ok(()) => SubmitOutcome::Accepted,
                    Err(BackendError::AlreadySubmitted) => SubmitOutcome::AlreadySubmitted,
                    Err(e) => SubmitOutcome::Failed(e.to_string()),
                };
                debug!(attempt, outcome = ?outcome, "Submission completed");
                let events = self
                    .coordinator
                    .on_submit_completed(outcome, MonotonicInstant::now());
                self.handle_core_events(events);
            }
        }
    }

    fn handle_core_events(&mut self, events: Vec<CoreEvent>) {
        for event in events {
            self.handle_core_event(event);
        }
    }

    fn handle_core_event(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::SessionStarted {
                session_id,
                exam_title,
                student_name,
                total_duration_seconds,
                question_count,
            } => {
                self.start_timers();
                self.emit(EventPayload::Started {
                    session_id,
                    exam_title,
                    student_name,
                    total_duration_seconds,
                    question_count,
                });
            }

            CoreEvent::LoadFailed { error, .. } => {
                self.emit(EventPayload::LoadFailed { message: error });
            }

            CoreEvent::TimeWarning {
                remaining_seconds,
                severity,
                message,
            } => {
                self.emit(EventPayload::TimeWarning {
                    remaining_seconds,
                    severity,
                    message,
                });
            }

            CoreEvent::ViolationRecorded {
                count,
                threshold,
                detail,
            } => {
                self.emit(EventPayload::ViolationRecorded {
                    count,
                    threshold,
                    detail,
                });
            }

            CoreEvent::TimersStopped => {
                self.timers.cancel_all();
            }

            CoreEvent::FinalizeStarted { reason } => {
                self.emit(EventPayload::Finalizing { reason });
            }

            CoreEvent::SubmitDue(request) => {
                self.spawn_submit(request);
            }

            CoreEvent::Completed { reason, responses } => {
                self.emit(EventPayload::Completed { reason, responses });
            }

            CoreEvent::SubmitFailed {
                reason,
                error,
                retry_available,
            } => {
                self.emit(EventPayload::SubmitFailed {
                    reason,
                    message: error,
                    retry_available,
                });
            }

            CoreEvent::Exited => {
                self.emit(EventPayload::Exited);
            }
        }
    }

    fn exit(&mut self) {
        let events = self.coordinator.exit();
        self.handle_core_events(events);
        // Timers go even if the coordinator had already disposed
        self.timers.cancel_all();
    }

    fn start_timers(&mut self) {
        self.timers.cancel_all();

        let tx = self.runtime_tx.clone();
        self.timers.add(PeriodicTask::spawn("clock", CLOCK_PERIOD, move || {
            let sent = tx.send(RuntimeMessage::ClockTick).is_ok();
            async move { sent }
        }));

        let tx = self.runtime_tx.clone();
        let sensor = self.sensor.clone();
        self.timers.add(PeriodicTask::spawn(
            "proctoring",
            self.policy.proctoring_poll_interval,
            move || {
                let tx = tx.clone();
                let sensor = sensor.clone();
                async move {
                    let result = sensor.poll().await;
                    tx.send(RuntimeMessage::Violations(result)).is_ok()
                }
            },
        ));

        let tx = self.runtime_tx.clone();
        self.timers.add(PeriodicTask::spawn(
            "autosave",
            self.policy.autosave_interval,
            move || {
                let sent = tx.send(RuntimeMessage::AutosaveTick).is_ok();
                async move { sent }
            },
        ));

        info!(
            poll_secs = self.policy.proctoring_poll_interval.as_secs(),
            autosave_secs = self.policy.autosave_interval.as_secs(),
            "Session timers started"
        );
    }

    fn spawn_fetch(&self, session_id: SessionId) {
        let backend = self.backend.clone();
        let tx = self.runtime_tx.clone();
        tokio::spawn(async move {
            let result = backend.fetch_session(&session_id).await;
            let _ = tx.send(RuntimeMessage::Loaded(result));
        });
    }

    fn spawn_saves(&self, saves: Vec<PendingSave>) {
        for save in saves {
            let backend = self.backend.clone();
            let tx = self.runtime_tx.clone();
            tokio::spawn(async move {
                let result = backend
                    .save_response(&save.session_id, &save.question_id, &save.value)
                    .await;
                let _ = tx.send(RuntimeMessage::Saved {
                    question_id: save.question_id,
                    revision: save.revision,
                    result,
                });
            });
        }
    }

    fn spawn_submit(&self, request: SubmitRequest) {
        let backend = self.backend.clone();
        let tx = self.runtime_tx.clone();
        let reason: FinalizeReason = request.reason;
        info!(
            session_id = %request.session_id,
            reason = %reason,
            attempt = request.attempt,
            answered = request.responses.len(),
            "Submitting session"
        );
        tokio::spawn(async move {
            let result = backend
                .submit_session(&request.session_id, &request.responses, request.reason)
                .await;
            let _ = tx.send(RuntimeMessage::Submitted {
                attempt: request.attempt,
                result,
            });
        });
    }

    fn emit(&self, payload: EventPayload) {
        let _ = self.event_tx.send(SessionEvent::new(payload));
    }

    fn publish_view(&self) {
        let view = self.coordinator.view();
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
    }
}
