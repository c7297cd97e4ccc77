//! Timed exam session controller.
//!
//! Owns one candidate's attempt from the moment the exam service hands out
//! a session until the answers are submitted. The countdown and the
//! candidate's own submit button both funnel into [`ExamSessionController::submit`],
//! whose check-and-set on the submission state guarantees a single network
//! call per attempt.
//!
//! State machine: `in-progress -> submitting -> submitted`, with
//! `submitting -> in-progress` when a submit fails.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;
use crate::model::{AnswerDraft, AnswerValue, ExamSession, SubmissionState};
use crate::traits::{GradingService, SessionSnapshot, SubmissionResult, SubmitRequest};

/// Tunables for a running session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Countdown period in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// How many automatic submits to try after the deadline before giving up.
    #[serde(default = "default_auto_submit_attempts")]
    pub max_auto_submit_attempts: u32,
}

fn default_tick_interval() -> u64 {
    1000
}

fn default_auto_submit_attempts() -> u32 {
    3
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            max_auto_submit_attempts: default_auto_submit_attempts(),
        }
    }
}

/// Result of one countdown step.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Time is still running; carries the seconds left.
    Running(u64),
    /// The deadline passed and the automatic submit succeeded.
    Submitted(SubmissionResult),
    /// Nothing to do: a submit is in flight or the session is closed.
    Idle,
}

/// Result of a call to [`ExamSessionController::submit`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// This call performed the submit and it succeeded.
    Submitted(SubmissionResult),
    /// Another submit for this session is currently in flight.
    AlreadyInFlight,
    /// The session was already submitted.
    AlreadySubmitted,
}

struct SessionState {
    state: SubmissionState,
    remaining: u64,
    draft: AnswerDraft,
    auto_attempts: u32,
    submitted: Option<SubmitRequest>,
    result: Option<SubmissionResult>,
}

struct Shared {
    session: ExamSession,
    idempotency_key: String,
    config: ControllerConfig,
    service: Arc<dyn GradingService>,
    inner: Mutex<SessionState>,
}

/// Handle to a running exam session. Clones share the same session.
#[derive(Clone)]
pub struct ExamSessionController {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ExamSessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("ExamSessionController")
            .field("session_id", &self.shared.session.id)
            .field("state", &inner.state)
            .field("remaining", &inner.remaining)
            .field("answered", &inner.draft.len())
            .finish()
    }
}

impl ExamSessionController {
    /// Ask the service for a new or resumed session on `exam_id`.
    pub async fn start(
        service: Arc<dyn GradingService>,
        exam_id: &str,
        config: ControllerConfig,
    ) -> Result<Self, SessionError> {
        Self::start_at(service, exam_id, config, Utc::now()).await
    }

    /// Like [`start`](Self::start) with an explicit clock reading.
    pub async fn start_at(
        service: Arc<dyn GradingService>,
        exam_id: &str,
        config: ControllerConfig,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let response = service
            .start_session(exam_id)
            .await
            .map_err(SessionError::from_service)?;

        let remaining = response
            .remaining_seconds
            .unwrap_or_else(|| response.session.remaining_at(now));

        tracing::info!(
            session_id = %response.session.id,
            exam_id,
            questions = response.session.questions.len(),
            remaining,
            "exam session started"
        );

        Ok(Self::from_parts(
            service,
            response.session,
            remaining,
            AnswerDraft::new(),
            config,
        ))
    }

    /// Reattach to a live session, restoring any answers the server saved.
    pub async fn resume(
        service: Arc<dyn GradingService>,
        session_id: &str,
        config: ControllerConfig,
    ) -> Result<Self, SessionError> {
        let snapshot = service
            .get_session(session_id)
            .await
            .map_err(SessionError::from_service)?;

        if !snapshot.status.is_open() {
            return Err(SessionError::SessionUnavailable(format!(
                "session {session_id} is {}",
                snapshot.status
            )));
        }

        let remaining = snapshot_remaining(&snapshot, Utc::now());
        let draft = restore_draft(&snapshot);
        tracing::info!(
            session_id,
            restored = draft.len(),
            remaining,
            "exam session resumed"
        );

        Ok(Self::from_parts(
            service,
            snapshot.session,
            remaining,
            draft,
            config,
        ))
    }

    /// Build a controller around an already-loaded session.
    pub fn from_parts(
        service: Arc<dyn GradingService>,
        session: ExamSession,
        remaining: u64,
        draft: AnswerDraft,
        config: ControllerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                session,
                idempotency_key: Uuid::new_v4().to_string(),
                config,
                service,
                inner: Mutex::new(SessionState {
                    state: SubmissionState::InProgress,
                    remaining,
                    draft,
                    auto_attempts: 0,
                    submitted: None,
                    result: None,
                }),
            }),
        }
    }

    pub fn session(&self) -> &ExamSession {
        &self.shared.session
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.shared.config
    }

    pub fn state(&self) -> SubmissionState {
        self.lock().state
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.lock().remaining
    }

    /// Whether the countdown has reached zero.
    pub fn is_expired(&self) -> bool {
        self.lock().remaining == 0
    }

    pub fn auto_submit_attempts(&self) -> u32 {
        self.lock().auto_attempts
    }

    /// Copy of the current draft.
    pub fn draft(&self) -> AnswerDraft {
        self.lock().draft.clone()
    }

    pub fn answer(&self, question_id: &str) -> Option<AnswerValue> {
        self.lock().draft.get(question_id).cloned()
    }

    /// The exact payload that was accepted by the server, once submitted.
    pub fn submitted_payload(&self) -> Option<SubmitRequest> {
        self.lock().submitted.clone()
    }

    pub fn result(&self) -> Option<SubmissionResult> {
        self.lock().result.clone()
    }

    /// Store or overwrite the draft answer for a question.
    ///
    /// The answer shape is not checked here; the server decides. Rejected
    /// once the session is submitted or the deadline has passed.
    ///
    /// Answers are still accepted while a submit is in flight, but that
    /// submit carries the draft as it was when it started. If it succeeds
    /// the newer answer is not sent; compare [`draft`](Self::draft) with
    /// [`submitted_payload`](Self::submitted_payload) to detect this. If it
    /// fails, the next submit sends the newer answer.
    pub fn record_answer(
        &self,
        question_id: &str,
        value: AnswerValue,
    ) -> Result<Option<AnswerValue>, SessionError> {
        let mut inner = self.lock();
        if inner.state == SubmissionState::Submitted {
            return Err(SessionError::SessionClosed);
        }
        if self.shared.session.question(question_id).is_none() {
            return Err(SessionError::UnknownQuestion(question_id.to_string()));
        }
        if inner.remaining == 0 {
            return Err(SessionError::TimeExpired);
        }
        tracing::debug!(question_id, "answer recorded");
        Ok(inner.draft.record(question_id, value))
    }

    /// Advance the countdown by one step.
    ///
    /// Reaching zero triggers an automatic submit with whatever is in the
    /// draft. If that submit fails, later ticks fire it again until
    /// `max_auto_submit_attempts` is used up. While a manual submit is in
    /// flight the clock still counts down but never starts a submit of its own.
    pub async fn tick(&self) -> Result<TickOutcome, SessionError> {
        let request = {
            let mut inner = self.lock();
            match inner.state {
                SubmissionState::InProgress => {}
                // The clock keeps running under an in-flight submit so a
                // failed one cannot hand back time past the deadline.
                SubmissionState::Submitting => {
                    inner.remaining = inner.remaining.saturating_sub(1);
                    return Ok(TickOutcome::Running(inner.remaining));
                }
                SubmissionState::NotStarted | SubmissionState::Submitted => {
                    return Ok(TickOutcome::Idle)
                }
            }
            if inner.remaining > 0 {
                inner.remaining -= 1;
                if inner.remaining > 0 {
                    return Ok(TickOutcome::Running(inner.remaining));
                }
                tracing::info!(
                    session_id = %self.shared.session.id,
                    answered = inner.draft.len(),
                    "time expired, submitting automatically"
                );
            }
            if inner.auto_attempts >= self.shared.config.max_auto_submit_attempts {
                return Err(SessionError::AutoSubmitExhausted {
                    attempts: inner.auto_attempts,
                });
            }
            inner.auto_attempts += 1;
            self.begin_submit(&mut inner, false)
        };

        match request {
            Ok(request) => self.send(request).await.map(TickOutcome::Submitted),
            Err(_) => Ok(TickOutcome::Idle),
        }
    }

    /// Submit the current draft.
    ///
    /// Only one submit per session reaches the service: a call made while
    /// another is in flight, or after success, returns without a network call.
    pub async fn submit(&self, manual: bool) -> Result<SubmitOutcome, SessionError> {
        let request = {
            let mut inner = self.lock();
            match self.begin_submit(&mut inner, manual) {
                Ok(request) => request,
                Err(outcome) => return Ok(outcome),
            }
        };
        self.send(request).await.map(SubmitOutcome::Submitted)
    }

    /// Pull the server's view of the session and tighten the local clock.
    ///
    /// The local countdown only ever moves down; a server value larger than
    /// the local one is ignored. A session the server has closed is treated
    /// as expired.
    pub async fn resync(&self) -> Result<u64, SessionError> {
        let snapshot = self
            .shared
            .service
            .get_session(&self.shared.session.id)
            .await
            .map_err(SessionError::from_service)?;

        let server_remaining = if snapshot.status.is_open() {
            snapshot_remaining(&snapshot, Utc::now())
        } else {
            0
        };

        let mut inner = self.lock();
        if inner.state == SubmissionState::InProgress && server_remaining < inner.remaining {
            tracing::info!(
                session_id = %self.shared.session.id,
                local = inner.remaining,
                server = server_remaining,
                "countdown adjusted to server time"
            );
            inner.remaining = server_remaining;
        }
        Ok(inner.remaining)
    }

    /// Check-and-set `in-progress -> submitting`, snapshotting the payload.
    fn begin_submit(
        &self,
        inner: &mut SessionState,
        manual: bool,
    ) -> Result<SubmitRequest, SubmitOutcome> {
        match inner.state {
            SubmissionState::InProgress => {}
            SubmissionState::Submitted => return Err(SubmitOutcome::AlreadySubmitted),
            SubmissionState::Submitting | SubmissionState::NotStarted => {
                return Err(SubmitOutcome::AlreadyInFlight)
            }
        }
        inner.state = SubmissionState::Submitting;
        Ok(SubmitRequest {
            answers: inner.draft.to_wire(&self.shared.session.questions),
            idempotency_key: self.shared.idempotency_key.clone(),
            manual,
        })
    }

    async fn send(&self, request: SubmitRequest) -> Result<SubmissionResult, SessionError> {
        let session_id = &self.shared.session.id;
        let mut guard = InFlight::new(self);

        tracing::info!(
            session_id = %session_id,
            answers = request.answers.len(),
            manual = request.manual,
            "submitting answers"
        );
        let outcome = self
            .shared
            .service
            .submit_session(session_id, &request)
            .await;
        guard.disarm();

        let mut inner = self.lock();
        match outcome {
            Ok(result) => {
                inner.state = SubmissionState::Submitted;
                inner.submitted = Some(request);
                inner.result = Some(result.clone());
                tracing::info!(session_id = %session_id, status = %result.status, "session submitted");
                Ok(result)
            }
            Err(e) => {
                let err = SessionError::from_service(e);
                inner.state = SubmissionState::InProgress;
                tracing::warn!(session_id = %session_id, "submit failed, answers retained: {err}");
                Err(err)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Reverts `submitting -> in-progress` if a submit future is dropped
/// before the service answers.
struct InFlight<'a> {
    controller: &'a ExamSessionController,
    armed: bool,
}

impl<'a> InFlight<'a> {
    fn new(controller: &'a ExamSessionController) -> Self {
        Self {
            controller,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.controller.lock();
            if inner.state == SubmissionState::Submitting {
                inner.state = SubmissionState::InProgress;
            }
        }
    }
}

fn snapshot_remaining(snapshot: &SessionSnapshot, now: DateTime<Utc>) -> u64 {
    snapshot
        .remaining_seconds
        .unwrap_or_else(|| snapshot.session.remaining_at(now))
}

fn restore_draft(snapshot: &SessionSnapshot) -> AnswerDraft {
    let mut draft = AnswerDraft::new();
    for saved in &snapshot.saved_answers {
        if snapshot.session.question(&saved.question_id).is_none() {
            continue;
        }
        let value = match (&saved.selected_option_id, &saved.text_answer) {
            (Some(option_id), _) => AnswerValue::Choice(option_id.clone()),
            (None, Some(text)) => AnswerValue::Text(text.clone()),
            (None, None) => continue,
        };
        draft.record(&saved.question_id, value);
    }
    draft
}
