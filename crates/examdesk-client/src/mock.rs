//! Mock exam service for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use examdesk_core::error::SessionError;
use examdesk_core::model::ExamSession;
use examdesk_core::traits::{
    GradingService, SessionSnapshot, SessionStatus, StartSessionResponse, SubmissionResult,
    SubmitRequest,
};

/// An in-memory exam service for exercising the controller without a server.
///
/// Serves one session, fails the next N submits on request, and records
/// every submit it receives.
pub struct MockGradingService {
    session: ExamSession,
    remaining_seconds: Option<u64>,
    submit_delay: Duration,
    /// Errors returned by upcoming submit calls, in order.
    submit_failures: Mutex<VecDeque<SessionError>>,
    status: Mutex<SessionStatus>,
    start_calls: AtomicU32,
    submit_calls: AtomicU32,
    submissions: Mutex<Vec<SubmitRequest>>,
}

impl MockGradingService {
    pub fn new(session: ExamSession) -> Self {
        Self {
            session,
            remaining_seconds: None,
            submit_delay: Duration::ZERO,
            submit_failures: Mutex::new(VecDeque::new()),
            status: Mutex::new(SessionStatus::Active),
            start_calls: AtomicU32::new(0),
            submit_calls: AtomicU32::new(0),
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Report this many seconds left instead of letting the client compute it.
    pub fn with_remaining_seconds(mut self, secs: u64) -> Self {
        self.remaining_seconds = Some(secs);
        self
    }

    /// Hold each submit for `delay` before answering.
    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    /// Queue an error for the next submit call.
    pub fn fail_next_submit(&self, error: SessionError) {
        self.submit_failures.lock().unwrap().push_back(error);
    }

    pub fn start_calls(&self) -> u32 {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// Submit calls received, including failed ones.
    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    /// Every submit request received, in order.
    pub fn submissions(&self) -> Vec<SubmitRequest> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl GradingService for MockGradingService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start_session(&self, exam_id: &str) -> anyhow::Result<StartSessionResponse> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if exam_id != self.session.exam_id {
            return Err(SessionError::SessionUnavailable(format!("exam {exam_id} is not active")).into());
        }
        if !self.status.lock().unwrap().is_open() {
            return Err(SessionError::SessionUnavailable("exam already completed".into()).into());
        }
        Ok(StartSessionResponse {
            session: self.session.clone(),
            remaining_seconds: self.remaining_seconds,
        })
    }

    async fn get_session(&self, session_id: &str) -> anyhow::Result<SessionSnapshot> {
        if session_id != self.session.id {
            return Err(SessionError::SessionUnavailable(format!("no session {session_id}")).into());
        }
        let saved_answers = self
            .submissions
            .lock()
            .unwrap()
            .last()
            .map(|r| r.answers.clone())
            .unwrap_or_default();
        Ok(SessionSnapshot {
            session: self.session.clone(),
            status: *self.status.lock().unwrap(),
            remaining_seconds: self.remaining_seconds,
            saved_answers,
        })
    }

    async fn submit_session(
        &self,
        session_id: &str,
        request: &SubmitRequest,
    ) -> anyhow::Result<SubmissionResult> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }
        if let Some(err) = self.submit_failures.lock().unwrap().pop_front() {
            return Err(err.into());
        }

        self.submissions.lock().unwrap().push(request.clone());
        *self.status.lock().unwrap() = SessionStatus::Submitted;

        Ok(SubmissionResult {
            session_id: session_id.to_string(),
            status: SessionStatus::Submitted,
            score: None,
            max_score: Some(f64::from(self.session.max_score())),
            passed: None,
            pending_review: true,
            submitted_at: Some(Utc::now()),
        })
    }
}
