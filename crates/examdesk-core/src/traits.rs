//! Core trait definition for the external exam service, plus the wire
//! types exchanged with it.
//!
//! The trait is implemented over HTTP by `examdesk-client`; tests use the
//! in-memory mock from the same crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ExamSession;

// ---------------------------------------------------------------------------
// Grading service trait
// ---------------------------------------------------------------------------

/// The remote service that owns sessions, grading, and results.
///
/// Implementations should raise `SessionError` values (boxed into
/// `anyhow::Error`) so callers can classify failures.
#[async_trait]
pub trait GradingService: Send + Sync {
    /// Human-readable backend name (e.g. "http").
    fn name(&self) -> &str;

    /// Start a new session for an exam, or resume the candidate's live one.
    async fn start_session(&self, exam_id: &str) -> anyhow::Result<StartSessionResponse>;

    /// Fetch the current server view of a session.
    async fn get_session(&self, session_id: &str) -> anyhow::Result<SessionSnapshot>;

    /// Submit the candidate's answers and close the session.
    async fn submit_session(
        &self,
        session_id: &str,
        request: &SubmitRequest,
    ) -> anyhow::Result<SubmissionResult>;
}

/// Response to a start-session call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub session: ExamSession,
    /// Server-authoritative time left. When absent the client computes it
    /// from `started_at` and `duration_minutes`.
    #[serde(default)]
    pub remaining_seconds: Option<u64>,
}

/// Server snapshot of a session, used to resume and to resync the clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session: ExamSession,
    pub status: SessionStatus,
    #[serde(default)]
    pub remaining_seconds: Option<u64>,
    /// Answers the server already holds for this session, if any.
    #[serde(default)]
    pub saved_answers: Vec<SubmittedAnswer>,
}

/// Session status as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Submitted,
    Expired,
    Graded,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Submitted => write!(f, "submitted"),
            SessionStatus::Expired => write!(f, "expired"),
            SessionStatus::Graded => write!(f, "graded"),
        }
    }
}

impl SessionStatus {
    /// Whether the server still accepts answers for this session.
    pub fn is_open(&self) -> bool {
        matches!(self, SessionStatus::Active)
    }
}

/// One answered question in a submission payload.
///
/// Exactly one of `selected_option_id` or `text_answer` is set; the other
/// is omitted from the JSON rather than sent as null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    pub question_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_option_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_answer: Option<String>,
}

/// Body of a submit-session call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub answers: Vec<SubmittedAnswer>,
    /// Stable per session so the server can deduplicate retried submits.
    pub idempotency_key: String,
    /// `true` if the candidate pressed submit, `false` for auto-submit on timeout.
    #[serde(default)]
    pub manual: bool,
}

/// Outcome of a successful submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub session_id: String,
    pub status: SessionStatus,
    /// Absent while theory answers are awaiting examiner grading.
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub passed: Option<bool>,
    #[serde(default)]
    pub pending_review: bool,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl SubmissionResult {
    /// Score as a percentage of the maximum, when both are known.
    pub fn percentage(&self) -> Option<f64> {
        match (self.score, self.max_score) {
            (Some(score), Some(max)) if max > 0.0 => Some(score / max * 100.0),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submitted_answer_omits_absent_fields() {
        let choice = SubmittedAnswer {
            question_id: "q1".into(),
            selected_option_id: Some("o2".into()),
            text_answer: None,
        };
        let json = serde_json::to_value(&choice).unwrap();
        assert_eq!(json, serde_json::json!({"question_id": "q1", "selected_option_id": "o2"}));

        let text = SubmittedAnswer {
            question_id: "q2".into(),
            selected_option_id: None,
            text_answer: Some("borrow checker".into()),
        };
        let json = serde_json::to_value(&text).unwrap();
        assert_eq!(json, serde_json::json!({"question_id": "q2", "text_answer": "borrow checker"}));
    }

    #[test]
    fn only_active_sessions_are_open() {
        assert!(SessionStatus::Active.is_open());
        assert!(!SessionStatus::Expired.is_open());
        assert!(!SessionStatus::Graded.is_open());
    }

    #[test]
    fn percentage_requires_both_scores() {
        let mut result = SubmissionResult {
            session_id: "s".into(),
            status: SessionStatus::Graded,
            score: Some(15.0),
            max_score: Some(20.0),
            passed: Some(true),
            pending_review: false,
            submitted_at: None,
        };
        assert_eq!(result.percentage(), Some(75.0));
        result.score = None;
        assert_eq!(result.percentage(), None);
    }
}
