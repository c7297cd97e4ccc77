//! Core data model types for examdesk.
//!
//! These are the types the controller, the HTTP client, and the CLI share
//! to represent an exam attempt, its questions, and the candidate's draft
//! answers.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::traits::SubmittedAnswer;

/// A single question within an exam session. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Unique identifier for this question.
    pub id: String,
    /// Prompt text shown to the candidate.
    pub prompt: String,
    /// Whether the question is answered by choosing an option or by writing text.
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    /// Selectable options (single-choice questions only).
    #[serde(default)]
    pub options: Vec<AnswerOption>,
    /// Point value awarded for a correct answer.
    #[serde(default = "default_points")]
    pub points: u32,
}

fn default_points() -> u32 {
    1
}

impl Question {
    /// Look up one of this question's options by id.
    pub fn option(&self, option_id: &str) -> Option<&AnswerOption> {
        self.options.iter().find(|o| o.id == option_id)
    }
}

/// A selectable option on a single-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: String,
    pub text: String,
}

/// Question types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    FreeText,
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionKind::SingleChoice => write!(f, "single choice"),
            QuestionKind::FreeText => write!(f, "free text"),
        }
    }
}

/// One candidate's attempt at one exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamSession {
    /// Session identifier issued by the exam service.
    pub id: String,
    /// The exam this session is an attempt at.
    pub exam_id: String,
    /// Human-readable exam title.
    #[serde(default)]
    pub title: String,
    /// Questions in presentation order.
    #[serde(default)]
    pub questions: Vec<Question>,
    /// When the attempt started, according to the server.
    pub started_at: DateTime<Utc>,
    /// Allotted time in minutes.
    pub duration_minutes: u32,
}

impl ExamSession {
    /// Look up a question by id.
    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    /// Sum of all question point values.
    pub fn max_score(&self) -> u32 {
        self.questions.iter().map(|q| q.points).sum()
    }

    /// The instant the allotted time runs out.
    pub fn deadline(&self) -> DateTime<Utc> {
        self.started_at + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Seconds left before [`deadline`](Self::deadline), floored at zero.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> u64 {
        (self.deadline() - now).num_seconds().max(0) as u64
    }
}

/// A candidate's answer to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    /// Selected option id for a single-choice question.
    Choice(String),
    /// Written answer for a free-text question.
    Text(String),
}

impl AnswerValue {
    fn to_wire(&self, question_id: &str) -> SubmittedAnswer {
        match self {
            AnswerValue::Choice(option_id) => SubmittedAnswer {
                question_id: question_id.to_string(),
                selected_option_id: Some(option_id.clone()),
                text_answer: None,
            },
            AnswerValue::Text(text) => SubmittedAnswer {
                question_id: question_id.to_string(),
                selected_option_id: None,
                text_answer: Some(text.clone()),
            },
        }
    }
}

/// Answers held in client memory before submission, keyed by question id.
///
/// The draft itself does not know which questions exist; the controller
/// checks question ids before recording.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerDraft {
    answers: HashMap<String, AnswerValue>,
}

impl AnswerDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or overwrite the answer for a question. Returns the previous value.
    pub fn record(&mut self, question_id: &str, value: AnswerValue) -> Option<AnswerValue> {
        self.answers.insert(question_id.to_string(), value)
    }

    pub fn get(&self, question_id: &str) -> Option<&AnswerValue> {
        self.answers.get(question_id)
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Whether the candidate has answered the given question.
    pub fn is_answered(&self, question_id: &str) -> bool {
        self.answers.contains_key(question_id)
    }

    /// Build the submission payload: one entry per answered question, in
    /// question order. Unanswered questions are omitted.
    pub fn to_wire(&self, questions: &[Question]) -> Vec<SubmittedAnswer> {
        questions
            .iter()
            .filter_map(|q| self.answers.get(&q.id).map(|a| a.to_wire(&q.id)))
            .collect()
    }
}

/// Where a session is in its submission lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionState {
    NotStarted,
    InProgress,
    Submitting,
    Submitted,
}

impl SubmissionState {
    /// `Submitted` is the only terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionState::Submitted)
    }
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionState::NotStarted => write!(f, "not-started"),
            SubmissionState::InProgress => write!(f, "in-progress"),
            SubmissionState::Submitting => write!(f, "submitting"),
            SubmissionState::Submitted => write!(f, "submitted"),
        }
    }
}
