//! Form input validation.
//!
//! Everything here runs before a network call. A `ValidationError` is shown
//! inline to the user and nothing is sent to the server.

use thiserror::Error;

use crate::model::{AnswerValue, Question, QuestionKind};

/// Longest free-text answer accepted, in characters.
pub const MAX_TEXT_ANSWER_CHARS: usize = 10_000;

/// Longest identifier accepted on the command line.
const MAX_IDENTIFIER_LEN: usize = 128;

/// A rejected piece of user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Turn raw terminal input into an answer for `question`.
///
/// Single choice accepts a 1-based option number or an option id.
/// Free text accepts any non-blank string up to `MAX_TEXT_ANSWER_CHARS`.
pub fn parse_answer_input(question: &Question, raw: &str) -> Result<AnswerValue, ValidationError> {
    let input = raw.trim();
    if input.is_empty() {
        return Err(ValidationError::new("answer", "answer must not be empty"));
    }

    match question.kind {
        QuestionKind::SingleChoice => {
            if let Ok(index) = input.parse::<usize>() {
                if index >= 1 && index <= question.options.len() {
                    return Ok(AnswerValue::Choice(question.options[index - 1].id.clone()));
                }
            }
            if let Some(option) = question.option(input) {
                return Ok(AnswerValue::Choice(option.id.clone()));
            }
            Err(ValidationError::new(
                "answer",
                format!(
                    "choose an option between 1 and {}",
                    question.options.len()
                ),
            ))
        }
        QuestionKind::FreeText => {
            let chars = input.chars().count();
            if chars > MAX_TEXT_ANSWER_CHARS {
                return Err(ValidationError::new(
                    "answer",
                    format!("answer is {chars} characters, the limit is {MAX_TEXT_ANSWER_CHARS}"),
                ));
            }
            Ok(AnswerValue::Text(input.to_string()))
        }
    }
}

/// Check an exam, session, or artifact id supplied by the user.
pub fn validate_identifier(field: &str, raw: &str) -> Result<String, ValidationError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    if id.len() > MAX_IDENTIFIER_LEN {
        return Err(ValidationError::new(field, "is too long"));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::new(
            field,
            "may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(id.to_string())
}

/// Check a certificate verification code such as `CERT-2026-000123`.
///
/// Codes are upper-cased; segments are alphanumeric and separated by dashes.
pub fn validate_certificate_code(raw: &str) -> Result<String, ValidationError> {
    let code = raw.trim().to_ascii_uppercase();
    let segments: Vec<&str> = code.split('-').collect();
    let well_formed = segments.len() >= 2
        && segments
            .iter()
            .all(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()));
    if !well_formed || code.len() > 64 {
        return Err(ValidationError::new(
            "certificate code",
            "expected dash-separated letters and digits, e.g. CERT-2026-000123",
        ));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AnswerOption;

    fn choice_question() -> Question {
        Question {
            id: "q1".into(),
            prompt: "Which keyword declares a constant?".into(),
            kind: QuestionKind::SingleChoice,
            options: vec![
                AnswerOption {
                    id: "opt-let".into(),
                    text: "let".into(),
                },
                AnswerOption {
                    id: "opt-const".into(),
                    text: "const".into(),
                },
            ],
            points: 1,
        }
    }

    fn text_question() -> Question {
        Question {
            id: "q2".into(),
            prompt: "Describe borrowing.".into(),
            kind: QuestionKind::FreeText,
            options: vec![],
            points: 4,
        }
    }

    #[test]
    fn choice_by_index_or_id() {
        let q = choice_question();
        assert_eq!(
            parse_answer_input(&q, "2").unwrap(),
            AnswerValue::Choice("opt-const".into())
        );
        assert_eq!(
            parse_answer_input(&q, " opt-let ").unwrap(),
            AnswerValue::Choice("opt-let".into())
        );
    }

    #[test]
    fn choice_out_of_range_is_rejected() {
        let q = choice_question();
        let err = parse_answer_input(&q, "3").unwrap_err();
        assert_eq!(err.field, "answer");
        assert!(err.message.contains("between 1 and 2"));
        assert!(parse_answer_input(&q, "0").is_err());
    }

    #[test]
    fn text_answers_are_trimmed_and_capped() {
        let q = text_question();
        assert_eq!(
            parse_answer_input(&q, "  a reference  ").unwrap(),
            AnswerValue::Text("a reference".into())
        );
        assert!(parse_answer_input(&q, "   ").is_err());
        let long = "x".repeat(MAX_TEXT_ANSWER_CHARS + 1);
        assert!(parse_answer_input(&q, &long).is_err());
    }

    #[test]
    fn identifiers() {
        assert_eq!(validate_identifier("exam id", " exam_42 ").unwrap(), "exam_42");
        assert!(validate_identifier("exam id", "").is_err());
        assert!(validate_identifier("exam id", "../etc/passwd").is_err());
    }

    #[test]
    fn certificate_codes() {
        assert_eq!(
            validate_certificate_code("cert-2026-000123").unwrap(),
            "CERT-2026-000123"
        );
        assert!(validate_certificate_code("CERT").is_err());
        assert!(validate_certificate_code("CERT--1").is_err());
        assert!(validate_certificate_code("CERT-20 26").is_err());
    }
}
