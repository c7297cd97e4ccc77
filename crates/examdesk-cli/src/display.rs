//! Terminal rendering shared by the commands.

use chrono::Local;
use comfy_table::{Cell, Table};

use examdesk_client::CertificateVerification;
use examdesk_core::model::{AnswerDraft, AnswerValue, ExamSession, Question, QuestionKind};
use examdesk_core::traits::{SessionSnapshot, SubmissionResult};

/// `mm:ss`, or `h:mm:ss` past the hour.
pub fn format_remaining(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

pub fn print_session(session: &ExamSession, remaining: u64) {
    println!("{} ({} questions, {} points)", session.title, session.questions.len(), session.max_score());
    println!("Session {} | time left {}", session.id, format_remaining(remaining));
    println!();
}

/// Questions with their options and the candidate's current answers.
pub fn print_questions(session: &ExamSession, draft: &AnswerDraft) {
    for (index, question) in session.questions.iter().enumerate() {
        let marker = if draft.is_answered(&question.id) { "x" } else { " " };
        println!("[{marker}] {}. {} ({} pt)", index + 1, question.prompt, question.points);
        match question.kind {
            QuestionKind::SingleChoice => {
                for (n, option) in question.options.iter().enumerate() {
                    println!("      {}) {}", n + 1, option.text);
                }
            }
            QuestionKind::FreeText => println!("      (free text)"),
        }
        if let Some(value) = draft.get(&question.id) {
            println!("      answer: {}", describe_answer(question, value));
        }
    }
    println!();
}

pub fn describe_answer(question: &Question, value: &AnswerValue) -> String {
    match value {
        AnswerValue::Choice(option_id) => match question.option(option_id) {
            Some(option) => option.text.clone(),
            None => option_id.clone(),
        },
        AnswerValue::Text(text) => text.clone(),
    }
}

pub fn print_result(result: &SubmissionResult) {
    let mut table = Table::new();
    table.set_header(vec!["Session", "Status", "Score", "Result", "Submitted"]);

    let score = match (result.score, result.max_score, result.percentage()) {
        (Some(score), Some(max), Some(pct)) => format!("{score}/{max} ({pct:.1}%)"),
        (Some(score), _, _) => format!("{score}"),
        (None, Some(max), _) if result.pending_review => format!("pending / {max}"),
        _ => "-".to_string(),
    };
    let verdict = match result.passed {
        Some(true) => "passed",
        Some(false) => "failed",
        None if result.pending_review => "awaiting review",
        None => "-",
    };

    table.add_row(vec![
        Cell::new(&result.session_id),
        Cell::new(result.status),
        Cell::new(score),
        Cell::new(verdict),
        Cell::new(
            result
                .submitted_at
                .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string()),
        ),
    ]);
    println!("{table}");
}

pub fn print_snapshot(snapshot: &SessionSnapshot) {
    let mut table = Table::new();
    table.set_header(vec!["Session", "Exam", "Status", "Time left", "Saved answers"]);
    let remaining = snapshot
        .remaining_seconds
        .map(format_remaining)
        .unwrap_or_else(|| "-".to_string());
    table.add_row(vec![
        Cell::new(&snapshot.session.id),
        Cell::new(&snapshot.session.title),
        Cell::new(snapshot.status),
        Cell::new(remaining),
        Cell::new(format!(
            "{}/{}",
            snapshot.saved_answers.len(),
            snapshot.session.questions.len()
        )),
    ]);
    println!("{table}");
}

pub fn print_verification(code: &str, verification: &CertificateVerification) {
    if !verification.valid {
        println!("Certificate {code} is NOT valid.");
        return;
    }
    let mut table = Table::new();
    table.set_header(vec!["Certificate", "Candidate", "Exam", "Issued"]);
    table.add_row(vec![
        Cell::new(verification.certificate_number.as_deref().unwrap_or(code)),
        Cell::new(verification.candidate_name.as_deref().unwrap_or("-")),
        Cell::new(verification.exam_title.as_deref().unwrap_or("-")),
        Cell::new(
            verification
                .issued_at
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".to_string()),
        ),
    ]);
    println!("Certificate {code} is valid.");
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_formats() {
        assert_eq!(format_remaining(0), "00:00");
        assert_eq!(format_remaining(65), "01:05");
        assert_eq!(format_remaining(3600 + 61), "1:01:01");
    }
}
