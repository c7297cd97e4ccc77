//! The `examdesk take` and `examdesk resume` commands.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use examdesk_client::load_config_from;
use examdesk_core::traits::GradingService;
use examdesk_core::validation::{parse_answer_input, validate_identifier};
use examdesk_core::{
    CountdownTask, ExamSessionController, SessionError, SessionEvent, SubmitOutcome,
};

use crate::display;

const HELP: &str = "\
Commands:
  <n> <answer>   answer question n (option number, option id, or text)
  show           list questions and your answers
  time           show the time left
  sync           re-check the time left with the server
  submit         submit your answers
  quit           leave without submitting (resume later)
  help           show this help";

pub async fn execute(exam: String, config_path: Option<PathBuf>) -> Result<()> {
    let exam_id = validate_identifier("exam id", &exam)?;
    let config = load_config_from(config_path.as_deref())?;
    let service: Arc<dyn GradingService> = Arc::new(config.http_service(config.auth_context())?);

    let controller = ExamSessionController::start(service, &exam_id, config.session.clone()).await?;
    run_session(controller).await
}

pub async fn resume(session: String, config_path: Option<PathBuf>) -> Result<()> {
    let session_id = validate_identifier("session id", &session)?;
    let config = load_config_from(config_path.as_deref())?;
    let service: Arc<dyn GradingService> = Arc::new(config.http_service(config.auth_context())?);

    let controller =
        ExamSessionController::resume(service, &session_id, config.session.clone()).await?;
    if !controller.draft().is_empty() {
        println!("Restored {} saved answers.", controller.draft().len());
    }
    run_session(controller).await
}

/// What the input loop should do after handling a line.
enum Flow {
    Continue,
    Done,
}

/// Drive one session: countdown events on one side, typed commands on the other.
async fn run_session(controller: ExamSessionController) -> Result<()> {
    display::print_session(controller.session(), controller.remaining_seconds());
    display::print_questions(controller.session(), &controller.draft());
    println!("{HELP}\n");

    let (mut countdown, mut events) = CountdownTask::spawn(controller.clone());
    let mut lines = spawn_stdin_reader();
    let mut countdown_live = true;

    loop {
        tokio::select! {
            event = events.recv(), if countdown_live => match event {
                Some(event) => {
                    if let Flow::Done = on_event(&controller, event)? {
                        return Ok(());
                    }
                }
                None => countdown_live = false,
            },
            line = lines.recv() => match line.transpose()? {
                Some(line) => {
                    if let Flow::Done = on_input(&controller, line.trim()).await? {
                        countdown.cancel();
                        return Ok(());
                    }
                }
                None => {
                    countdown.cancel();
                    leave(&controller);
                    return Ok(());
                }
            },
        }
    }
}

/// Read stdin lines on a plain thread. A blocked terminal read cannot be
/// cancelled and must not hold up runtime shutdown once the session ends.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn on_event(controller: &ExamSessionController, event: SessionEvent) -> Result<Flow> {
    match event {
        SessionEvent::Tick { remaining } => {
            if remaining > 0 && (remaining % 60 == 0 || remaining <= 10) {
                eprintln!("  {} left", display::format_remaining(remaining));
            }
        }
        SessionEvent::AutoSubmitted(result) => {
            println!("Time is up. Your answers were submitted automatically.");
            display::print_result(&result);
            return Ok(Flow::Done);
        }
        SessionEvent::AutoSubmitFailed { attempt, message } => {
            eprintln!("Automatic submit failed (attempt {attempt}): {message}. Retrying.");
        }
        SessionEvent::AutoSubmitAbandoned { attempts } => {
            eprintln!(
                "Automatic submit failed {attempts} times. Your answers are kept; \
                 type `submit` to try again."
            );
        }
        SessionEvent::AuthenticationExpired => {
            return Err(SessionError::AuthenticationExpired.into());
        }
        SessionEvent::Closed => {
            if let Some(result) = controller.result() {
                display::print_result(&result);
            }
            return Ok(Flow::Done);
        }
    }
    Ok(Flow::Continue)
}

async fn on_input(controller: &ExamSessionController, line: &str) -> Result<Flow> {
    tracing::debug!(input = line, "command");
    match line {
        "" => {}
        "help" | "?" => println!("{HELP}"),
        "show" => display::print_questions(controller.session(), &controller.draft()),
        "time" => println!(
            "Time left: {}",
            display::format_remaining(controller.remaining_seconds())
        ),
        "sync" => match controller.resync().await {
            Ok(remaining) => println!("Time left: {}", display::format_remaining(remaining)),
            Err(SessionError::AuthenticationExpired) => {
                return Err(SessionError::AuthenticationExpired.into())
            }
            Err(e) => eprintln!("Could not reach the server: {e}"),
        },
        "submit" => return submit(controller).await,
        "quit" | "exit" => {
            leave(controller);
            return Ok(Flow::Done);
        }
        _ => answer(controller, line),
    }
    Ok(Flow::Continue)
}

fn answer(controller: &ExamSessionController, line: &str) {
    let (number, raw) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let Some(index) = number.parse::<usize>().ok().filter(|n| *n >= 1) else {
        eprintln!("Unknown command `{line}`. Type `help` for commands.");
        return;
    };
    let Some(question) = controller.session().questions.get(index - 1) else {
        eprintln!(
            "There is no question {index}; this exam has {}.",
            controller.session().questions.len()
        );
        return;
    };

    let value = match parse_answer_input(question, raw) {
        Ok(value) => value,
        Err(e) => {
            eprintln!("Question {index}: {e}");
            return;
        }
    };
    let described = display::describe_answer(question, &value);
    match controller.record_answer(&question.id, value) {
        Ok(Some(_)) => println!("Question {index}: changed to {described}"),
        Ok(None) => println!("Question {index}: {described}"),
        Err(SessionError::TimeExpired) => {
            eprintln!("Time is up; answers can no longer be changed.")
        }
        Err(e) => eprintln!("Question {index}: {e}"),
    }
}

async fn submit(controller: &ExamSessionController) -> Result<Flow> {
    let answered = controller.draft().len();
    let total = controller.session().questions.len();
    if answered < total {
        println!("Submitting {answered} of {total} answers.");
    }

    match controller.submit(true).await {
        Ok(SubmitOutcome::Submitted(result)) => {
            println!("Submitted.");
            display::print_result(&result);
            Ok(Flow::Done)
        }
        Ok(SubmitOutcome::AlreadyInFlight) => {
            println!("A submit is already in progress.");
            Ok(Flow::Continue)
        }
        Ok(SubmitOutcome::AlreadySubmitted) => {
            println!("Already submitted.");
            if let Some(result) = controller.result() {
                display::print_result(&result);
            }
            Ok(Flow::Done)
        }
        Err(e) if e.is_fatal_for_screen() => Err(e.into()),
        Err(e) => {
            eprintln!("Submit failed: {e}. Your answers are kept; type `submit` to try again.");
            Ok(Flow::Continue)
        }
    }
}

fn leave(controller: &ExamSessionController) {
    if controller.state().is_terminal() {
        return;
    }
    tracing::info!(session_id = %controller.session().id, answered = controller.draft().len(), "left session unsubmitted");
    println!(
        "Left session {} without submitting. The exam clock keeps running; \
         rejoin with `examdesk resume --session {}`.",
        controller.session().id,
        controller.session().id
    );
}
