//! Cancellable countdown task.
//!
//! Drives [`ExamSessionController::tick`] on a fixed period and reports
//! what happened over a channel. The task stops on its own once the
//! session is closed, and stops deterministically when cancelled or dropped.

use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::controller::{ExamSessionController, TickOutcome};
use crate::error::SessionError;
use crate::model::SubmissionState;
use crate::traits::SubmissionResult;

/// Something the countdown wants the UI to know about.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// One period elapsed.
    Tick { remaining: u64 },
    /// The deadline passed and the answers were submitted.
    AutoSubmitted(SubmissionResult),
    /// An automatic submit failed; the next tick will try again.
    AutoSubmitFailed { attempt: u32, message: String },
    /// Automatic submits are used up. Manual submit is still possible.
    AutoSubmitAbandoned { attempts: u32 },
    /// The service rejected our credentials during an automatic submit.
    AuthenticationExpired,
    /// The session was submitted by someone else (the candidate).
    Closed,
}

/// Handle to a running countdown.
#[derive(Debug)]
pub struct CountdownTask {
    handle: Option<JoinHandle<()>>,
}

impl CountdownTask {
    /// Start counting down using the controller's configured period.
    pub fn spawn(controller: ExamSessionController) -> (Self, UnboundedReceiver<SessionEvent>) {
        let period = Duration::from_millis(controller.config().tick_interval_ms.max(1));
        Self::spawn_with_period(controller, period)
    }

    /// Start counting down with an explicit period.
    pub fn spawn_with_period(
        controller: ExamSessionController,
        period: Duration,
    ) -> (Self, UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(controller, period, tx));
        (
            Self {
                handle: Some(handle),
            },
            rx,
        )
    }

    /// Stop the countdown. No tick or automatic submit runs after this returns.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!("countdown cancelled");
        }
    }

    /// Whether the task has stopped, by itself or through `cancel`.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }
}

impl Drop for CountdownTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run(
    controller: ExamSessionController,
    period: Duration,
    tx: UnboundedSender<SessionEvent>,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let event = match controller.tick().await {
            Ok(TickOutcome::Running(remaining)) => SessionEvent::Tick { remaining },
            Ok(TickOutcome::Submitted(result)) => {
                let _ = tx.send(SessionEvent::AutoSubmitted(result));
                break;
            }
            Ok(TickOutcome::Idle) => {
                if controller.state() == SubmissionState::Submitted {
                    let _ = tx.send(SessionEvent::Closed);
                    break;
                }
                continue;
            }
            Err(SessionError::AutoSubmitExhausted { attempts }) => {
                tracing::error!(attempts, "giving up on automatic submission");
                let _ = tx.send(SessionEvent::AutoSubmitAbandoned { attempts });
                break;
            }
            Err(SessionError::AuthenticationExpired) => {
                let _ = tx.send(SessionEvent::AuthenticationExpired);
                break;
            }
            Err(e) => SessionEvent::AutoSubmitFailed {
                attempt: controller.auto_submit_attempts(),
                message: e.to_string(),
            },
        };

        if tx.send(event).is_err() {
            tracing::debug!("countdown receiver dropped, stopping");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::controller::tests::{controller_for, sample_session, ScriptedService};
    use crate::model::AnswerValue;

    async fn collect_until_stop(rx: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = vec![];
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn auto_submits_after_five_ticks() {
        let service = Arc::new(ScriptedService::new(sample_session()));
        let ctrl = controller_for(service.clone(), 5);
        ctrl.record_answer("A", AnswerValue::Choice("3".into())).unwrap();

        let (_task, mut rx) = CountdownTask::spawn(ctrl.clone());
        let events = collect_until_stop(&mut rx).await;

        let ticks: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Tick { remaining } => Some(*remaining),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![4, 3, 2, 1]);
        assert!(matches!(events.last(), Some(SessionEvent::AutoSubmitted(_))));
        assert_eq!(service.calls(), 1);
        assert_eq!(ctrl.state(), SubmissionState::Submitted);
        assert_eq!(ctrl.submitted_payload().unwrap().answers.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_ticking() {
        let service = Arc::new(ScriptedService::new(sample_session()));
        let ctrl = controller_for(service.clone(), 3);

        let (mut task, mut rx) = CountdownTask::spawn(ctrl.clone());
        assert_eq!(rx.recv().await, Some(SessionEvent::Tick { remaining: 2 }));
        task.cancel();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.recv().await.is_none());
        assert!(task.is_finished());
        assert_eq!(ctrl.remaining_seconds(), 2);
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_task_prevents_auto_submit() {
        let service = Arc::new(ScriptedService::new(sample_session()));
        let ctrl = controller_for(service.clone(), 2);

        let (task, _rx) = CountdownTask::spawn(ctrl.clone());
        drop(task);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(service.calls(), 0);
        assert_eq!(ctrl.state(), SubmissionState::InProgress);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_submit_closes_the_countdown() {
        let service = Arc::new(ScriptedService::new(sample_session()));
        let ctrl = controller_for(service.clone(), 30);

        let (_task, mut rx) = CountdownTask::spawn(ctrl.clone());
        assert_eq!(rx.recv().await, Some(SessionEvent::Tick { remaining: 29 }));
        ctrl.submit(true).await.unwrap();

        let events = collect_until_stop(&mut rx).await;
        assert_eq!(events, vec![SessionEvent::Closed]);
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_auto_submit_retries_on_next_tick() {
        let service = Arc::new(
            ScriptedService::new(sample_session())
                .failing_submits(vec![SessionError::NetworkError("offline".into())]),
        );
        let ctrl = controller_for(service.clone(), 1);

        let (_task, mut rx) = CountdownTask::spawn(ctrl.clone());
        let events = collect_until_stop(&mut rx).await;

        assert!(matches!(
            events.first(),
            Some(SessionEvent::AutoSubmitFailed { attempt: 1, .. })
        ));
        assert!(matches!(events.last(), Some(SessionEvent::AutoSubmitted(_))));
        assert_eq!(service.calls(), 2);
        assert_eq!(ctrl.state(), SubmissionState::Submitted);
    }

    #[tokio::test(start_paused = true)]
    async fn abandons_after_max_attempts() {
        let failures = (0..10)
            .map(|_| SessionError::NetworkError("offline".into()))
            .collect();
        let service = Arc::new(ScriptedService::new(sample_session()).failing_submits(failures));
        let ctrl = controller_for(service.clone(), 1);

        let (task, mut rx) = CountdownTask::spawn(ctrl.clone());
        let events = collect_until_stop(&mut rx).await;

        assert_eq!(
            events.last(),
            Some(&SessionEvent::AutoSubmitAbandoned { attempts: 3 })
        );
        assert_eq!(service.calls(), 3);
        assert_eq!(ctrl.state(), SubmissionState::InProgress);
        assert!(ctrl.is_expired());
        drop(task);
    }
}
