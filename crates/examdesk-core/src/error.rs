//! Session error types.
//!
//! Defined in `examdesk-core` so the controller can downcast transport
//! errors raised by a `GradingService` and classify them without string
//! matching.

use thiserror::Error;

use crate::validation::ValidationError;

/// Errors that can occur while running a timed exam session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The exam service refused to start or resume the session.
    #[error("session unavailable: {0}")]
    SessionUnavailable(String),

    /// The bearer token was rejected; local credentials have been cleared.
    #[error("authentication expired, please log in again")]
    AuthenticationExpired,

    /// Input failed local validation and was never sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The question id is not part of this session.
    #[error("unknown question: {0}")]
    UnknownQuestion(String),

    /// The session has been submitted and is closed.
    #[error("session already submitted")]
    SessionClosed,

    /// The countdown has reached zero; the draft is frozen.
    #[error("time has expired for this session")]
    TimeExpired,

    /// Automatic submission after the deadline failed too many times.
    #[error("automatic submission failed after {attempts} attempts, submit manually to retry")]
    AutoSubmitExhausted { attempts: u32 },

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl SessionError {
    /// Returns `true` if repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Timeout(_) | SessionError::NetworkError(_) => true,
            SessionError::ApiError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns `true` if the current screen cannot continue and the user
    /// should be sent elsewhere.
    pub fn is_fatal_for_screen(&self) -> bool {
        matches!(
            self,
            SessionError::SessionUnavailable(_) | SessionError::AuthenticationExpired
        )
    }

    /// Recover a typed error from an `anyhow::Error` produced by a service
    /// implementation. Errors of unknown origin are treated as network failures.
    pub fn from_service(err: anyhow::Error) -> Self {
        match err.downcast::<SessionError>() {
            Ok(typed) => typed,
            Err(other) => SessionError::NetworkError(format!("{other:#}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(SessionError::Timeout(30).is_retryable());
        assert!(SessionError::NetworkError("reset".into()).is_retryable());
        assert!(SessionError::ApiError {
            status: 503,
            message: "busy".into()
        }
        .is_retryable());
        assert!(!SessionError::ApiError {
            status: 400,
            message: "bad".into()
        }
        .is_retryable());
        assert!(!SessionError::AuthenticationExpired.is_retryable());
        assert!(!SessionError::SessionClosed.is_retryable());
    }

    #[test]
    fn fatal_errors_leave_the_screen() {
        assert!(SessionError::SessionUnavailable("inactive".into()).is_fatal_for_screen());
        assert!(SessionError::AuthenticationExpired.is_fatal_for_screen());
        assert!(!SessionError::Timeout(5).is_fatal_for_screen());
    }

    #[test]
    fn downcast_from_anyhow() {
        let err: anyhow::Error = SessionError::AuthenticationExpired.into();
        assert!(matches!(
            SessionError::from_service(err),
            SessionError::AuthenticationExpired
        ));

        let err = anyhow::anyhow!("connection refused");
        match SessionError::from_service(err) {
            SessionError::NetworkError(msg) => assert!(msg.contains("connection refused")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
