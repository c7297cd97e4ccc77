//! examdesk-core: exam session model, controller, and service traits.
//!
//! This crate defines the data model, the error taxonomy, and the timed
//! exam session state machine that the HTTP client and the CLI build on.

pub mod auth;
pub mod controller;
pub mod countdown;
pub mod error;
pub mod model;
pub mod traits;
pub mod validation;

pub use controller::{ControllerConfig, ExamSessionController, SubmitOutcome, TickOutcome};
pub use countdown::{CountdownTask, SessionEvent};
pub use error::SessionError;
