//! examdesk-client: talking to the exam service.
//!
//! Implements the `GradingService` trait over HTTP, adds the artifact
//! download and certificate lookup endpoints, and loads client configuration.

pub mod config;
pub mod http;
pub mod mock;

pub use config::{load_config, load_config_from, ExamdeskConfig};
pub use http::{ArtifactKind, CertificateVerification, HttpGradingService};
pub use mock::MockGradingService;
