//! The `examdesk status` command.

use std::path::PathBuf;

use anyhow::Result;

use examdesk_client::load_config_from;
use examdesk_core::error::SessionError;
use examdesk_core::traits::GradingService;
use examdesk_core::validation::validate_identifier;

use crate::display;

pub async fn execute(session: String, json: bool, config_path: Option<PathBuf>) -> Result<()> {
    let session_id = validate_identifier("session id", &session)?;
    let config = load_config_from(config_path.as_deref())?;
    let service = config.http_service(config.auth_context())?;

    let snapshot = service
        .get_session(&session_id)
        .await
        .map_err(SessionError::from_service)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        display::print_snapshot(&snapshot);
    }
    Ok(())
}
