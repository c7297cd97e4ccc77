//! The `examdesk whoami` command.

use std::path::PathBuf;

use anyhow::Result;

use examdesk_client::load_config_from;
use examdesk_core::error::SessionError;

pub async fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let auth = config.auth_context();
    if !auth.is_authenticated() {
        return Err(SessionError::AuthenticationExpired.into());
    }
    let service = config.http_service(auth)?;

    let user = service.fetch_current_user().await?;
    println!("{} ({}, id {})", user.name, user.role, user.id);
    Ok(())
}
