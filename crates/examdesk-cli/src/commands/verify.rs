//! The `examdesk verify` command.

use std::path::PathBuf;

use anyhow::Result;

use examdesk_client::load_config_from;
use examdesk_core::validation::validate_certificate_code;

use crate::display;

pub async fn execute(code: String, config_path: Option<PathBuf>) -> Result<()> {
    let code = validate_certificate_code(&code)?;
    let config = load_config_from(config_path.as_deref())?;
    // Verification is public; a missing token is fine.
    let service = config.http_service(config.auth_context())?;

    let verification = service.verify_certificate(&code).await?;
    display::print_verification(&code, &verification);
    if !verification.valid {
        anyhow::bail!("certificate {code} could not be verified");
    }
    Ok(())
}
