//! The `examdesk download` command.

use std::path::PathBuf;

use anyhow::Result;

use examdesk_client::{load_config_from, ArtifactKind};
use examdesk_core::validation::validate_identifier;

pub async fn execute(
    kind: ArtifactKind,
    id: String,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let id = validate_identifier("id", &id)?;
    let config = load_config_from(config_path.as_deref())?;
    let service = config.http_service(config.auth_context())?;

    let dest = output.unwrap_or_else(|| config.download_dir.clone());
    let saved = service.download(kind, &id, &dest).await?;
    println!("Saved {kind} to {}", saved.display());
    Ok(())
}
