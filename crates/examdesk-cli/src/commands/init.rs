//! The `examdesk init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("examdesk.toml").exists() {
        println!("examdesk.toml already exists, skipping.");
    } else {
        std::fs::write("examdesk.toml", SAMPLE_CONFIG)?;
        println!("Created examdesk.toml");
    }

    println!("\nNext steps:");
    println!("  1. Set base_url in examdesk.toml to your exam service");
    println!("  2. Export EXAMDESK_TOKEN with your login token");
    println!("  3. Run: examdesk whoami");
    println!("  4. Run: examdesk take --exam <exam-id>");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# examdesk configuration

download_dir = "./examdesk-downloads"

[api]
base_url = "http://localhost:8000/api"
token = "${EXAMDESK_TOKEN}"
timeout_secs = 30

[session]
# How often the countdown ticks, in milliseconds.
tick_interval_ms = 1000
# Automatic submits to try after time runs out before giving up.
max_auto_submit_attempts = 3
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_parses() {
        let config = examdesk_client::config::parse_config(SAMPLE_CONFIG).unwrap();
        assert_eq!(config.session.max_auto_submit_attempts, 3);
        assert_eq!(config.api.timeout_secs, 30);
    }
}
