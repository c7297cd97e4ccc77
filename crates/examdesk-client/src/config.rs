//! Client configuration and factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use examdesk_core::auth::{AuthContext, Credentials};
use examdesk_core::ControllerConfig;

use crate::http::HttpGradingService;

/// Connection settings for the exam service. `Debug` masks the token.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the exam service, e.g. `https://exams.example.org/api`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token for the candidate. Usually `${EXAMDESK_TOKEN}`.
    #[serde(default)]
    pub token: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Top-level examdesk configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamdeskConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: ControllerConfig,
    /// Where downloaded certificates, spreadsheets, and backups are saved.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./examdesk-downloads")
}

impl Default for ExamdeskConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            session: ControllerConfig::default(),
            download_dir: default_download_dir(),
        }
    }
}

impl ExamdeskConfig {
    /// Build the shared auth context from the configured token.
    pub fn auth_context(&self) -> Arc<AuthContext> {
        let ctx = AuthContext::new();
        if let Some(token) = self.api.token.as_deref().filter(|t| !t.is_empty()) {
            ctx.init(Credentials::new(token));
        }
        Arc::new(ctx)
    }

    /// Build an HTTP client for the configured service.
    pub fn http_service(&self, auth: Arc<AuthContext>) -> Result<HttpGradingService> {
        HttpGradingService::new(
            &self.api.base_url,
            auth,
            Duration::from_secs(self.api.timeout_secs),
        )
    }
}

/// Replace `${VAR}` references with values from the environment.
///
/// Unset variables become empty strings; an unterminated `${` is left as is.
fn resolve_env_vars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str(&std::env::var(&rest[start + 2..start + 2 + len]).unwrap_or_default());
        rest = &rest[start + 2 + len + 1..];
    }
    out.push_str(rest);
    out
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `examdesk.toml` in the current directory
/// 2. `~/.config/examdesk/config.toml`
///
/// Environment variable overrides: `EXAMDESK_API_URL`, `EXAMDESK_TOKEN`.
pub fn load_config() -> Result<ExamdeskConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ExamdeskConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("examdesk.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ExamdeskConfig::default(),
    };

    // Apply env var overrides
    if let Ok(url) = std::env::var("EXAMDESK_API_URL") {
        config.api.base_url = url;
    }
    if let Ok(token) = std::env::var("EXAMDESK_TOKEN") {
        config.api.token = Some(token);
    }

    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

/// Parse a TOML string and resolve `${VAR}` references.
pub fn parse_config(content: &str) -> Result<ExamdeskConfig> {
    let mut config: ExamdeskConfig = toml::from_str(content)?;
    config.api.base_url = resolve_env_vars(&config.api.base_url);
    config.api.token = config
        .api
        .token
        .as_deref()
        .map(resolve_env_vars)
        .filter(|t| !t.is_empty());
    anyhow::ensure!(
        config.session.tick_interval_ms > 0,
        "session.tick_interval_ms must be positive"
    );
    anyhow::ensure!(config.api.timeout_secs > 0, "api.timeout_secs must be positive");
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("examdesk"))
}
