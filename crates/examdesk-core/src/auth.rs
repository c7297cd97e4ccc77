//! Process-wide credential state.
//!
//! One `AuthContext` is created at startup, shared as `Arc<AuthContext>`
//! with every component that talks to the exam service, and torn down on
//! logout or when the service answers 401.

use std::sync::RwLock;

use serde::Deserialize;

/// The signed-in user as reported by the exam service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
}

/// Bearer token plus the user it belongs to.
///
/// Note: Custom Debug impl masks the token to prevent accidental exposure in logs.
#[derive(Clone)]
pub struct Credentials {
    pub token: String,
    pub user: Option<CurrentUser>,
}

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user: None,
        }
    }

    pub fn with_user(mut self, user: CurrentUser) -> Self {
        self.user = Some(user);
        self
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"***")
            .field("user", &self.user)
            .finish()
    }
}

/// Shared holder for the current credentials.
#[derive(Debug, Default)]
pub struct AuthContext {
    credentials: RwLock<Option<Credentials>>,
}

impl AuthContext {
    /// An empty context with no signed-in user.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context initialised with the given credentials.
    pub fn with_credentials(credentials: Credentials) -> Self {
        let ctx = Self::new();
        ctx.init(credentials);
        ctx
    }

    /// Install credentials, replacing any previous ones.
    pub fn init(&self, credentials: Credentials) {
        tracing::debug!(user = ?credentials.user.as_ref().map(|u| &u.id), "auth context initialised");
        *self.write() = Some(credentials);
    }

    /// Clear credentials. Safe to call repeatedly.
    pub fn teardown(&self) {
        if self.write().take().is_some() {
            tracing::info!("credentials cleared");
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    pub fn bearer_token(&self) -> Option<String> {
        self.read().as_ref().map(|c| c.token.clone())
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        self.read().as_ref().and_then(|c| c.user.clone())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<Credentials>> {
        self.credentials
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<Credentials>> {
        self.credentials
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
