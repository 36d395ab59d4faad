//! Session expiry handling and session-level configuration.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use crate::credentials::DEFAULT_TOKEN_LIFETIME;
use crate::error::{Error, ErrorKind, Result};
use crate::lock::{REFRESH_LOCK_KEY, REFRESH_LOCK_TIMEOUT};
use crate::refresh::CrossContextPolicy;

/// Pages reachable without a session. Expiry never redirects away from them.
pub const PUBLIC_PATHS: [&str; 6] = [
    "/login",
    "/forgot-password",
    "/reset-password",
    "/setup-2fa",
    "/verify-otp",
    "/login/otp",
];

/// Path of the login surface.
pub const LOGIN_PATH: &str = "/login";

/// Hook into whatever surface the user is looking at.
pub trait SessionNavigator: Send + Sync {
    /// Current location, `None` when there is no notion of one.
    fn current_path(&self) -> Option<String>;

    /// Send the user to the login surface.
    fn redirect_to_login(&self);

    /// Show a one-off notice.
    fn notify(&self, message: &str);
}

/// Navigator for headless use: logs instead of navigating.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl SessionNavigator for LogNavigator {
    fn current_path(&self) -> Option<String> {
        None
    }

    fn redirect_to_login(&self) {
        info!(path = LOGIN_PATH, "Session ended, login required");
    }

    fn notify(&self, message: &str) {
        warn!(message, "Session notice");
    }
}

/// Navigator with an explicit current path that records what it was asked
/// to do. Redirecting moves it to `/login`.
#[derive(Debug)]
pub struct ManualNavigator {
    path: Mutex<String>,
    redirects: AtomicUsize,
    notices: Mutex<Vec<String>>,
}

impl ManualNavigator {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Mutex::new(path.into()),
            redirects: AtomicUsize::new(0),
            notices: Mutex::new(Vec::new()),
        }
    }

    pub fn set_path(&self, path: impl Into<String>) {
        if let Ok(mut current) = self.path.lock() {
            *current = path.into();
        }
    }

    /// Number of login redirects so far.
    pub fn redirect_count(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

impl SessionNavigator for ManualNavigator {
    fn current_path(&self) -> Option<String> {
        self.path.lock().ok().map(|p| p.clone())
    }

    fn redirect_to_login(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
        self.set_path(LOGIN_PATH);
    }

    fn notify(&self, message: &str) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(message.to_string());
        }
    }
}

/// Fires the "session expired" redirect at most once.
pub struct SessionGuard {
    navigator: Arc<dyn SessionNavigator>,
    redirecting: AtomicBool,
    public_paths: Vec<String>,
    message: String,
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("redirecting", &self.is_redirecting())
            .field("public_paths", &self.public_paths)
            .finish()
    }
}

impl SessionGuard {
    pub fn new(
        navigator: Arc<dyn SessionNavigator>,
        public_paths: Vec<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            navigator,
            redirecting: AtomicBool::new(false),
            public_paths,
            message: message.into(),
        }
    }

    pub fn navigator(&self) -> &Arc<dyn SessionNavigator> {
        &self.navigator
    }

    /// The redirect already fired.
    pub fn is_redirecting(&self) -> bool {
        self.redirecting.load(Ordering::SeqCst)
    }

    /// The navigator is on a page reachable without a session.
    pub fn is_public_page(&self) -> bool {
        self.navigator
            .current_path()
            .map(|path| self.public_paths.iter().any(|p| path.starts_with(p.as_str())))
            .unwrap_or(false)
    }

    /// Notify and redirect to login unless already done or on a public page.
    /// Returns true if this call fired the redirect.
    pub fn expire(&self) -> bool {
        if self.is_public_page() {
            return false;
        }
        if self
            .redirecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        self.navigator.notify(&self.message);
        self.navigator.redirect_to_login();
        true
    }

    /// Re-arm after a fresh login.
    pub fn reset(&self) {
        self.redirecting.store(false, Ordering::SeqCst);
    }
}

/// Session-level settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Lifetime written with every stored token.
    pub token_lifetime: Duration,
    /// Storage key of the cross-context refresh lock.
    pub lock_key: String,
    /// Age after which the lock is stale.
    pub lock_timeout: Duration,
    /// What to do when another context holds the lock.
    pub cross_context: CrossContextPolicy,
    /// Pages that never trigger the expiry redirect.
    pub public_paths: Vec<String>,
    /// Secret for decrypting the stored org key.
    pub org_secret: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
            lock_key: REFRESH_LOCK_KEY.to_string(),
            lock_timeout: REFRESH_LOCK_TIMEOUT,
            cross_context: CrossContextPolicy::default(),
            public_paths: PUBLIC_PATHS.iter().map(|p| p.to_string()).collect(),
            org_secret: None,
        }
    }
}

impl SessionConfig {
    /// Load configuration from environment variables.
    ///
    /// - `HRMS_ORG_SECRET` (secret for the org key)
    /// - `HRMS_TOKEN_LIFETIME_SECS` (default: 23400)
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(secret) = std::env::var("HRMS_ORG_SECRET") {
            if !secret.is_empty() {
                config.org_secret = Some(secret);
            }
        }

        if let Ok(secs) = std::env::var("HRMS_TOKEN_LIFETIME_SECS") {
            let secs = secs.parse::<u64>().map_err(|_| {
                Error::new(ErrorKind::Config(format!(
                    "HRMS_TOKEN_LIFETIME_SECS must be a whole number of seconds, got {secs:?}"
                )))
            })?;
            config.token_lifetime = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn with_cross_context(mut self, policy: CrossContextPolicy) -> Self {
        self.cross_context = policy;
        self
    }

    pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_org_secret(mut self, secret: impl Into<String>) -> Self {
        self.org_secret = Some(secret.into());
        self
    }
}
