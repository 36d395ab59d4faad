//! Client configuration.

use crate::error::{Error, ErrorKind, Result};
use crate::retry::RetryConfig;
use std::time::Duration;

/// Configuration for the HTTP client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Route calls through the same-origin proxy instead of the backend URL.
    pub use_proxy: bool,
    /// Direct backend URL, e.g. `https://hr.example.com/api/v1`.
    pub api_url: String,
    /// Origin the proxy path is mounted on when `use_proxy` is set.
    pub proxy_origin: String,
    /// Retry configuration for transport timeouts.
    pub retry: RetryConfig,
    /// Request timeout.
    pub timeout: Duration,
    /// Timeout for the refresh-token call.
    pub refresh_timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Pool idle timeout.
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
    /// User-Agent header value.
    pub user_agent: String,
    /// Send and store cookies like a browser with `withCredentials`.
    pub cookie_store: bool,
    /// Accept gzip/deflate responses.
    pub accept_compressed: bool,
    /// Whether to enable request/response tracing.
    pub enable_tracing: bool,
    /// Backend endpoint paths.
    pub endpoints: AuthEndpoints,
    /// User-facing fallback messages.
    pub messages: Messages,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            use_proxy: false,
            api_url: crate::DEFAULT_API_URL.to_string(),
            proxy_origin: "http://localhost:3000".to_string(),
            retry: RetryConfig::default(),
            timeout: Duration::from_secs(30),
            refresh_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            user_agent: crate::USER_AGENT.to_string(),
            cookie_store: true,
            accept_compressed: true,
            enable_tracing: true,
            endpoints: AuthEndpoints::default(),
            messages: Messages::default(),
        }
    }
}

impl ClientConfig {
    /// Create a new client config builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    ///
    /// - `HRMS_USE_PROXY` (`true` to call through the proxy path)
    /// - `HRMS_API_URL` (default: `http://localhost:8000/api/v1`)
    /// - `HRMS_PROXY_ORIGIN` (default: `http://localhost:3000`)
    /// - `HRMS_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        config.use_proxy = std::env::var("HRMS_USE_PROXY")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        if let Ok(url) = std::env::var("HRMS_API_URL") {
            if !url.is_empty() {
                config.api_url = url;
            }
        }

        if let Ok(origin) = std::env::var("HRMS_PROXY_ORIGIN") {
            if !origin.is_empty() {
                config.proxy_origin = origin;
            }
        }

        if let Ok(secs) = std::env::var("HRMS_TIMEOUT_SECS") {
            let secs = secs.parse::<u64>().map_err(|_| {
                Error::new(ErrorKind::Config(format!(
                    "HRMS_TIMEOUT_SECS must be a whole number of seconds, got {secs:?}"
                )))
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Base URL every relative endpoint is joined onto.
    pub fn base_url(&self) -> String {
        if self.use_proxy {
            format!(
                "{}{}",
                self.proxy_origin.trim_end_matches('/'),
                crate::PROXY_PATH
            )
        } else {
            self.direct_url()
        }
    }

    /// Direct backend URL, used by the refresh call regardless of the proxy flag.
    pub fn direct_url(&self) -> String {
        self.api_url.trim_end_matches('/').to_string()
    }

    /// Resolve an endpoint against a base URL.
    ///
    /// Absolute URLs pass through untouched.
    pub fn resolve(base: &str, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if endpoint.starts_with('/') {
            format!("{}{}", base.trim_end_matches('/'), endpoint)
        } else {
            format!("{}/{}", base.trim_end_matches('/'), endpoint)
        }
    }
}

/// Builder for ClientConfig.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the direct backend URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    /// Call through the same-origin proxy mounted on `origin`.
    pub fn with_proxy(mut self, origin: impl Into<String>) -> Self {
        self.config.use_proxy = true;
        self.config.proxy_origin = origin.into();
        self
    }

    /// Set the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Disable timeout retries.
    pub fn without_retry(mut self) -> Self {
        self.config.retry = RetryConfig::no_retry();
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the refresh-call timeout.
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.config.refresh_timeout = timeout;
        self
    }

    /// Set connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set custom User-Agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Enable or disable the cookie store.
    pub fn with_cookie_store(mut self, enabled: bool) -> Self {
        self.config.cookie_store = enabled;
        self
    }

    /// Enable or disable request/response tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.config.enable_tracing = enabled;
        self
    }

    /// Override the endpoint paths.
    pub fn with_endpoints(mut self, endpoints: AuthEndpoints) -> Self {
        self.config.endpoints = endpoints;
        self
    }

    /// Override the fallback messages.
    pub fn with_messages(mut self, messages: Messages) -> Self {
        self.config.messages = messages;
        self
    }

    /// Build the client configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// Backend endpoint paths, relative to the base URL.
///
/// Only the categories matter to the pipeline: login and refresh are exempt
/// from refresh handling, logout is exempt from timeout retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    pub login: String,
    pub logout: String,
    pub refresh_token: String,
    pub me: String,
    pub setup_2fa: String,
    pub verify_2fa_setup: String,
    pub verify_otp: String,
    pub change_password: String,
    pub request_password_reset: String,
    pub verify_password_reset_otp: String,
    pub complete_password_reset: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            logout: "/auth/logout".to_string(),
            refresh_token: "/auth/refresh-token".to_string(),
            me: "/users/me".to_string(),
            setup_2fa: "/auth/setup-2fa".to_string(),
            verify_2fa_setup: "/auth/verify-2fa-setup".to_string(),
            verify_otp: "/auth/verify-otp".to_string(),
            change_password: "/auth/password".to_string(),
            request_password_reset: "/auth/password/reset/request".to_string(),
            verify_password_reset_otp: "/auth/password/reset/verify".to_string(),
            complete_password_reset: "/auth/password/reset/complete".to_string(),
        }
    }
}

impl AuthEndpoints {
    /// The call targets the login endpoint.
    pub fn is_login(&self, url: &str) -> bool {
        url.contains(&self.login)
    }

    /// The call targets the logout endpoint.
    pub fn is_logout(&self, url: &str) -> bool {
        url.contains(&self.logout)
    }

    /// The call targets the refresh endpoint.
    pub fn is_refresh(&self, url: &str) -> bool {
        url.contains(&self.refresh_token)
    }

    /// A 401 from this call is terminal and must never trigger a refresh.
    pub fn is_refresh_exempt(&self, url: &str) -> bool {
        self.is_login(url) || self.is_refresh(url)
    }
}

/// Fallback messages surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Messages {
    /// No response reached the client.
    pub connectivity: String,
    /// Nothing better could be extracted from the failure.
    pub generic: String,
    /// Shown once when the session expires and the user is sent to login.
    pub session_expired: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            connectivity: "Connection error. Please check your network.".to_string(),
            generic: "Something went wrong".to_string(),
            session_expired: "Your session has expired. Please log in again.".to_string(),
        }
    }
}
