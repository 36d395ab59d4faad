//! # hrms-api-auth
//!
//! Session handling for the HRMS backend client.
//!
//! ## Security
//!
//! - Tokens are redacted in Debug output
//! - Tracing spans skip credential parameters
//! - The file-backed session jar is written with owner-only permissions
//!
//! ## What it provides
//!
//! - **Credential store** over a pluggable key-value medium (memory or file)
//! - **Refresh coordination**: one refresh per client, concurrent 401s
//!   queued and replayed in arrival order, an advisory lock shared with
//!   other processes on the same medium
//! - **Request pipeline**: middleware list, timeout retries with backoff,
//!   and a typed request facade
//! - **Auth flows**: login, OTP, 2FA setup, password reset, logout
//!
//! ## Example
//!
//! ```rust,ignore
//! use hrms_api_auth::{ApiClient, AuthService, LoginStep, SessionConfig};
//! use hrms_api_client::{ClientConfig, RequestOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), hrms_api_auth::Error> {
//!     let client = ApiClient::builder(ClientConfig::from_env()?)
//!         .with_session(SessionConfig::from_env()?)
//!         .build()?;
//!     let auth = AuthService::new(client.clone());
//!
//!     if let LoginStep::Authenticated { redirect_to, .. } = auth.login("mai", "secret").await? {
//!         println!("signed in, landing on {redirect_to}");
//!     }
//!
//!     let employees: serde_json::Value = client
//!         .get("/employees", RequestOptions::new().query("page", 1))
//!         .await?;
//!     println!("{employees}");
//!     Ok(())
//! }
//! ```

mod credentials;
mod error;
mod lock;
mod middleware;
mod org_key;
mod pipeline;
mod refresh;
mod service;
mod session;
mod storage;
mod types;

pub use credentials::{
    CredentialStore, TokenKind, ACCESS_TOKEN_KEY, DEFAULT_TOKEN_LIFETIME, LEGACY_TOKEN_KEYS,
    ORG_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_INFO_KEY, USER_ROLE_KEY,
};
pub use error::{AuthFailure, Error, ErrorKind, Result};
pub use lock::{RefreshLock, REFRESH_LOCK_KEY, REFRESH_LOCK_TIMEOUT};
pub use middleware::{BearerToken, OrgKeyHeader, RequestMiddleware};
pub use org_key::OrgKeyCipher;
pub use pipeline::{ApiClient, ApiClientBuilder, DispatchFailure, FailureAction};
pub use refresh::{
    CrossContextPolicy, HttpTokenRefresher, RefreshCoordinator, RefreshDenied, RefreshFailure,
    TokenPair, TokenRefresher,
};
pub use service::{
    AuthCheck, AuthService, ErrorAction, LoginStep, OTP_PATH, PENDING_LIFETIME,
    PENDING_SECRET_KEY, PENDING_USERNAME_KEY, SETUP_2FA_PATH,
};
pub use session::{
    LogNavigator, ManualNavigator, SessionConfig, SessionGuard, SessionNavigator, LOGIN_PATH,
    PUBLIC_PATHS,
};
pub use storage::{default_session_path, FileStore, KeyValueStore, MemoryStore};
pub use types::{
    redirect_path, NamedRef, Permission, RoleRef, SessionUser, UserResponse, UserRole,
};
