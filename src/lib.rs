//! # hrms-api
//!
//! Authenticated HTTP client for the HRMS management backend.
//!
//! Calls go through one pipeline that attaches credentials, renews an
//! expired access token once for every call that hit the 401, retries
//! transport timeouts with backoff, and collapses every failure into one
//! normalized error shape.
//!
//! ## Security
//!
//! - Tokens are redacted in Debug output
//! - Tracing spans skip credential parameters
//! - Error messages pass through a token sanitizer
//!
//! ## Crates
//!
//! - **hrms-api-client** - Transport, request model, retry policy, error normalization
//! - **hrms-api-auth** - Credential storage, refresh coordination, request pipeline, auth flows
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hrms_api::{ApiClient, AuthService, ClientConfig, RequestOptions, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ApiClient::builder(ClientConfig::from_env()?)
//!         .with_session(SessionConfig::from_env()?)
//!         .build()?;
//!
//!     let auth = AuthService::new(client.clone());
//!     let step = auth.login("mai", "secret").await?;
//!     println!("next: {}", step.redirect_to());
//!
//!     let leave: serde_json::Value = client
//!         .get("/leave-requests/:id", RequestOptions::new().path_param("id", 7))
//!         .await?;
//!     println!("{leave}");
//!     Ok(())
//! }
//! ```

// Re-export all crates for convenient access
#[cfg(feature = "auth")]
pub use hrms_api_auth as auth;
#[cfg(feature = "client")]
pub use hrms_api_client as client;

// Re-export commonly used types at the top level
#[cfg(feature = "auth")]
pub use hrms_api_auth::{
    ApiClient, AuthService, CredentialStore, FileStore, LoginStep, MemoryStore, SessionConfig,
};
#[cfg(feature = "client")]
pub use hrms_api_client::{ClientConfig, NormalizedError, RequestMethod, RequestOptions};
