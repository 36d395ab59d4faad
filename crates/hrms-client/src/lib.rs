//! # hrms-api-client
//!
//! Core HTTP client infrastructure for the HRMS backend.
//!
//! This crate provides the transport-level building blocks:
//! - Request model with retry bookkeeping (`retried`, `retry_count`)
//! - Path-parameter, query and multipart body compilation
//! - Retry policy for transport timeouts with exponential backoff
//! - Error normalization over the backend response envelope
//! - A single-shot HTTP transport over `reqwest`
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Application Layer                        │
//! │  (auth service, CRUD screens, CLI)                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │               ApiClient (hrms-api-auth)                     │
//! │  - Middleware list + dispatch loop                          │
//! │  - Refresh coordination on 401, retry on timeouts           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    HttpClient (this crate)                  │
//! │  - One request, one response, no policy                     │
//! │  - Failure classification + normalization helpers           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use hrms_api_client::{ApiRequest, ClientConfig, HttpClient, RequestMethod};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), hrms_api_client::Error> {
//!     let config = ClientConfig::from_env()?;
//!     let http = HttpClient::new(config)?;
//!
//!     let request = ApiRequest::new(RequestMethod::Get, "/users/me");
//!     let response = http.send(&request).await?;
//!     println!("{}", response.status());
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod envelope;
mod error;
mod form;
mod params;
mod request;
mod response;
mod retry;

pub use client::HttpClient;
pub use config::{AuthEndpoints, ClientConfig, ClientConfigBuilder, Messages};
pub use envelope::{
    normalize, sanitize_error_message, ApiResponse, CallFailure, ErrorDetail, FailedResponse,
    NormalizedError, Page, Pagination,
};
pub use error::{Error, ErrorKind, Result, TransportCode};
pub use form::{object_to_form_data, FormData, FormField, FormPart, FormValue};
pub use params::{compile_param_to_url, filter_query_params, ParamValue, PathParams, QueryParams};
pub use request::{ApiRequest, RequestBody, RequestMethod, RequestOptions};
pub use response::RawResponse;
pub use retry::{BackoffStrategy, RetryConfig, RetryPolicy};

/// Default API base URL when none is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

/// Path of the same-origin proxy that forwards to the backend.
pub const PROXY_PATH: &str = "/api/v1";

/// User-Agent string for the client
pub const USER_AGENT: &str = concat!("hrms-api/", env!("CARGO_PKG_VERSION"));

/// Header names the pipeline reads or writes.
pub mod headers {
    /// `Content-Type`
    pub const CONTENT_TYPE: &str = "Content-Type";
    /// `Authorization`
    pub const AUTHORIZATION: &str = "Authorization";
    /// Organization scope, carrying the decrypted org key.
    pub const X_ORGANIZATION_KEY: &str = "X-Organization-Key";
}
