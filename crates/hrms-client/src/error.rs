//! Error types for hrms-client.
//!
//! Every kind carries a message that is already normalized for display, so
//! [`Error::normalized`] never has to look at the original response again.

use crate::envelope::NormalizedError;

/// Result type alias for hrms-client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for hrms-client operations.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional source error.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Create a new error with the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// Create a new error with the given kind and source.
    pub fn with_source(
        kind: ErrorKind,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
        }
    }

    /// The transport code, if this failure never produced a response.
    pub fn transport_code(&self) -> Option<TransportCode> {
        match &self.kind {
            ErrorKind::Timeout { code, .. } => Some(*code),
            ErrorKind::Connectivity { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// HTTP status of the failed response, if there was one.
    pub fn status(&self) -> Option<u16> {
        match &self.kind {
            ErrorKind::Backend { status, .. } => Some(*status),
            ErrorKind::AuthExpired { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns true if the session is gone and the caller must re-authenticate.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::AuthExpired { .. } | ErrorKind::RefreshFailed { .. }
        ) || self.status() == Some(401)
    }

    /// Collapse into the uniform failure shape handed to application code.
    pub fn normalized(&self) -> NormalizedError {
        NormalizedError::new(self.kind.message())
    }
}

/// Low-level transport outcome for calls that never got a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCode {
    /// The call was aborted by the client-side timeout.
    ConnectionAborted,
    /// The socket timed out.
    TimedOut,
    /// The connection could not be established.
    ConnectFailed,
    /// Anything else (DNS, TLS, body decoding, redirects).
    Other,
}

impl TransportCode {
    /// Returns true for the timeout class of failures.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportCode::ConnectionAborted | TransportCode::TimedOut)
    }
}

/// The kind of error that occurred.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// No response reached the client.
    #[error("Connection error: {message}")]
    Connectivity { code: TransportCode, message: String },

    /// The call timed out before a response arrived.
    #[error("Request timeout: {message}")]
    Timeout { code: TransportCode, message: String },

    /// Structured application error from the response body.
    #[error("Backend error: {status} {message}")]
    Backend { status: u16, message: String },

    /// Session could not be renewed; the caller must log in again.
    ///
    /// A 401 on a call that was already replayed with a fresh token also
    /// reports this kind, but leaves the stored session and the redirect
    /// guard untouched.
    #[error("Session expired: {message}")]
    AuthExpired { status: Option<u16>, message: String },

    /// The refresh endpoint itself failed.
    #[error("Token refresh failed: {message}")]
    RefreshFailed {
        message: String,
        /// The backend rejected the refresh token (as opposed to a transient failure).
        invalid_credentials: bool,
    },

    /// A `:name` placeholder had no value.
    #[error("Missing value for URL param: {0}")]
    MissingParameter(String),

    /// Timeout retries exhausted.
    #[error("All {attempts} retry attempts exhausted: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl ErrorKind {
    /// The display message without the kind prefix.
    pub fn message(&self) -> String {
        match self {
            ErrorKind::Connectivity { message, .. }
            | ErrorKind::Timeout { message, .. }
            | ErrorKind::Backend { message, .. }
            | ErrorKind::AuthExpired { message, .. }
            | ErrorKind::RefreshFailed { message, .. }
            | ErrorKind::RetriesExhausted { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        let kind = if err.is_timeout() {
            ErrorKind::Timeout {
                code: TransportCode::TimedOut,
                message,
            }
        } else if err.is_connect() {
            ErrorKind::Connectivity {
                code: TransportCode::ConnectFailed,
                message,
            }
        } else if let Some(status) = err.status() {
            ErrorKind::Backend {
                status: status.as_u16(),
                message,
            }
        } else {
            ErrorKind::Connectivity {
                code: TransportCode::Other,
                message,
            }
        };

        Error::with_source(kind, err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::Json(err.to_string()), err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::with_source(ErrorKind::InvalidUrl(err.to_string()), err)
    }
}
