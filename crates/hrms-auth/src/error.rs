//! Error types for hrms-auth.
//!
//! Error messages never include token values.

use hrms_api_client::NormalizedError;

/// Result type alias for hrms-auth operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for hrms-auth operations.
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

    /// The client error underneath, if this came from a call.
    pub fn client_error(&self) -> Option<&hrms_api_client::Error> {
        match &self.kind {
            ErrorKind::Client(err) => Some(err),
            _ => None,
        }
    }

    /// Returns true if the caller must log in again.
    pub fn is_auth_error(&self) -> bool {
        match &self.kind {
            ErrorKind::Client(err) => err.is_auth_error(),
            ErrorKind::Auth(failure) => failure.session_expired,
            _ => false,
        }
    }

    /// Collapse into the uniform failure shape handed to application code.
    pub fn normalized(&self) -> NormalizedError {
        match &self.kind {
            ErrorKind::Client(err) => err.normalized(),
            ErrorKind::Auth(failure) => NormalizedError::new(failure.message.clone()),
            other => NormalizedError::new(other.to_string()),
        }
    }
}

/// A failed auth flow, shaped for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    /// Short title of the failed operation.
    pub name: String,
    /// What went wrong.
    pub message: String,
    /// The pending login state is gone; the user must start over.
    pub session_expired: bool,
}

impl AuthFailure {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            session_expired: false,
        }
    }

    pub fn session_expired(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_expired: true,
            ..Self::new(name, message)
        }
    }
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// The kind of error that occurred.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// A call through the pipeline failed.
    #[error(transparent)]
    Client(hrms_api_client::Error),

    /// An auth flow failed.
    #[error("{0}")]
    Auth(AuthFailure),

    /// Storage medium failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Org key could not be encrypted or decrypted.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl From<hrms_api_client::Error> for Error {
    fn from(err: hrms_api_client::Error) -> Self {
        Error::new(ErrorKind::Client(err))
    }
}

impl From<AuthFailure> for Error {
    fn from(failure: AuthFailure) -> Self {
        Error::new(ErrorKind::Auth(failure))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::with_source(ErrorKind::Io(err.to_string()), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::Json(err.to_string()), err)
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::with_source(ErrorKind::Crypto(err.to_string()), err)
    }
}
