//! Backend response envelope and the error normalizer.
//!
//! The backend wraps every payload as
//! `{ data, is_success, message, error? }`, but failures come back in a few
//! different shapes. [`normalize`] collapses all of them, plus transport
//! failures that never produced a response, into one [`NormalizedError`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

use crate::config::Messages;

/// Standard response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
    #[serde(default)]
    pub is_success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

/// The `error` member of a failed envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Text(String),
    Structured {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
}

/// Payload of list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

/// Pagination block of list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl Pagination {
    /// Whether another page follows this one.
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// The single failure shape application code sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedError {
    pub message: String,
    pub data: Option<Value>,
    pub is_success: bool,
}

impl NormalizedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
            is_success: false,
        }
    }
}

impl std::fmt::Display for NormalizedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Response half of a failed call.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedResponse {
    pub status: u16,
    /// Parsed JSON body, `None` when empty or not JSON.
    pub body: Option<Value>,
}

/// A failed call as seen by the normalizer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallFailure {
    /// `None` when nothing came back (network failure, timeout).
    pub response: Option<FailedResponse>,
    /// The transport's own error text.
    pub transport_message: Option<String>,
}

impl CallFailure {
    /// A call that never produced a response.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            response: None,
            transport_message: Some(message.into()),
        }
    }

    /// A call that produced a non-success response.
    pub fn response(status: u16, body: Option<Value>) -> Self {
        Self {
            response: Some(FailedResponse { status, body }),
            transport_message: None,
        }
    }

    /// Attach the transport's own error text.
    pub fn with_transport_message(mut self, message: impl Into<String>) -> Self {
        self.transport_message = Some(message.into());
        self
    }

    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }
}

/// Convert a failed call into a [`NormalizedError`].
///
/// Priority: no response, nested `error.message`, string `error`,
/// top-level `message`, transport text, generic default.
pub fn normalize(failure: &CallFailure, messages: &Messages) -> NormalizedError {
    let Some(response) = &failure.response else {
        return NormalizedError::new(messages.connectivity.clone());
    };

    let Some(body) = &response.body else {
        return NormalizedError::new(messages.generic.clone());
    };

    let message = nested_error_message(body)
        .or_else(|| string_error(body))
        .or_else(|| top_level_message(body))
        .or_else(|| {
            failure
                .transport_message
                .as_deref()
                .filter(|m| !m.is_empty())
        })
        .map(sanitize_error_message)
        .unwrap_or_else(|| messages.generic.clone());

    NormalizedError::new(message)
}

fn nested_error_message(body: &Value) -> Option<&str> {
    body.get("error")?
        .as_object()?
        .get("message")?
        .as_str()
        .filter(|m| !m.is_empty())
}

fn string_error(body: &Value) -> Option<&str> {
    body.get("error")?.as_str().filter(|m| !m.is_empty())
}

fn top_level_message(body: &Value) -> Option<&str> {
    body.get("message")?.as_str().filter(|m| !m.is_empty())
}

static BEARER_PATTERN: LazyLock<regex_lite::Regex> = LazyLock::new(|| {
    regex_lite::Regex::new(r"Bearer\s+[A-Za-z0-9\-_.~+/]+=*").expect("valid bearer pattern")
});

static JWT_PATTERN: LazyLock<regex_lite::Regex> = LazyLock::new(|| {
    regex_lite::Regex::new(r"eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+")
        .expect("valid jwt pattern")
});

/// Sanitize an error message to prevent exposing credentials.
///
/// Bearer headers and JWT-looking strings are redacted; messages longer
/// than 500 characters are truncated.
pub fn sanitize_error_message(message: &str) -> String {
    const MAX_LENGTH: usize = 500;

    let sanitized = BEARER_PATTERN.replace_all(message, "Bearer [REDACTED]");
    let mut sanitized = JWT_PATTERN
        .replace_all(&sanitized, "[REDACTED_TOKEN]")
        .into_owned();

    if sanitized.len() > MAX_LENGTH {
        let mut cut = MAX_LENGTH;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str("...[truncated]");
    }

    sanitized
}
