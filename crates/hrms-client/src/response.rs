//! Buffered HTTP response.
//!
//! The body is read eagerly so the pipeline can both classify a failure and
//! hand the same response to the caller without consuming it twice.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;

use crate::envelope::CallFailure;
use crate::error::Result;

/// Status, headers and body of a completed call.
#[derive(Debug, Clone)]
pub struct RawResponse {
    status: u16,
    headers: HeaderMap,
    body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Read a `reqwest` response to completion.
    pub(crate) async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(Self::new(status, headers, body))
    }

    /// Get the HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns true if the response status is successful (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Get a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get the Content-Type header.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// `(name, value)` pairs from every `Set-Cookie` header.
    pub fn set_cookies(&self) -> Vec<(String, String)> {
        self.headers
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|cookie| {
                let pair = cookie.split(';').next()?;
                let (name, value) = pair.split_once('=')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect()
    }

    /// Value of the cookie `name` set by this response, if any.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.set_cookies()
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .filter(|v| !v.is_empty())
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Get the response body as text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the response body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// The body as untyped JSON, `None` when empty or not JSON.
    pub fn body_json(&self) -> Option<serde_json::Value> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        serde_json::from_slice(&self.body).ok()
    }

    /// View this response as a failed call for the normalizer.
    pub fn to_failure(&self) -> CallFailure {
        CallFailure::response(self.status, self.body_json()).with_transport_message(format!(
            "Request failed with status code {}",
            self.status
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, SET_COOKIE};

    fn response(status: u16, body: &str) -> RawResponse {
        RawResponse::new(status, HeaderMap::new(), Bytes::from(body.to_string()))
    }

    #[test]
    fn test_success_range() {
        assert!(response(200, "").is_success());
        assert!(response(204, "").is_success());
        assert!(!response(401, "").is_success());
        assert!(!response(500, "").is_success());
    }

    #[test]
    fn test_body_json() {
        let resp = response(400, r#"{"message": "Y"}"#);
        assert_eq!(resp.body_json().unwrap()["message"], "Y");
        assert!(response(500, "").body_json().is_none());
        assert!(response(502, "<html>Bad Gateway</html>").body_json().is_none());
    }

    #[test]
    fn test_to_failure() {
        let failure = response(404, r#"{"message": "Employee not found"}"#).to_failure();
        assert_eq!(failure.status(), Some(404));
        assert!(failure.transport_message.unwrap().contains("404"));
    }

    #[test]
    fn test_set_cookies() {
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("rcycles_token=abc; Path=/; HttpOnly"),
        );
        headers.append(SET_COOKIE, HeaderValue::from_static("rcycles_refresh=def"));
        headers.append(SET_COOKIE, HeaderValue::from_static("empty=; Max-Age=0"));
        let resp = RawResponse::new(200, headers, Bytes::new());

        assert_eq!(resp.set_cookies().len(), 3);
        assert_eq!(resp.cookie("rcycles_token").as_deref(), Some("abc"));
        assert_eq!(resp.cookie("rcycles_refresh").as_deref(), Some("def"));
        assert_eq!(resp.cookie("empty"), None);
        assert_eq!(resp.cookie("missing"), None);
    }
}
