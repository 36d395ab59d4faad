//! Single-shot HTTP transport.
//!
//! [`HttpClient`] sends exactly one request and returns whatever came back.
//! Non-2xx statuses are not errors at this layer: classification, refresh
//! and retry belong to the pipeline above it.

use tracing::{debug, info, instrument};

use crate::config::ClientConfig;
use crate::envelope::{normalize, CallFailure};
use crate::error::{Error, ErrorKind, Result, TransportCode};
use crate::request::{ApiRequest, RequestBody};
use crate::response::RawResponse;

/// HTTP client for the HRMS backend.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    config: ClientConfig,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent)
            .cookie_store(config.cookie_store)
            .gzip(config.accept_compressed)
            .deflate(config.accept_compressed);

        let inner = builder
            .build()
            .map_err(|e| Error::with_source(ErrorKind::Config(e.to_string()), e))?;

        Ok(Self { inner, config })
    }

    /// Create a new HTTP client with default configuration.
    pub fn default_client() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Base URL relative endpoints resolve against.
    pub fn base_url(&self) -> String {
        self.config.base_url()
    }

    /// Send against the configured base URL.
    pub async fn send(&self, request: &ApiRequest) -> Result<RawResponse> {
        self.send_to(&self.base_url(), request).await
    }

    /// Send against an explicit base URL.
    #[instrument(skip(self, base, request), fields(method = %request.method, endpoint = %request.endpoint))]
    pub async fn send_to(&self, base: &str, request: &ApiRequest) -> Result<RawResponse> {
        let url = self.build_url(base, request)?;
        let mut req = self.inner.request(request.method.to_reqwest(), url);

        if let Some(ref token) = request.bearer_token {
            req = req.bearer_auth(token);
        }

        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req = match &request.body {
            RequestBody::Empty => req,
            RequestBody::Json(value) => req.json(value),
            RequestBody::Multipart(form) => req.multipart(form.to_multipart()?),
        };

        if self.config.enable_tracing {
            debug!(retried = request.retried, retry_count = request.retry_count, "Sending request");
        }

        let response = req.send().await.map_err(|e| self.transport_error(e))?;
        let response = RawResponse::read(response)
            .await
            .map_err(|e| self.body_error(e))?;

        if self.config.enable_tracing {
            let status = response.status();
            let content_length = response.bytes().len();
            if response.is_success() {
                debug!(status, content_length, "Response received");
            } else {
                info!(status, content_length, "Non-success response");
            }
        }

        Ok(response)
    }

    fn build_url(&self, base: &str, request: &ApiRequest) -> Result<url::Url> {
        let mut url = url::Url::parse(&ClientConfig::resolve(base, &request.endpoint))?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &request.query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    /// A failure with no response: keep the transport code, show the
    /// connectivity message.
    fn transport_error(&self, err: reqwest::Error) -> Error {
        let message = normalize(&CallFailure::transport(err.to_string()), &self.config.messages).message;
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
        } else if err.is_builder() {
            ErrorKind::InvalidUrl(err.to_string())
        } else {
            ErrorKind::Connectivity {
                code: TransportCode::Other,
                message,
            }
        };
        Error::with_source(kind, err)
    }

    /// Reading the body timed out or the connection dropped mid-body.
    fn body_error(&self, err: Error) -> Error {
        match err.kind {
            ErrorKind::Timeout { code, .. } => Error {
                kind: ErrorKind::Timeout {
                    code: if code == TransportCode::TimedOut {
                        TransportCode::ConnectionAborted
                    } else {
                        code
                    },
                    message: self.config.messages.connectivity.clone(),
                },
                source: err.source,
            },
            ErrorKind::Connectivity { code, .. } => Error {
                kind: ErrorKind::Connectivity {
                    code,
                    message: self.config.messages.connectivity.clone(),
                },
                source: err.source,
            },
            _ => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::FormData;
    use crate::request::RequestMethod;
    use std::time::Duration;
    use wiremock::matchers::{header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpClient {
        HttpClient::new(
            ClientConfig::builder()
                .with_api_url(server.uri())
                .without_retry()
                .build(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = HttpClient::default_client().unwrap();
        assert_eq!(client.base_url(), crate::DEFAULT_API_URL);
    }

    #[tokio::test]
    async fn test_successful_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/me"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"id": 1},
                "is_success": true,
                "message": "ok"
            })))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);
        let request = ApiRequest::new(RequestMethod::Get, "/users/me").bearer_auth("test-token");
        let response = client.send(&request).await.unwrap();

        assert!(response.is_success());
        assert_eq!(response.body_json().unwrap()["data"]["id"], 1);
    }

    #[tokio::test]
    async fn test_non_success_is_returned_not_raised() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/employees/9"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(serde_json::json!({"message": "Forbidden"})),
            )
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);
        let response = client
            .send(&ApiRequest::new(RequestMethod::Delete, "/employees/9"))
            .await
            .unwrap();

        assert_eq!(response.status(), 403);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_query_pairs_are_appended() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/employees"))
            .and(query_param("page", "2"))
            .and(query_param("search", "jane doe"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);
        let request = ApiRequest::new(RequestMethod::Get, "/employees")
            .query("page", "2")
            .query("search", "jane doe");
        assert!(client.send(&request).await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_multipart_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/documents"))
            .and(header_exists("content-type"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);
        let request = ApiRequest::new(RequestMethod::Post, "/documents")
            .multipart(FormData::new().with("title", "Payslip"));
        let response = client.send(&request).await.unwrap();
        assert_eq!(response.status(), 201);

        let received = &mock_server.received_requests().await.unwrap()[0];
        let content_type = received.headers.get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data"));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timeout_class() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);
        let request =
            ApiRequest::new(RequestMethod::Get, "/slow").timeout(Duration::from_millis(50));
        let err = client.send(&request).await.unwrap_err();

        assert!(err.transport_code().unwrap().is_timeout());
        assert_eq!(err.normalized().message, client.config().messages.connectivity);
    }

    #[tokio::test]
    async fn test_connection_refused_is_connectivity() {
        let client = HttpClient::new(
            ClientConfig::builder()
                .with_api_url("http://127.0.0.1:1/api/v1")
                .build(),
        )
        .unwrap();

        let err = client
            .send(&ApiRequest::new(RequestMethod::Get, "/users/me"))
            .await
            .unwrap_err();

        assert!(matches!(err.kind, ErrorKind::Connectivity { .. }));
        assert!(!err.transport_code().unwrap().is_timeout());
        assert_eq!(err.normalized().message, client.config().messages.connectivity);
    }
}
