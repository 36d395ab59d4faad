//! Request pipeline and typed request facade.
//!
//! One dispatch loop: run the middleware list, send, and on failure classify
//! into refresh (401), retry (timeout) or fail (everything else). Replays and
//! retries go around the same loop, so middleware sees every attempt.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use hrms_api_client::{
    normalize, ApiRequest, ClientConfig, Error as ClientError, ErrorKind as ClientErrorKind,
    FormData, HttpClient, RawResponse, RequestBody, RequestMethod, RequestOptions,
    Result as ClientResult, RetryPolicy,
};

use crate::credentials::{CredentialStore, TokenKind, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::error::Result;
use crate::lock::RefreshLock;
use crate::middleware::{BearerToken, OrgKeyHeader, RequestMiddleware};
use crate::org_key::OrgKeyCipher;
use crate::refresh::{HttpTokenRefresher, RefreshCoordinator, RefreshDenied, TokenRefresher};
use crate::session::{LogNavigator, SessionConfig, SessionGuard, SessionNavigator};
use crate::storage::{KeyValueStore, MemoryStore};

/// A dispatch that did not produce a 2xx.
#[derive(Debug)]
pub enum DispatchFailure {
    /// The backend answered with a non-success status.
    Response(RawResponse),
    /// Nothing came back.
    Transport(ClientError),
}

impl DispatchFailure {
    pub fn status(&self) -> Option<u16> {
        match self {
            DispatchFailure::Response(response) => Some(response.status()),
            DispatchFailure::Transport(_) => None,
        }
    }

    /// The transport error, when nothing came back.
    pub fn transport_error(&self) -> Option<&ClientError> {
        match self {
            DispatchFailure::Transport(err) => Some(err),
            DispatchFailure::Response(_) => None,
        }
    }
}

/// What the inbound stage does with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Hand to the refresh coordinator and replay.
    Refresh,
    /// Back off and re-dispatch.
    Retry,
    /// Normalize and return to the caller.
    Fail,
}

/// HTTP client with session handling for the HRMS backend.
#[derive(Clone)]
pub struct ApiClient {
    http: HttpClient,
    credentials: CredentialStore,
    coordinator: Arc<RefreshCoordinator>,
    middleware: Vec<Arc<dyn RequestMiddleware>>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.http.base_url())
            .field(
                "middleware",
                &self.middleware.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

impl ApiClient {
    /// Client with an in-memory session and default settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder::new(config)
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn config(&self) -> &ClientConfig {
        self.http.config()
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn guard(&self) -> &Arc<SessionGuard> {
        self.coordinator.guard()
    }

    /// Decide what to do with a failed dispatch.
    pub fn classify(&self, request: &ApiRequest, failure: &DispatchFailure) -> FailureAction {
        let endpoints = &self.config().endpoints;
        if failure.status() == Some(401) {
            if endpoints.is_refresh_exempt(&request.endpoint) {
                return FailureAction::Fail;
            }
            return FailureAction::Refresh;
        }
        let retryable = failure
            .transport_error()
            .map(|err| self.retry.should_retry(err))
            .unwrap_or(false);
        if retryable {
            if endpoints.is_logout(&request.endpoint) {
                return FailureAction::Fail;
            }
            return FailureAction::Retry;
        }
        FailureAction::Fail
    }

    /// Run a request through the pipeline.
    #[instrument(skip(self, request), fields(method = %request.method, endpoint = %request.endpoint))]
    pub async fn execute(&self, mut request: ApiRequest) -> ClientResult<RawResponse> {
        loop {
            for middleware in &self.middleware {
                middleware.on_request(&mut request);
            }

            let failure = match self.http.send(&request).await {
                Ok(response) if response.is_success() => {
                    self.capture_cookies(&response);
                    return Ok(response);
                }
                Ok(response) => DispatchFailure::Response(response),
                Err(err) => DispatchFailure::Transport(err),
            };

            match self.classify(&request, &failure) {
                FailureAction::Refresh => match self.coordinator.obtain_token(&request).await {
                    Ok(token) => {
                        info!("Replaying request with refreshed token");
                        request.retried = true;
                        request.bearer_token = Some(token);
                    }
                    Err(denied) => return Err(self.denied_error(denied, failure)),
                },
                FailureAction::Retry => match self.retry.next_delay(request.retry_count) {
                    Some(delay) => {
                        warn!(
                            retry = request.retry_count + 1,
                            max_retries = self.retry.max_retries(),
                            delay_ms = delay.as_millis() as u64,
                            "Request timed out, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        request.retry_count += 1;
                    }
                    None => {
                        let message = self.failure_error(failure).kind.message();
                        return Err(ClientError::new(ClientErrorKind::RetriesExhausted {
                            attempts: request.retry_count,
                            message,
                        }));
                    }
                },
                FailureAction::Fail => {
                    log_failure(&failure);
                    return Err(self.failure_error(failure));
                }
            }
        }
    }

    /// Store tokens the backend set as cookies.
    fn capture_cookies(&self, response: &RawResponse) {
        if let Some(access) = response.cookie(ACCESS_TOKEN_KEY) {
            self.credentials.set(TokenKind::Access, &access);
        }
        if let Some(refresh) = response.cookie(REFRESH_TOKEN_KEY) {
            self.credentials.set(TokenKind::Refresh, &refresh);
        }
    }

    fn failure_error(&self, failure: DispatchFailure) -> ClientError {
        match failure {
            DispatchFailure::Transport(err) => err,
            DispatchFailure::Response(response) => {
                let message = normalize(&response.to_failure(), &self.config().messages).message;
                ClientError::new(ClientErrorKind::Backend {
                    status: response.status(),
                    message,
                })
            }
        }
    }

    fn denied_error(&self, denied: RefreshDenied, failure: DispatchFailure) -> ClientError {
        match denied {
            RefreshDenied::Queued(f) => f.into_error(),
            RefreshDenied::Failed(f) if !f.invalid_credentials => f.into_error(),
            _ => {
                let status = failure.status();
                let message = self.failure_error(failure).kind.message();
                ClientError::new(ClientErrorKind::AuthExpired { status, message })
            }
        }
    }

    /// Compile and send a facade call, decoding the body into `T`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: RequestMethod,
        endpoint: &str,
        data: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> ClientResult<T> {
        let request = ApiRequest::compile(method, endpoint, data, options)?;
        decode(self.execute(request).await?)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> ClientResult<T> {
        self.request(RequestMethod::Get, endpoint, None, options).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        options: RequestOptions,
    ) -> ClientResult<T> {
        let data = serde_json::to_value(body)?;
        self.request(RequestMethod::Post, endpoint, Some(data), options).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        options: RequestOptions,
    ) -> ClientResult<T> {
        let data = serde_json::to_value(body)?;
        self.request(RequestMethod::Put, endpoint, Some(data), options).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        options: RequestOptions,
    ) -> ClientResult<T> {
        let data = serde_json::to_value(body)?;
        self.request(RequestMethod::Patch, endpoint, Some(data), options).await
    }

    pub async fn del<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> ClientResult<T> {
        self.request(RequestMethod::Delete, endpoint, None, options).await
    }

    /// Send a multipart body with binary fields.
    pub async fn request_multipart<T: DeserializeOwned>(
        &self,
        method: RequestMethod,
        endpoint: &str,
        form: FormData,
        options: RequestOptions,
    ) -> ClientResult<T> {
        let mut request = ApiRequest::compile(method, endpoint, None, options)?;
        request.body = RequestBody::Multipart(form);
        decode(self.execute(request).await?)
    }
}

/// Decode a success body; an empty body decodes from `null`.
fn decode<T: DeserializeOwned>(response: RawResponse) -> ClientResult<T> {
    match response.body_json() {
        Some(value) => Ok(serde_json::from_value(value)?),
        None if response.bytes().iter().all(u8::is_ascii_whitespace) => {
            Ok(serde_json::from_value(serde_json::Value::Null)?)
        }
        None => response.json(),
    }
}

fn log_failure(failure: &DispatchFailure) {
    let DispatchFailure::Response(response) = failure else {
        return;
    };
    let body = response.body_json().unwrap_or_default();
    match response.status() {
        403 => warn!(%body, "Access forbidden - insufficient permissions"),
        404 => warn!(%body, "Resource not found"),
        500 => error!(%body, "Server error"),
        _ => {}
    }
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
    config: ClientConfig,
    session: SessionConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    navigator: Option<Arc<dyn SessionNavigator>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    middleware: Vec<Arc<dyn RequestMiddleware>>,
}

impl ApiClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            session: SessionConfig::default(),
            store: None,
            navigator: None,
            refresher: None,
            middleware: Vec::new(),
        }
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Medium for tokens and the refresh lock. Defaults to a fresh
    /// [`MemoryStore`].
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn SessionNavigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Replace the refresh call. Defaults to [`HttpTokenRefresher`].
    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Append middleware after the built-in ones.
    pub fn with_middleware(mut self, middleware: Arc<dyn RequestMiddleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        let http = HttpClient::new(self.config)?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let navigator = self.navigator.unwrap_or_else(|| Arc::new(LogNavigator));
        let refresher = self
            .refresher
            .unwrap_or_else(|| Arc::new(HttpTokenRefresher::new(http.clone())));

        let credentials =
            CredentialStore::new(store.clone()).with_lifetime(self.session.token_lifetime);
        let lock = RefreshLock::new(store)
            .with_key(self.session.lock_key.clone())
            .with_timeout(self.session.lock_timeout);
        let guard = Arc::new(SessionGuard::new(
            navigator,
            self.session.public_paths.clone(),
            http.config().messages.session_expired.clone(),
        ));
        let coordinator = Arc::new(
            RefreshCoordinator::new(credentials.clone(), lock, guard, refresher)
                .with_policy(self.session.cross_context),
        );

        let mut middleware: Vec<Arc<dyn RequestMiddleware>> = Vec::new();
        if let Some(secret) = &self.session.org_secret {
            middleware.push(Arc::new(OrgKeyHeader::new(
                credentials.clone(),
                OrgKeyCipher::new(secret),
            )));
        }
        middleware.push(Arc::new(BearerToken::new(credentials.clone())));
        middleware.extend(self.middleware);

        let retry = RetryPolicy::new(http.config().retry.clone());

        Ok(ApiClient {
            http,
            credentials,
            coordinator,
            middleware,
            retry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrms_api_client::TransportCode;

    fn response(status: u16) -> RawResponse {
        RawResponse::new(status, Default::default(), Default::default())
    }

    fn client() -> ApiClient {
        ApiClient::new(ClientConfig::default()).unwrap()
    }

    fn timeout() -> DispatchFailure {
        DispatchFailure::Transport(ClientError::new(ClientErrorKind::Timeout {
            code: TransportCode::ConnectionAborted,
            message: "timeout".into(),
        }))
    }

    #[test]
    fn test_classify_401() {
        let client = client();
        let failure = DispatchFailure::Response(response(401));

        let req = ApiRequest::new(RequestMethod::Get, "/users/me");
        assert_eq!(client.classify(&req, &failure), FailureAction::Refresh);

        let login = ApiRequest::new(RequestMethod::Post, "/auth/login");
        assert_eq!(client.classify(&login, &failure), FailureAction::Fail);

        let refresh = ApiRequest::new(RequestMethod::Post, "http://api/v1/auth/refresh-token");
        assert_eq!(client.classify(&refresh, &failure), FailureAction::Fail);

        let logout = ApiRequest::new(RequestMethod::Post, "/auth/logout");
        assert_eq!(client.classify(&logout, &failure), FailureAction::Refresh);
    }

    #[test]
    fn test_classify_timeout() {
        let client = client();
        let req = ApiRequest::new(RequestMethod::Get, "/employees");
        assert_eq!(client.classify(&req, &timeout()), FailureAction::Retry);

        let logout = ApiRequest::new(RequestMethod::Post, "/auth/logout");
        assert_eq!(client.classify(&logout, &timeout()), FailureAction::Fail);
    }

    #[test]
    fn test_classify_everything_else_fails() {
        let client = client();
        let req = ApiRequest::new(RequestMethod::Get, "/employees");
        for status in [400, 403, 404, 422, 500, 502, 503, 504] {
            let failure = DispatchFailure::Response(response(status));
            assert_eq!(client.classify(&req, &failure), FailureAction::Fail, "{status}");
        }

        let refused = DispatchFailure::Transport(ClientError::new(ClientErrorKind::Connectivity {
            code: TransportCode::ConnectFailed,
            message: "refused".into(),
        }));
        assert_eq!(client.classify(&req, &refused), FailureAction::Fail);
    }

    #[test]
    fn test_classify_follows_retry_policy() {
        let client = client();
        let req = ApiRequest::new(RequestMethod::Get, "/employees");
        let errors = [
            (TransportCode::ConnectionAborted, true),
            (TransportCode::TimedOut, true),
            (TransportCode::ConnectFailed, false),
            (TransportCode::Other, false),
        ];
        for (code, timeout) in errors {
            let err = if timeout {
                ClientError::new(ClientErrorKind::Timeout { code, message: "t".into() })
            } else {
                ClientError::new(ClientErrorKind::Connectivity { code, message: "c".into() })
            };
            let expected = if client.retry.should_retry(&err) {
                FailureAction::Retry
            } else {
                FailureAction::Fail
            };
            assert_eq!(expected == FailureAction::Retry, timeout, "{code:?}");
            let failure = DispatchFailure::Transport(err);
            assert_eq!(client.classify(&req, &failure), expected, "{code:?}");
        }
    }

    #[test]
    fn test_default_middleware_order() {
        let plain = client();
        let names: Vec<_> = plain.middleware.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["bearer"]);

        let with_org = ApiClient::builder(ClientConfig::default())
            .with_session(SessionConfig::default().with_org_secret("s"))
            .build()
            .unwrap();
        let names: Vec<_> = with_org.middleware.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["org-key", "bearer"]);
    }

    #[test]
    fn test_decode_empty_body() {
        let unit: () = decode(response(204)).unwrap();
        assert_eq!(unit, ());
        let value: Option<serde_json::Value> = decode(response(200)).unwrap();
        assert!(value.is_none());
    }
}
