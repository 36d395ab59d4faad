//! Access-token refresh coordination.
//!
//! At most one refresh runs per coordinator. Calls that hit a 401 while it
//! runs are parked on a FIFO queue and resumed with its outcome. A lock in
//! the shared medium tells other contexts that a refresh is under way.
//!
//! Per call: `Initial -> RefreshRequested -> {Queued | Refreshing} ->
//! Replayed | Failed`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

use hrms_api_client::{
    headers, normalize, ApiRequest, ApiResponse, ErrorKind, HttpClient, RequestMethod,
};

use crate::credentials::{CredentialStore, TokenKind};
use crate::lock::RefreshLock;
use crate::session::SessionGuard;

/// What a context does when another context holds the refresh lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossContextPolicy {
    /// Sleep `grace`, then adopt a changed access token or refresh anyway.
    WaitThenRefresh { grace: Duration },
    /// Poll every `interval` until the lock is released or stale (giving up
    /// after `max_wait`), then adopt a changed token or refresh.
    PollUntilReleased { interval: Duration, max_wait: Duration },
    /// Refresh without looking at the lock.
    Ignore,
}

impl Default for CrossContextPolicy {
    fn default() -> Self {
        CrossContextPolicy::WaitThenRefresh {
            grace: Duration::from_secs(2),
        }
    }
}

/// A new access/refresh token pair.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// Why a refresh call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshFailure {
    pub message: String,
    /// The backend rejected the refresh token itself.
    pub invalid_credentials: bool,
}

impl RefreshFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            invalid_credentials: false,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            invalid_credentials: true,
        }
    }

    pub fn into_error(self) -> hrms_api_client::Error {
        hrms_api_client::Error::new(ErrorKind::RefreshFailed {
            message: self.message,
            invalid_credentials: self.invalid_credentials,
        })
    }
}

/// Exchanges a refresh token for a new pair.
///
/// Implementations must not go through the request pipeline.
pub trait TokenRefresher: Send + Sync {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, std::result::Result<TokenPair, RefreshFailure>>;
}

#[derive(Debug, Deserialize)]
struct RefreshData {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Calls the backend refresh endpoint directly on the transport.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    http: HttpClient,
}

impl HttpTokenRefresher {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    #[instrument(skip_all)]
    async fn call(&self, refresh_token: &str) -> std::result::Result<TokenPair, RefreshFailure> {
        let config = self.http.config();
        let request = ApiRequest::new(RequestMethod::Post, config.endpoints.refresh_token.clone())
            .header(headers::CONTENT_TYPE, "application/json")
            .timeout(config.refresh_timeout)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .map_err(|e| RefreshFailure::transient(e.kind.message()))?;

        let response = self
            .http
            .send_to(&config.direct_url(), &request)
            .await
            .map_err(|e| RefreshFailure::transient(e.normalized().message))?;

        if !response.is_success() {
            let message = normalize(&response.to_failure(), &config.messages).message;
            let invalid = response.status() == 401 || message.to_lowercase().contains("invalid");
            return Err(RefreshFailure {
                message,
                invalid_credentials: invalid,
            });
        }

        let pair = response
            .json::<ApiResponse<RefreshData>>()
            .ok()
            .and_then(|envelope| {
                Some(TokenPair {
                    access_token: envelope.data.token.filter(|t| !t.is_empty())?,
                    refresh_token: envelope.data.refresh_token.filter(|t| !t.is_empty())?,
                })
            });

        pair.ok_or_else(|| {
            error!(status = response.status(), "Refresh response has no token pair");
            RefreshFailure::invalid("Invalid refresh response")
        })
    }
}

impl TokenRefresher for HttpTokenRefresher {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, std::result::Result<TokenPair, RefreshFailure>> {
        Box::pin(self.call(refresh_token))
    }
}

/// Why a 401 could not be turned into a replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshDenied {
    /// The call was already replayed once.
    AlreadyRetried,
    /// The expiry redirect already fired; nothing more to try.
    Redirecting,
    /// No refresh token is stored; the session is over.
    NoRefreshToken,
    /// This call ran the refresh and it failed.
    Failed(RefreshFailure),
    /// This call waited on someone else's refresh and it failed.
    Queued(RefreshFailure),
}

impl RefreshDenied {
    /// True when the session is definitely over.
    pub fn session_ended(&self) -> bool {
        match self {
            RefreshDenied::AlreadyRetried
            | RefreshDenied::Redirecting
            | RefreshDenied::NoRefreshToken => true,
            RefreshDenied::Failed(f) | RefreshDenied::Queued(f) => f.invalid_credentials,
        }
    }
}

type Waiter = oneshot::Sender<std::result::Result<String, RefreshFailure>>;

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    queue: VecDeque<Waiter>,
}

/// Serializes refreshes and parks concurrent 401s until one settles.
pub struct RefreshCoordinator {
    credentials: CredentialStore,
    lock: RefreshLock,
    guard: Arc<SessionGuard>,
    refresher: Arc<dyn TokenRefresher>,
    policy: CrossContextPolicy,
    state: Mutex<RefreshState>,
    refreshes: AtomicUsize,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("policy", &self.policy)
            .field("refreshing", &self.is_refreshing())
            .field("queued", &self.queued())
            .field("refreshes", &self.refresh_count())
            .finish()
    }
}

impl RefreshCoordinator {
    pub fn new(
        credentials: CredentialStore,
        lock: RefreshLock,
        guard: Arc<SessionGuard>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            credentials,
            lock,
            guard,
            refresher,
            policy: CrossContextPolicy::default(),
            state: Mutex::new(RefreshState::default()),
            refreshes: AtomicUsize::new(0),
        }
    }

    pub fn with_policy(mut self, policy: CrossContextPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn guard(&self) -> &Arc<SessionGuard> {
        &self.guard
    }

    pub fn lock(&self) -> &RefreshLock {
        &self.lock
    }

    /// A refresh is running in this coordinator.
    pub fn is_refreshing(&self) -> bool {
        self.state().refreshing
    }

    /// Calls parked on the running refresh.
    pub fn queued(&self) -> usize {
        self.state().queue.len()
    }

    /// Refresh calls issued since creation.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, RefreshState> {
        // Critical sections never panic, so a poisoned lock still holds
        // consistent state.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Turn a 401 on `request` into an access token to replay it with.
    #[instrument(skip_all, fields(endpoint = %request.endpoint))]
    pub async fn obtain_token(&self, request: &ApiRequest) -> std::result::Result<String, RefreshDenied> {
        if request.retried {
            debug!("Request already retried, not refreshing again");
            return Err(RefreshDenied::AlreadyRetried);
        }
        if self.guard.is_redirecting() {
            return Err(RefreshDenied::Redirecting);
        }

        let current = self.credentials.get(TokenKind::Access);
        let Some(refresh_token) = self.credentials.get(TokenKind::Refresh) else {
            info!("No refresh token, ending session");
            self.end_session();
            return Err(RefreshDenied::NoRefreshToken);
        };

        if let Some(waiter) = self.enqueue_if_refreshing() {
            return self.wait(waiter).await;
        }

        if let Some(token) = self.observe_other_context(current.as_deref()).await {
            return Ok(token);
        }

        // Another call may have started a refresh while we waited.
        let waiter = {
            let mut state = self.state();
            if state.refreshing {
                let (tx, rx) = oneshot::channel();
                state.queue.push_back(tx);
                Some(rx)
            } else {
                state.refreshing = true;
                None
            }
        };
        if let Some(waiter) = waiter {
            return self.wait(waiter).await;
        }

        self.run_refresh(&refresh_token).await
    }

    fn enqueue_if_refreshing(
        &self,
    ) -> Option<oneshot::Receiver<std::result::Result<String, RefreshFailure>>> {
        let mut state = self.state();
        if !state.refreshing {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        state.queue.push_back(tx);
        debug!(position = state.queue.len(), "Refresh in progress, queuing request");
        Some(rx)
    }

    async fn wait(
        &self,
        waiter: oneshot::Receiver<std::result::Result<String, RefreshFailure>>,
    ) -> std::result::Result<String, RefreshDenied> {
        match waiter.await {
            Ok(Ok(token)) => Ok(token),
            Ok(Err(failure)) => Err(RefreshDenied::Queued(failure)),
            Err(_) => Err(RefreshDenied::Queued(RefreshFailure::transient(
                "Token refresh was abandoned",
            ))),
        }
    }

    /// Apply the cross-context policy. Returns a token another context
    /// stored while we waited.
    async fn observe_other_context(&self, current: Option<&str>) -> Option<String> {
        match self.policy {
            CrossContextPolicy::Ignore => return None,
            _ if !self.lock.is_held() => return None,
            CrossContextPolicy::WaitThenRefresh { grace } => {
                debug!(grace_ms = grace.as_millis() as u64, "Another context is refreshing, waiting");
                tokio::time::sleep(grace).await;
            }
            CrossContextPolicy::PollUntilReleased { interval, max_wait } => {
                debug!("Another context is refreshing, polling lock");
                let deadline = tokio::time::Instant::now() + max_wait;
                while self.lock.is_held() && tokio::time::Instant::now() < deadline {
                    tokio::time::sleep(interval).await;
                }
            }
        }

        let latest = self.credentials.get(TokenKind::Access)?;
        if Some(latest.as_str()) != current {
            info!("Adopting token refreshed by another context");
            Some(latest)
        } else {
            None
        }
    }

    async fn run_refresh(&self, refresh_token: &str) -> std::result::Result<String, RefreshDenied> {
        let mut in_flight = InFlight {
            coordinator: self,
            settled: false,
        };

        self.lock.acquire();
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        info!("Refreshing access token");

        let outcome = self.refresher.refresh(refresh_token).await;
        in_flight.settled = true;

        match outcome {
            Ok(pair) => {
                self.credentials.set_pair(&pair.access_token, &pair.refresh_token);
                self.settle(Ok(pair.access_token.clone()));
                info!("Access token refreshed");
                Ok(pair.access_token)
            }
            Err(failure) => {
                warn!(
                    invalid_credentials = failure.invalid_credentials,
                    message = %failure.message,
                    "Token refresh failed"
                );
                self.settle(Err(failure.clone()));
                if failure.invalid_credentials {
                    self.end_session();
                }
                Err(RefreshDenied::Failed(failure))
            }
        }
    }

    /// Clear the flag and lock, then resume every parked call in order.
    fn settle(&self, outcome: std::result::Result<String, RefreshFailure>) {
        let queue = {
            let mut state = self.state();
            state.refreshing = false;
            std::mem::take(&mut state.queue)
        };
        self.lock.release();

        debug!(queued = queue.len(), ok = outcome.is_ok(), "Processing queued requests");
        for waiter in queue {
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Clear credentials and the lock, and fire the expiry redirect.
    pub fn end_session(&self) {
        self.credentials.clear();
        self.lock.release();
        self.guard.expire();
    }

    /// Drop all refresh state: reject parked calls and re-arm the guard.
    pub fn reset(&self) {
        let queue = {
            let mut state = self.state();
            state.refreshing = false;
            std::mem::take(&mut state.queue)
        };
        for waiter in queue {
            let _ = waiter.send(Err(RefreshFailure::transient("Session was reset")));
        }
        self.guard.reset();
    }
}

/// Settles the queue if the refreshing future is dropped mid-flight.
struct InFlight<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator
                .settle(Err(RefreshFailure::transient("Token refresh was cancelled")));
        }
    }
}
