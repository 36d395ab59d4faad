//! Login, OTP, 2FA setup, password and identity flows.
//!
//! Each flow is one call through [`ApiClient`]. Failures surface as
//! [`AuthFailure`] carrying the backend's message, or a per-flow default when
//! the backend gave none.

use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use hrms_api_client::{ApiResponse, ErrorKind as ClientErrorKind, RequestOptions};

use crate::credentials::TokenKind;
use crate::error::{AuthFailure, Error, Result};
use crate::pipeline::ApiClient;
use crate::session::LOGIN_PATH;
use crate::types::{
    redirect_path, ChangePasswordRequest, CompletePasswordResetRequest, LoginRequest,
    LoginResponse, PasswordResetRequest, Setup2faRequest, Setup2faResponse,
    Verify2faSetupRequest, Verify2faSetupResponse, VerifyOtpRequest, VerifyOtpResponse,
    VerifyPasswordResetOtpRequest, VerifyPasswordResetOtpResponse, UserResponse, UserRole,
};

/// Storage key of the username awaiting OTP or 2FA setup.
pub const PENDING_USERNAME_KEY: &str = "pending_2fa_username";
/// Storage key of the 2FA secret awaiting verification.
pub const PENDING_SECRET_KEY: &str = "pending_2fa_secret";
/// How long a half-finished login stays resumable.
pub const PENDING_LIFETIME: Duration = Duration::from_secs(10 * 60);

/// Page for the OTP step.
pub const OTP_PATH: &str = "/login/otp";
/// Page for the 2FA setup step.
pub const SETUP_2FA_PATH: &str = "/setup-2fa";

/// Where a login attempt ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStep {
    /// First sign-in: scan the QR code, then call
    /// [`AuthService::verify_2fa_setup`].
    Setup2fa { qr_code_url: String, secret: String },
    /// Call [`AuthService::verify_otp`] with the code from the authenticator.
    OtpRequired,
    /// Signed in.
    Authenticated {
        role: Option<UserRole>,
        redirect_to: String,
    },
}

impl LoginStep {
    /// Page the user should see next.
    pub fn redirect_to(&self) -> String {
        match self {
            LoginStep::Setup2fa { qr_code_url, .. } => {
                format!("{SETUP_2FA_PATH}?qr={}", urlencoding::encode(qr_code_url))
            }
            LoginStep::OtpRequired => OTP_PATH.to_string(),
            LoginStep::Authenticated { redirect_to, .. } => redirect_to.clone(),
        }
    }
}

/// Result of [`AuthService::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCheck {
    pub authenticated: bool,
    pub redirect_to: Option<String>,
}

/// What [`AuthService::on_error`] did with a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorAction {
    /// The session was dropped; go to login.
    LoggedOut { redirect_to: String },
    /// The user lacks permission.
    Forbidden(AuthFailure),
    /// Not an auth concern.
    PassThrough,
}

/// Auth flows on top of an [`ApiClient`].
#[derive(Debug, Clone)]
pub struct AuthService {
    client: ApiClient,
}

impl AuthService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Sign in with username and password.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginStep> {
        let endpoints = &self.client.config().endpoints;
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let envelope: ApiResponse<Option<LoginResponse>> = self
            .client
            .post(&endpoints.login, &body, RequestOptions::new())
            .await
            .map_err(|e| self.failure(e, "Login failed", "Invalid username or password"))?;
        let data = envelope.data.unwrap_or_default();

        self.remember(PENDING_USERNAME_KEY, username);
        self.store_tokens(data.token.as_deref(), data.refresh_token.as_deref());

        if data.requires_2fa {
            return self.initiate_2fa_setup(username).await;
        }
        if data.requires_otp {
            debug!("OTP required");
            return Ok(LoginStep::OtpRequired);
        }

        self.clear_pending();
        let role = data.user.as_ref().and_then(|u| u.role());
        self.session_started(role);
        Ok(LoginStep::Authenticated {
            role,
            redirect_to: redirect_path(role).to_string(),
        })
    }

    async fn initiate_2fa_setup(&self, username: &str) -> Result<LoginStep> {
        let endpoints = &self.client.config().endpoints;
        let body = Setup2faRequest {
            username: username.to_string(),
        };
        let envelope: ApiResponse<Option<Setup2faResponse>> = self
            .client
            .post(&endpoints.setup_2fa, &body, RequestOptions::new())
            .await
            .map_err(|e| {
                self.failure(
                    e,
                    "2FA setup failed",
                    "Could not start two-step verification. Please try again.",
                )
            })?;
        let data = envelope.data.unwrap_or_default();

        if !data.secret.is_empty() {
            self.remember(PENDING_SECRET_KEY, &data.secret);
        }
        info!("2FA setup required");
        Ok(LoginStep::Setup2fa {
            qr_code_url: data.qr_code_url,
            secret: data.secret,
        })
    }

    /// Finish a login that needs an OTP. Returns the landing page.
    #[instrument(skip_all)]
    pub async fn verify_otp(&self, otp_code: &str) -> Result<String> {
        let Some(username) = self.pending(PENDING_USERNAME_KEY) else {
            return Err(AuthFailure::session_expired(
                "Verification failed",
                "Your login session has expired. Please log in again.",
            )
            .into());
        };

        let endpoints = &self.client.config().endpoints;
        let body = VerifyOtpRequest {
            otp_code: otp_code.to_string(),
            username,
        };
        let envelope: ApiResponse<Option<VerifyOtpResponse>> = self
            .client
            .post(&endpoints.verify_otp, &body, RequestOptions::new())
            .await
            .map_err(|e| self.failure(e, "Verification failed", "Invalid OTP code"))?;
        let data = envelope.data.unwrap_or_default();

        self.store_tokens(data.token.as_deref(), data.refresh_token.as_deref());
        self.clear_pending();

        let role = data.user.as_ref().and_then(|u| u.role());
        self.session_started(role);
        let landing = if role.is_some_and(|r| r.is_admin()) {
            "/dashboard"
        } else {
            "/profile"
        };
        Ok(landing.to_string())
    }

    /// Confirm 2FA setup with the first OTP. Explicit `secret` and
    /// `username` win over the pending ones. The user signs in again
    /// afterwards, so this returns the login page.
    #[instrument(skip_all)]
    pub async fn verify_2fa_setup(
        &self,
        otp_code: &str,
        secret: Option<&str>,
        username: Option<&str>,
    ) -> Result<(Verify2faSetupResponse, String)> {
        let username = username
            .map(str::to_string)
            .or_else(|| self.pending(PENDING_USERNAME_KEY))
            .unwrap_or_default();
        let secret = secret
            .map(str::to_string)
            .or_else(|| self.pending(PENDING_SECRET_KEY))
            .unwrap_or_default();

        let endpoints = &self.client.config().endpoints;
        let body = Verify2faSetupRequest {
            otp_code: otp_code.to_string(),
            secret,
            username,
        };
        let envelope: ApiResponse<Option<Verify2faSetupResponse>> = self
            .client
            .post(&endpoints.verify_2fa_setup, &body, RequestOptions::new())
            .await
            .map_err(|e| self.failure(e, "2FA verification failed", "Invalid OTP code"))?;
        let data = envelope.data.unwrap_or_default();

        self.store_tokens(data.token.as_deref(), data.refresh_token.as_deref());
        self.clear_pending();
        Ok((data, LOGIN_PATH.to_string()))
    }

    /// Change the signed-in user's password.
    #[instrument(skip_all)]
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<()> {
        let endpoints = &self.client.config().endpoints;
        let body = ChangePasswordRequest {
            current_password: current_password.to_string(),
            new_password: new_password.to_string(),
            confirm_password: confirm_password.to_string(),
        };
        let _: serde_json::Value = self
            .client
            .put(&endpoints.change_password, &body, RequestOptions::new())
            .await
            .map_err(|e| self.failure(e, "Password change failed", "Could not change password"))?;
        info!("Password changed");
        Ok(())
    }

    /// Ask for a password reset OTP by email.
    #[instrument(skip(self))]
    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        let endpoints = &self.client.config().endpoints;
        let body = PasswordResetRequest {
            email: email.to_string(),
        };
        let _: serde_json::Value = self
            .client
            .post(&endpoints.request_password_reset, &body, RequestOptions::new())
            .await
            .map_err(|e| {
                self.failure(e, "Password reset failed", "Could not send the password reset email")
            })?;
        Ok(())
    }

    /// Trade the emailed OTP for a reset token.
    #[instrument(skip(self, otp_code))]
    pub async fn verify_password_reset_otp(&self, email: &str, otp_code: &str) -> Result<String> {
        let endpoints = &self.client.config().endpoints;
        let body = VerifyPasswordResetOtpRequest {
            email: email.to_string(),
            otp_code: otp_code.to_string(),
        };
        let envelope: ApiResponse<Option<VerifyPasswordResetOtpResponse>> = self
            .client
            .post(&endpoints.verify_password_reset_otp, &body, RequestOptions::new())
            .await
            .map_err(|e| self.failure(e, "OTP verification failed", "Invalid OTP code"))?;
        Ok(envelope.data.unwrap_or_default().reset_token)
    }

    /// Set a new password with a reset token. Returns the login page.
    #[instrument(skip_all)]
    pub async fn complete_password_reset(
        &self,
        password: &str,
        confirm_password: &str,
        reset_token: Option<&str>,
    ) -> Result<String> {
        let endpoints = &self.client.config().endpoints;
        let body = CompletePasswordResetRequest {
            new_password: password.to_string(),
            confirm_password: confirm_password.to_string(),
            reset_token: reset_token.unwrap_or_default().to_string(),
        };
        let _: serde_json::Value = self
            .client
            .post(&endpoints.complete_password_reset, &body, RequestOptions::new())
            .await
            .map_err(|e| self.failure(e, "Password update failed", "Could not update password"))?;
        Ok(LOGIN_PATH.to_string())
    }

    /// End the session. The backend call may fail; local state is cleared
    /// regardless. Returns the login page.
    #[instrument(skip_all)]
    pub async fn logout(&self) -> String {
        let endpoints = &self.client.config().endpoints;
        let result: hrms_api_client::Result<serde_json::Value> = self
            .client
            .post(&endpoints.logout, &serde_json::json!({}), RequestOptions::new())
            .await;
        if let Err(e) = result {
            debug!(error = %e, "Logout call failed, clearing local session anyway");
        }

        self.client.credentials().clear();
        self.clear_pending();
        self.client.coordinator().lock().release();
        info!("Logged out");
        LOGIN_PATH.to_string()
    }

    /// Whether a session is live. Public pages report unauthenticated
    /// without calling the backend.
    #[instrument(skip_all)]
    pub async fn check(&self) -> AuthCheck {
        if self.client.guard().is_public_page() {
            return AuthCheck {
                authenticated: false,
                redirect_to: None,
            };
        }

        let me = &self.client.config().endpoints.me;
        match self
            .client
            .get::<ApiResponse<Option<UserResponse>>>(me, RequestOptions::new())
            .await
        {
            Ok(envelope) if envelope.is_success && envelope.data.is_some() => AuthCheck {
                authenticated: true,
                redirect_to: None,
            },
            _ => AuthCheck {
                authenticated: false,
                redirect_to: Some(LOGIN_PATH.to_string()),
            },
        }
    }

    /// Profile of the signed-in user, `None` on any failure.
    #[instrument(skip_all)]
    pub async fn identity(&self) -> Option<UserResponse> {
        let me = &self.client.config().endpoints.me;
        let user = self
            .client
            .get::<ApiResponse<Option<UserResponse>>>(me, RequestOptions::new())
            .await
            .inspect_err(|e| debug!(error = %e, "Identity lookup failed"))
            .ok()?
            .data?;

        if let Ok(json) = serde_json::to_value(&user) {
            self.client.credentials().cache_user(&json);
        }
        if let Some(role) = user.role.role() {
            self.client.credentials().cache_role(role.as_str());
        }
        Some(user)
    }

    /// Role of the signed-in user, `None` on any failure.
    pub async fn permissions(&self) -> Option<UserRole> {
        self.identity().await.and_then(|user| user.role.role())
    }

    /// React to a failed call made elsewhere in the application.
    pub async fn on_error(&self, error: &hrms_api_client::Error) -> ErrorAction {
        match error.status() {
            Some(401) => ErrorAction::LoggedOut {
                redirect_to: self.logout().await,
            },
            Some(403) => ErrorAction::Forbidden(AuthFailure::new(
                "Access denied",
                "You do not have permission to access this resource",
            )),
            _ => ErrorAction::PassThrough,
        }
    }

    /// Pending username of a half-finished login.
    pub fn pending_username(&self) -> Option<String> {
        self.pending(PENDING_USERNAME_KEY)
    }

    fn session_started(&self, role: Option<UserRole>) {
        if let Some(role) = role {
            self.client.credentials().cache_role(role.as_str());
        }
        self.client.coordinator().reset();
        info!(role = role.map(|r| r.as_str()), "Signed in");
    }

    fn store_tokens(&self, access: Option<&str>, refresh: Option<&str>) {
        let credentials = self.client.credentials();
        if let Some(access) = access.filter(|t| !t.is_empty()) {
            credentials.set(TokenKind::Access, access);
        }
        if let Some(refresh) = refresh.filter(|t| !t.is_empty()) {
            credentials.set(TokenKind::Refresh, refresh);
        }
    }

    fn pending(&self, key: &str) -> Option<String> {
        match self.client.credentials().medium().get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(key, error = %e, "Failed to read pending login state");
                None
            }
        }
    }

    fn remember(&self, key: &str, value: &str) {
        let medium = self.client.credentials().medium();
        if let Err(e) = medium.set(key, value, Some(PENDING_LIFETIME)) {
            warn!(key, error = %e, "Failed to store pending login state");
        }
    }

    fn clear_pending(&self) {
        let medium = self.client.credentials().medium();
        for key in [PENDING_USERNAME_KEY, PENDING_SECRET_KEY] {
            if let Err(e) = medium.remove(key) {
                warn!(key, error = %e, "Failed to clear pending login state");
            }
        }
    }

    /// Turn a call failure into an [`AuthFailure`], keeping the backend's
    /// message when it gave one.
    fn failure(&self, err: hrms_api_client::Error, name: &str, default: &str) -> Error {
        let message = match &err.kind {
            ClientErrorKind::Backend { message, .. }
            | ClientErrorKind::AuthExpired { message, .. }
                if self.is_backend_message(message) =>
            {
                message.clone()
            }
            ClientErrorKind::Connectivity { message, .. }
            | ClientErrorKind::Timeout { message, .. }
            | ClientErrorKind::RetriesExhausted { message, .. } => message.clone(),
            _ => default.to_string(),
        };
        let session_expired = err.is_auth_error() && !matches!(err.kind, ClientErrorKind::Backend { .. });
        let failure = AuthFailure {
            name: name.to_string(),
            message,
            session_expired,
        };
        Error::with_source(crate::error::ErrorKind::Auth(failure), err)
    }

    /// The message came from the response body rather than a fallback.
    fn is_backend_message(&self, message: &str) -> bool {
        !message.is_empty()
            && message != self.client.config().messages.generic
            && !message.starts_with("Request failed with status code")
    }
}
