//! Outbound request middleware.
//!
//! Middleware runs in list order on every dispatch, including timeout
//! retries and post-refresh replays.

use tracing::warn;

use hrms_api_client::{headers, ApiRequest};

use crate::credentials::{CredentialStore, TokenKind};
use crate::org_key::OrgKeyCipher;

/// Mutates a request before it goes out. Must never fail the request.
pub trait RequestMiddleware: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn on_request(&self, request: &mut ApiRequest);
}

/// Sets `X-Organization-Key` from the stored, encrypted org token.
#[derive(Debug, Clone)]
pub struct OrgKeyHeader {
    credentials: CredentialStore,
    cipher: OrgKeyCipher,
}

impl OrgKeyHeader {
    pub fn new(credentials: CredentialStore, cipher: OrgKeyCipher) -> Self {
        Self {
            credentials,
            cipher,
        }
    }
}

impl RequestMiddleware for OrgKeyHeader {
    fn name(&self) -> &'static str {
        "org-key"
    }

    fn on_request(&self, request: &mut ApiRequest) {
        let Some(token) = self.credentials.get(TokenKind::Org) else {
            return;
        };
        match self.cipher.decrypt(&token) {
            Ok(org_key) if !org_key.is_empty() => {
                request
                    .headers
                    .insert(headers::X_ORGANIZATION_KEY.to_string(), org_key);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Org token did not decrypt, sending without org key"),
        }
    }
}

/// Attaches the stored access token unless the request already carries one.
#[derive(Debug, Clone)]
pub struct BearerToken {
    credentials: CredentialStore,
}

impl BearerToken {
    pub fn new(credentials: CredentialStore) -> Self {
        Self { credentials }
    }
}

impl RequestMiddleware for BearerToken {
    fn name(&self) -> &'static str {
        "bearer"
    }

    fn on_request(&self, request: &mut ApiRequest) {
        if request.bearer_token.is_some() || request.header_value(headers::AUTHORIZATION).is_some() {
            return;
        }
        request.bearer_token = self.credentials.get(TokenKind::Access);
    }
}
