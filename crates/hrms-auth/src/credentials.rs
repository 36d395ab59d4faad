//! Credential store over a key-value medium.
//!
//! Reads never fail: a broken medium reads as "not logged in". Writes log
//! and carry on, so a failing jar degrades to an unauthenticated session
//! instead of failing the call that tried to store a token.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::storage::KeyValueStore;

/// Storage key of the access token.
pub const ACCESS_TOKEN_KEY: &str = "rcycles_token";
/// Storage key of the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "rcycles_refresh";
/// Storage key of the encrypted organization key.
pub const ORG_TOKEN_KEY: &str = "org_token";
/// Storage key of the cached user role.
pub const USER_ROLE_KEY: &str = "us_r";
/// Storage key of the cached user profile.
pub const USER_INFO_KEY: &str = "user_ifo";
/// Key names used by earlier releases, removed on clear.
pub const LEGACY_TOKEN_KEYS: [&str; 2] = ["ac_token", "rf_token"];

/// Default token lifetime: shorter than the backend's so tokens are
/// re-validated periodically.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(6 * 3600 + 30 * 60);

/// Which credential to read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
    Org,
}

impl TokenKind {
    /// Storage key for this credential.
    pub fn key(&self) -> &'static str {
        match self {
            TokenKind::Access => ACCESS_TOKEN_KEY,
            TokenKind::Refresh => REFRESH_TOKEN_KEY,
            TokenKind::Org => ORG_TOKEN_KEY,
        }
    }
}

/// Access, refresh and org tokens in a shared medium.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
    lifetime: Duration,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("access_token", &self.get(TokenKind::Access).map(|_| "[REDACTED]"))
            .field("refresh_token", &self.get(TokenKind::Refresh).map(|_| "[REDACTED]"))
            .field("org_token", &self.get(TokenKind::Org).map(|_| "[REDACTED]"))
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

impl CredentialStore {
    /// Create a credential store with the default token lifetime.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            lifetime: DEFAULT_TOKEN_LIFETIME,
        }
    }

    /// Override the token lifetime.
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// The medium underneath, shared with the refresh lock.
    pub fn medium(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Read a credential; `None` when absent, empty or unreadable.
    pub fn get(&self, kind: TokenKind) -> Option<String> {
        self.read(kind.key())
    }

    /// Write one credential with the configured lifetime.
    pub fn set(&self, kind: TokenKind, value: &str) {
        self.write(kind.key(), value);
    }

    /// Write both session tokens.
    pub fn set_pair(&self, access: &str, refresh: &str) {
        self.set(TokenKind::Access, access);
        self.set(TokenKind::Refresh, refresh);
    }

    /// Remove every credential, legacy key names and cached identity.
    pub fn clear(&self) {
        let keys = [
            ACCESS_TOKEN_KEY,
            REFRESH_TOKEN_KEY,
            ORG_TOKEN_KEY,
            USER_ROLE_KEY,
            USER_INFO_KEY,
        ];
        for key in keys.into_iter().chain(LEGACY_TOKEN_KEYS) {
            if let Err(e) = self.store.remove(key) {
                warn!(key, error = %e, "Failed to remove credential");
            }
        }
    }

    /// True when an access token is present.
    pub fn is_authenticated(&self) -> bool {
        self.get(TokenKind::Access).is_some()
    }

    /// Cache the signed-in user's role.
    pub fn cache_role(&self, role: &str) {
        self.write(USER_ROLE_KEY, role);
    }

    pub fn cached_role(&self) -> Option<String> {
        self.read(USER_ROLE_KEY)
    }

    /// Cache the signed-in user's profile as JSON.
    pub fn cache_user(&self, user: &serde_json::Value) {
        self.write(USER_INFO_KEY, &user.to_string());
    }

    pub fn cached_user(&self) -> Option<serde_json::Value> {
        self.read(USER_INFO_KEY)
            .and_then(|json| serde_json::from_str(&json).ok())
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(key, error = %e, "Failed to read credential");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value, Some(self.lifetime)) {
            warn!(key, error = %e, "Failed to store credential");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorKind, Result};
    use crate::storage::MemoryStore;

    fn memory() -> (Arc<MemoryStore>, CredentialStore) {
        let medium = Arc::new(MemoryStore::new());
        let store = CredentialStore::new(medium.clone());
        (medium, store)
    }

    /// A medium that fails every call.
    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::new(ErrorKind::Storage("unavailable".into())))
        }
        fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<()> {
            Err(Error::new(ErrorKind::Storage("unavailable".into())))
        }
        fn remove(&self, _key: &str) -> Result<()> {
            Err(Error::new(ErrorKind::Storage("unavailable".into())))
        }
    }

    #[test]
    fn test_set_pair_and_get() {
        let (_, store) = memory();
        assert!(!store.is_authenticated());

        store.set_pair("access", "refresh");
        assert_eq!(store.get(TokenKind::Access).as_deref(), Some("access"));
        assert_eq!(store.get(TokenKind::Refresh).as_deref(), Some("refresh"));
        assert!(store.is_authenticated());
    }

    #[test]
    fn test_clear_removes_current_legacy_and_identity_keys() {
        let (medium, store) = memory();
        store.set_pair("access", "refresh");
        store.set(TokenKind::Org, "org");
        store.cache_role("ADMIN");
        store.cache_user(&serde_json::json!({"id": 1}));
        medium.set("ac_token", "old-access", None).unwrap();
        medium.set("rf_token", "old-refresh", None).unwrap();

        store.clear();

        for key in [
            ACCESS_TOKEN_KEY,
            REFRESH_TOKEN_KEY,
            ORG_TOKEN_KEY,
            USER_ROLE_KEY,
            USER_INFO_KEY,
            "ac_token",
            "rf_token",
        ] {
            assert!(medium.get(key).unwrap().is_none(), "{key} survived clear");
        }
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_broken_medium_reads_as_absent() {
        let store = CredentialStore::new(Arc::new(BrokenStore));
        store.set_pair("access", "refresh");
        assert_eq!(store.get(TokenKind::Access), None);
        assert!(!store.is_authenticated());
        store.clear();
    }

    #[test]
    fn test_empty_value_reads_as_absent() {
        let (_, store) = memory();
        store.set(TokenKind::Access, "");
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_tokens_written_with_lifetime() {
        let (_, store) = memory();
        let store = store.with_lifetime(Duration::ZERO);
        store.set_pair("access", "refresh");
        assert!(store.get(TokenKind::Access).is_none());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let (_, store) = memory();
        store.set_pair("secret-access", "secret-refresh");
        let debug = format!("{store:?}");
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_default_lifetime() {
        assert_eq!(DEFAULT_TOKEN_LIFETIME, Duration::from_secs(23_400));
    }
}
