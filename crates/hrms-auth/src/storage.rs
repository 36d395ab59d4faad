//! Key-value storage media for session state.
//!
//! A store plays the role of the browser's cookie jar and local storage:
//! several client instances (processes) sharing one store see each other's
//! tokens and refresh lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};

/// Trait for key-value storage implementations.
///
/// Each individual call is atomic at the medium level.
pub trait KeyValueStore: Send + Sync {
    /// Load a value; expired entries read as absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, optionally expiring after `ttl`.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Delete a value. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Check if a live value exists.
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// A stored value with its expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
    fn new(value: &str, ttl: Option<Duration>) -> Result<Self> {
        let expires_at = match ttl {
            Some(ttl) => {
                let ttl = chrono::Duration::from_std(ttl)
                    .map_err(|e| Error::new(ErrorKind::Storage(e.to_string())))?;
                Some(Utc::now() + ttl)
            }
            None => None,
        };
        Ok(Self {
            value: value.to_string(),
            expires_at,
        })
    }

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at > now).unwrap_or(true)
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, StoredEntry>>> {
        self.entries
            .lock()
            .map_err(|_| Error::new(ErrorKind::Storage("memory store poisoned".to_string())))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries()?;
        match entries.get(key) {
            Some(entry) if entry.is_live(Utc::now()) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let entry = StoredEntry::new(value, ttl)?;
        self.entries()?.insert(key.to_string(), entry);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// Directory of entry files shared between processes.
///
/// Each key lives in its own file, so a write only ever replaces that key.
/// Writes go to a temporary file that is renamed over the entry, so readers
/// never observe a half-written value.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Create a file store at the default path.
    ///
    /// Default path: `~/.hrms-api/session/`
    pub fn new() -> Result<Self> {
        Ok(Self::with_path(default_session_path()?))
    }

    /// Create a file store rooted at a custom directory.
    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            base_path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.base_path
    }

    /// Get the entry file path for a key.
    fn entry_path(&self, key: &str) -> PathBuf {
        let safe_key = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect::<String>();

        self.base_path.join(format!("{}.json", safe_key))
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.base_path.exists() {
            std::fs::create_dir_all(&self.base_path)?;
        }
        Ok(())
    }

    fn read_entry(&self, key: &str) -> Result<Option<StoredEntry>> {
        let json = match std::fs::read_to_string(self.entry_path(key)) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&json)?))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .read_entry(key)?
            .filter(|entry| entry.is_live(Utc::now()))
            .map(|entry| entry.value))
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let entry = StoredEntry::new(value, ttl)?;
        self.ensure_dir()?;

        let path = self.entry_path(key);
        let tmp = path.with_extension(format!(
            "{}.{}.tmp",
            std::process::id(),
            rand::random::<u32>()
        ));
        let json = serde_json::to_string_pretty(&entry)?;
        std::fs::write(&tmp, json)?;

        // Set restrictive permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&tmp, perms)?;
        }

        std::fs::rename(&tmp, &path).inspect_err(|_| {
            let _ = std::fs::remove_file(&tmp);
        })?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Get the default session directory.
pub fn default_session_path() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::new(ErrorKind::Config("Could not find home directory".to_string())))?;

    Ok(home.join(".hrms-api").join("session"))
}
