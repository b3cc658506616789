//! Durable credential and identity persistence
//!
//! This module defines the key-value store the session and conversation
//! layers persist through: an opaque string-to-string map that survives
//! process restarts. Two implementations are provided; the file-backed one
//! is the production default, the in-memory one serves tests and embedders
//! that manage persistence themselves.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use directories::ProjectDirs;

use crate::error::{ConfabError, Result};

/// Storage key for the session bearer token
pub const KEY_TOKEN: &str = "userToken";
/// Storage key for the authenticated user's id
pub const KEY_USER_ID: &str = "userId";
/// Storage key for the authenticated user's username
pub const KEY_USERNAME: &str = "username";
/// Storage key for the active conversation's server-assigned id
pub const KEY_HISTORY_ID: &str = "historyId";

/// Durable, opaque key→string persistence
///
/// Values are written through on every mutation so that a process crash
/// never loses an acknowledged write. Implementations must be safe to share
/// across tasks behind an `Arc`.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read the value stored under `key`, or `None` when absent
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove the value stored under `key`
    ///
    /// Removing an absent key is a no-op, so callers can clear state without
    /// checking for presence first.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Remove several keys in one call
    async fn remove_many(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileCredentialStore
// ---------------------------------------------------------------------------

/// File-backed credential store
///
/// Entries live in a single JSON object on disk. The file is read once when
/// the store is opened and rewritten in full on every mutation; the values
/// involved are a handful of short strings, so rewriting is cheaper than any
/// incremental scheme would be to get right.
///
/// # Examples
///
/// ```no_run
/// use confab::credentials::{CredentialStore, FileCredentialStore};
///
/// # async fn example() -> confab::error::Result<()> {
/// let store = FileCredentialStore::open("/tmp/confab-credentials.json")?;
/// store.set("userToken", "abc123").await?;
/// assert_eq!(store.get("userToken").await?.as_deref(), Some("abc123"));
/// # Ok(())
/// # }
/// ```
pub struct FileCredentialStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileCredentialStore {
    /// Open the store at the default platform location
    ///
    /// The `CONFAB_CREDENTIALS_FILE` environment variable overrides the
    /// location, which makes it easy to point the binary at a test file or
    /// an alternate profile without touching the user's data directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfabError::Storage`] if the data directory cannot be
    /// determined or the store file exists but cannot be read or parsed.
    pub fn open_default() -> Result<Self> {
        if let Ok(override_path) = std::env::var("CONFAB_CREDENTIALS_FILE") {
            return Self::open(override_path);
        }

        let proj_dirs = ProjectDirs::from("com", "confab", "confab")
            .ok_or_else(|| ConfabError::Storage("Could not determine data directory".into()))?;

        Self::open(proj_dirs.data_dir().join("credentials.json"))
    }

    /// Open the store at the given path, creating parent directories
    ///
    /// A missing file yields an empty store; the file is created on the
    /// first write.
    ///
    /// # Errors
    ///
    /// Returns [`ConfabError::Storage`] if the parent directory cannot be
    /// created or an existing file cannot be read or parsed.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfabError::Storage(format!("Failed to create credential directory: {}", e))
            })?;
        }

        let entries = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| {
                ConfabError::Storage(format!("Failed to read credentials file: {}", e))
            })?;
            serde_json::from_str(&contents).map_err(|e| {
                ConfabError::Storage(format!("Malformed credentials file: {}", e))
            })?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn flush(&self, entries: &HashMap<String, String>) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json)
            .map_err(|e| ConfabError::Storage(format!("Failed to write credentials file: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| ConfabError::Storage("Credential store lock poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ConfabError::Storage("Credential store lock poisoned".into()))?;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ConfabError::Storage("Credential store lock poisoned".into()))?;
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryCredentialStore
// ---------------------------------------------------------------------------

/// In-memory credential store
///
/// Nothing survives the process; useful in tests and for embedders that
/// want session behavior without touching the filesystem.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| ConfabError::Storage("Credential store lock poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ConfabError::Storage("Credential store lock poisoned".into()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ConfabError::Storage("Credential store lock poisoned".into()))?;
        entries.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryCredentialStore::new();
        assert!(store.get(KEY_TOKEN).await.unwrap().is_none());

        store.set(KEY_TOKEN, "tok").await.unwrap();
        assert_eq!(store.get(KEY_TOKEN).await.unwrap().as_deref(), Some("tok"));

        store.remove(KEY_TOKEN).await.unwrap();
        assert!(store.get(KEY_TOKEN).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_remove_is_idempotent() {
        let store = MemoryCredentialStore::new();
        store.remove("never-set").await.unwrap();
        store.remove("never-set").await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_many_clears_all_keys() {
        let store = MemoryCredentialStore::new();
        store.set(KEY_TOKEN, "t").await.unwrap();
        store.set(KEY_USER_ID, "1").await.unwrap();
        store.set(KEY_USERNAME, "alice").await.unwrap();

        store
            .remove_many(&[KEY_TOKEN, KEY_USER_ID, KEY_USERNAME])
            .await
            .unwrap();

        assert!(store.get(KEY_TOKEN).await.unwrap().is_none());
        assert!(store.get(KEY_USER_ID).await.unwrap().is_none());
        assert!(store.get(KEY_USERNAME).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_persists_across_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("credentials.json");

        {
            let store = FileCredentialStore::open(&path).unwrap();
            store.set(KEY_HISTORY_ID, "42").await.unwrap();
        }

        let reopened = FileCredentialStore::open(&path).unwrap();
        assert_eq!(
            reopened.get(KEY_HISTORY_ID).await.unwrap().as_deref(),
            Some("42")
        );
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_empty() {
        let dir = tempdir().expect("tempdir");
        let store = FileCredentialStore::open(dir.path().join("fresh.json")).unwrap();
        assert!(store.get(KEY_TOKEN).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_creates_parent_directories() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("deeper").join("creds.json");

        let store = FileCredentialStore::open(&path).unwrap();
        store.set(KEY_TOKEN, "tok").await.unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_file_store_rejects_malformed_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "not json at all").unwrap();

        let result = FileCredentialStore::open(&path);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_file_store_remove_rewrites_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("credentials.json");

        let store = FileCredentialStore::open(&path).unwrap();
        store.set(KEY_TOKEN, "tok").await.unwrap();
        store.set(KEY_USERNAME, "alice").await.unwrap();
        store.remove(KEY_TOKEN).await.unwrap();

        let reopened = FileCredentialStore::open(&path).unwrap();
        assert!(reopened.get(KEY_TOKEN).await.unwrap().is_none());
        assert_eq!(
            reopened.get(KEY_USERNAME).await.unwrap().as_deref(),
            Some("alice")
        );
    }

    #[test]
    #[serial]
    fn test_open_default_respects_env_override() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("override").join("credentials.json");
        std::env::set_var("CONFAB_CREDENTIALS_FILE", path.to_string_lossy().to_string());

        let store = FileCredentialStore::open_default().expect("open with env override");
        assert_eq!(store.path(), &path);

        std::env::remove_var("CONFAB_CREDENTIALS_FILE");
    }
}
