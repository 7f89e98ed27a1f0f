//! Key/value storage port
//!
//! All cross-request engine state (tokens, pending flow markers) lives behind
//! this trait. Keys are flat strings; the engine namespaces them as
//! `{identity}.{field}`. Implementations must give read-after-write
//! consistency within one process. Cross-process coordination (conditional
//! writes, locking) is the implementation's business, not the engine's.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::BoxFuture;

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("storage encoding error: {0}")]
    Encoding(String),
}

/// Async key/value store.
pub trait Storage: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StorageError>>;

    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<(), StorageError>>;

    /// Remove one key. Removing a missing key is not an error.
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StorageError>>;

    /// Remove every key starting with `prefix`.
    fn delete_matching<'a>(&'a self, prefix: &'a str)
    -> BoxFuture<'a, Result<(), StorageError>>;
}

/// Process-local store. State dies with the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted snapshot of the stored keys.
    pub async fn keys(&self) -> Vec<String> {
        let entries = self.entries.lock().await;
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Storage for MemoryStorage {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StorageError>> {
        Box::pin(async move { Ok(self.entries.lock().await.get(key).cloned()) })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            self.entries.lock().await.insert(key.to_owned(), value);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            self.entries.lock().await.remove(key);
            Ok(())
        })
    }

    fn delete_matching<'a>(
        &'a self,
        prefix: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            self.entries
                .lock()
                .await
                .retain(|key, _| !key.starts_with(prefix));
            Ok(())
        })
    }
}

/// JSON-file-backed store.
///
/// The whole map is kept in memory and rewritten on every mutation with an
/// atomic temp-file + rename, so a crash mid-write never leaves a truncated
/// file. The file holds tokens and is created with 0600 permissions.
pub struct FileStorage {
    path: PathBuf,
    state: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Open the store at `path`, creating an empty `{}` file if none exists.
    pub async fn load(path: PathBuf) -> Result<Self, StorageError> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| StorageError::Io(format!("reading storage file: {e}")))?;
            let entries: HashMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| StorageError::Encoding(format!("parsing storage file: {e}")))?;
            info!(path = %path.display(), keys = entries.len(), "loaded token storage");
            entries
        } else {
            info!(path = %path.display(), "storage file not found, starting empty");
            let entries = HashMap::new();
            write_atomic(&path, &entries).await?;
            entries
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StorageError>> {
        Box::pin(async move { Ok(self.state.lock().await.get(key).cloned()) })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let mut next = state.clone();
            next.insert(key.to_owned(), value);
            write_atomic(&self.path, &next).await?;
            *state = next;
            debug!(key, "stored value");
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if !state.contains_key(key) {
                return Ok(());
            }
            let mut next = state.clone();
            next.remove(key);
            write_atomic(&self.path, &next).await?;
            *state = next;
            debug!(key, "deleted value");
            Ok(())
        })
    }

    fn delete_matching<'a>(
        &'a self,
        prefix: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let mut next = state.clone();
            next.retain(|key, _| !key.starts_with(prefix));
            let removed = state.len() - next.len();
            if removed > 0 {
                write_atomic(&self.path, &next).await?;
                *state = next;
                debug!(prefix, removed, "deleted matching values");
            }
            Ok(())
        })
    }
}

/// Write the map to `path` via a sibling temp file and rename.
async fn write_atomic(path: &Path, data: &HashMap<String, String>) -> Result<(), StorageError> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| StorageError::Encoding(format!("serializing storage: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| StorageError::Io("storage path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".authkit-storage.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| StorageError::Io(format!("writing temp storage file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| StorageError::Io(format!("setting storage file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| StorageError::Io(format!("renaming temp storage file: {e}")))?;

    debug!(path = %path.display(), "persisted storage");
    Ok(())
}
