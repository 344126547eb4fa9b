//! Durable key-value storage for local state.
//!
//! A tiny localStorage analog: JSON strings by key, surviving restarts.
//! Storage failures are never fatal to callers — a failed write is logged
//! and reported as `false`, leaving whatever was persisted before intact.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Key-value persistence used by the cache and the delete queue.
pub trait Storage: Send + Sync {
    /// Read the stored value, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value. Returns false (after logging) on failure.
    fn put(&self, key: &str, value: &str) -> bool;

    /// Remove a value. Removing a missing key is a no-op.
    fn remove(&self, key: &str);
}

/// File-per-key storage rooted at a directory.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open (creating if needed) a storage directory.
    pub fn new(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path(key)).ok()
    }

    fn put(&self, key: &str, value: &str) -> bool {
        // Stage in a temp file and rename; a partial write never
        // replaces the previous value.
        let path = self.path(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        let result = fs::write(&tmp, value).and_then(|_| fs::rename(&tmp, &path));
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to persist local state");
                false
            }
        }
    }

    fn remove(&self, key: &str) {
        let _ = fs::remove_file(self.path(key));
    }
}

/// In-memory storage for tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().expect("storage lock poisoned").get(key).cloned()
    }

    fn put(&self, key: &str, value: &str) -> bool {
        self.map
            .lock()
            .expect("storage lock poisoned")
            .insert(key.to_string(), value.to_string());
        true
    }

    fn remove(&self, key: &str) {
        self.map.lock().expect("storage lock poisoned").remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("divvy-storage-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn file_storage_roundtrip() {
        let dir = temp_dir();
        let storage = FileStorage::new(&dir).unwrap();

        assert!(storage.get("groups").is_none());
        assert!(storage.put("groups", "[]"));
        assert_eq!(storage.get("groups").as_deref(), Some("[]"));

        storage.remove("groups");
        assert!(storage.get("groups").is_none());

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn file_storage_survives_reopen() {
        let dir = temp_dir();
        {
            let storage = FileStorage::new(&dir).unwrap();
            storage.put("current_user", r#"{"id":"alice1234"}"#);
        }
        let storage = FileStorage::new(&dir).unwrap();
        assert!(storage.get("current_user").unwrap().contains("alice1234"));

        fs::remove_dir_all(dir).unwrap();
    }
}
