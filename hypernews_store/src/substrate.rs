//! Key-value persistence substrate.
//!
//! The engine treats local durability as a plain string-keyed record
//! space. [`FileStore`] maps each key to a file under a data directory;
//! [`MemoryStore`] backs tests and memory-only sessions.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Failures raised by a persistence substrate.
#[derive(Debug, thiserror::Error)]
pub enum SubstrateError {
    #[error("substrate i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Minimal durable record space owned by the conversation store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, SubstrateError>;
    fn set(&self, key: &str, value: &str) -> Result<(), SubstrateError>;
    fn remove(&self, key: &str) -> Result<(), SubstrateError>;
}

/// In-memory substrate. Cloning shares the underlying map, which lets a
/// test reopen a store over the same records.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, SubstrateError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SubstrateError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SubstrateError> {
        self.entries().remove(key);
        Ok(())
    }
}

/// File-backed substrate: one file per key under a data directory.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens (and creates if needed) the data directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SubstrateError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keys may carry conversation ids from the remote. Every byte that
    /// is not filename-safe is escaped as `_` plus two hex digits (and
    /// `_` itself escapes too), so distinct keys never share a file.
    fn path_for(&self, key: &str) -> PathBuf {
        let mut safe = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                safe.push(char::from(byte));
            } else {
                safe.push('_');
                safe.push(char::from_digit(u32::from(byte >> 4), 16).unwrap_or('0'));
                safe.push(char::from_digit(u32::from(byte & 0xf), 16).unwrap_or('0'));
            }
        }
        self.root.join(format!("{safe}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, SubstrateError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SubstrateError> {
        fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SubstrateError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.get("missing").unwrap().is_none());

        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));

        store.remove("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn memory_store_clones_share_records() {
        let store = MemoryStore::new();
        let alias = store.clone();
        store.set("k", "v").unwrap();
        assert_eq!(alias.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("data")).unwrap();

        store.set("hypernews_chat_conv_1", "[]").unwrap();
        assert_eq!(
            store.get("hypernews_chat_conv_1").unwrap().as_deref(),
            Some("[]")
        );

        // Removing twice is not an error.
        store.remove("hypernews_chat_conv_1").unwrap();
        store.remove("hypernews_chat_conv_1").unwrap();
        assert!(store.get("hypernews_chat_conv_1").unwrap().is_none());
    }

    #[test]
    fn file_store_escapes_unsafe_key_characters() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.set("weird/..key", "v").unwrap();
        assert_eq!(store.get("weird/..key").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn keys_differing_only_in_escaped_bytes_stay_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.set("a/b", "slash").unwrap();
        store.set("a_b", "underscore").unwrap();

        assert_eq!(store.get("a/b").unwrap().as_deref(), Some("slash"));
        assert_eq!(store.get("a_b").unwrap().as_deref(), Some("underscore"));
    }
}
