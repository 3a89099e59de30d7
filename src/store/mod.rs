//! Local key-value persistence.
//!
//! This module stands in for the browser's local and session storage. All
//! persisted state (error log, recovery history, per-strategy success rates and
//! the component/pattern state keys cleared by scoped resets) goes through the
//! [`KeyValueStore`] trait so services can run against memory in tests and a
//! JSON file on disk elsewhere.

pub mod file;

pub use file::FileStore;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while reading or writing a store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A writer panicked while holding the store lock.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// String-keyed, string-valued storage with the semantics of web storage.
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> StoreResult<()>;

    /// Lists every key currently stored.
    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Removes every key.
    fn clear(&self) -> StoreResult<()> {
        for key in self.keys()? {
            self.remove(&key)?;
        }
        Ok(())
    }
}

/// Reads and deserializes a JSON value.
///
/// Returns `Ok(None)` when the key is missing.
pub fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> StoreResult<Option<T>> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serializes `value` as JSON and stores it under `key`.
pub fn set_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> StoreResult<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

/// Appends `item` to the JSON array stored under `key`, keeping only the
/// `capacity` most recent entries.
///
/// A value that no longer parses as an array of `T` is replaced rather than
/// failing the append.
pub fn push_bounded<T>(
    store: &dyn KeyValueStore,
    key: &str,
    item: T,
    capacity: usize,
) -> StoreResult<usize>
where
    T: Serialize + DeserializeOwned,
{
    let mut entries: Vec<T> = match get_json(store, key) {
        Ok(Some(entries)) => entries,
        Ok(None) => Vec::new(),
        Err(StoreError::Json(e)) => {
            tracing::warn!(key, error = %e, "discarding unreadable persisted array");
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    entries.push(item);
    if entries.len() > capacity {
        let excess = entries.len() - capacity;
        entries.drain(..excess);
    }

    set_json(store, key, &entries)?;
    Ok(entries.len())
}

/// Removes every key that starts with one of `prefixes`.
///
/// Returns the removed keys.
pub fn remove_prefixed(store: &dyn KeyValueStore, prefixes: &[String]) -> StoreResult<Vec<String>> {
    let mut removed = Vec::new();
    for key in store.keys()? {
        if prefixes.iter().any(|prefix| key.starts_with(prefix.as_str())) {
            store.remove(&key)?;
            removed.push(key);
        }
    }
    Ok(removed)
}

/// In-memory store. Cloning yields a handle to the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.keys().cloned().collect())
    }

    fn clear(&self) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_set_get_remove() {
        let store = MemoryStore::new();
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));

        store.remove("a").unwrap();
        assert!(store.get("a").unwrap().is_none());

        // Removing again is fine
        store.remove("a").unwrap();
    }

    #[test]
    fn test_memory_store_clones_share_state() {
        let store = MemoryStore::new();
        let handle = store.clone();
        handle.set("shared", "yes").unwrap();
        assert_eq!(store.get("shared").unwrap().as_deref(), Some("yes"));
    }

    #[test]
    fn test_push_bounded_keeps_newest() {
        let store = MemoryStore::new();
        for i in 0..60u32 {
            push_bounded(&store, "log", i, 50).unwrap();
        }

        let entries: Vec<u32> = get_json(&store, "log").unwrap().unwrap();
        assert_eq!(entries.len(), 50);
        assert_eq!(entries.first(), Some(&10));
        assert_eq!(entries.last(), Some(&59));
    }

    #[test]
    fn test_push_bounded_replaces_corrupt_value() {
        let store = MemoryStore::new();
        store.set("log", "not json").unwrap();

        let len = push_bounded(&store, "log", 7u32, 50).unwrap();
        assert_eq!(len, 1);
    }

    #[test]
    fn test_remove_prefixed() {
        let store = MemoryStore::new();
        store.set("pattern_state_quiz", "{}").unwrap();
        store.set("pattern_state_quiz_step", "2").unwrap();
        store.set("pattern_state_poll", "{}").unwrap();
        store.set("unrelated", "x").unwrap();

        let removed = remove_prefixed(&store, &["pattern_state_quiz".to_string()]).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(store.get("pattern_state_poll").unwrap().is_some());
        assert!(store.get("unrelated").unwrap().is_some());
    }

    #[test]
    fn test_default_clear_removes_everything() {
        let store = MemoryStore::new();
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        store.clear().unwrap();
        assert!(store.is_empty());
    }
}
