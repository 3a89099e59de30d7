//! File-backed store with atomic writes.
//!
//! The whole store is one JSON object on disk. Every mutation rewrites it
//! through a temporary file followed by a rename, so an interrupted write
//! never leaves a truncated document behind.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{KeyValueStore, StoreError, StoreResult};

/// Key-value store persisted as `<dir>/<name>.json`.
#[derive(Debug)]
pub struct FileStore {
    /// Path to the JSON document.
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStore {
    /// Opens (or prepares) the store `name` inside `dir`.
    ///
    /// Creates `dir` if it does not exist. The file itself is only created on
    /// the first write.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>, name: &str) -> StoreResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        Ok(Self {
            path: dir.join(format!("{}.json", name)),
            lock: Mutex::new(()),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> StoreResult<BTreeMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(map)?;

        // Temp file lives next to the target so the rename stays on one filesystem
        let temp_path = self.path.with_extension("json.tmp");

        let mut file = fs::File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn mutate<F>(&self, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut map = self.read_map()?;
        if f(&mut map) {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.mutate(|map| {
            map.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.mutate(|map| map.remove(key).is_some())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.read_map()?.into_keys().collect())
    }

    fn clear(&self) -> StoreResult<()> {
        self.mutate(|map| {
            let changed = !map.is_empty();
            map.clear();
            changed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("state").join("local");

        let store = FileStore::open(&nested, "local").unwrap();
        assert!(nested.exists());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_values_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();

        {
            let store = FileStore::open(temp_dir.path(), "local").unwrap();
            store.set("error_logs", "[]").unwrap();
            store.set("theme", "dark").unwrap();
        }

        let reopened = FileStore::open(temp_dir.path(), "local").unwrap();
        assert_eq!(reopened.get("theme").unwrap().as_deref(), Some("dark"));
        assert_eq!(reopened.keys().unwrap().len(), 2);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path(), "session").unwrap();
        store.set("k", "v").unwrap();

        assert!(store.path().exists());
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_reports_json_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path(), "local").unwrap();
        fs::write(store.path(), "{ broken").unwrap();

        assert!(matches!(store.get("k"), Err(StoreError::Json(_))));
    }

    #[test]
    fn test_clear_empties_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path(), "local").unwrap();
        store.set("a", "1").unwrap();
        store.clear().unwrap();
        assert!(store.keys().unwrap().is_empty());
    }
}
