//! Durable key/value storage for the persistent delivery buffer.

use std::{
    collections::HashMap,
    fmt::Debug,
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

/// Error returned by [`DurableStorage`] implementations.
pub type StorageError = Box<dyn std::error::Error + Send + Sync + 'static>;

const AVAILABILITY_PROBE_KEY: &str = "AI_storage_probe";

/// A string key/value store that outlives the pipeline, typically scoped to the current browsing
/// or application session.
pub trait DurableStorage: Debug + Send + Sync {
    /// Value stored under `key`, `None` if the key does not exist.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Whether the store accepts writes. The default implementation writes and removes a probe
    /// key.
    fn is_available(&self) -> bool {
        self.set(AVAILABILITY_PROBE_KEY, AVAILABILITY_PROBE_KEY).is_ok()
            && self.remove(AVAILABILITY_PROBE_KEY).is_ok()
    }
}

/// In-memory [`DurableStorage`].
///
/// Clones share their contents, so a clone handed to a new pipeline sees everything the previous
/// pipeline left behind, the way session storage survives a page reload.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DurableStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock().remove(key);
        Ok(())
    }
}

/// [`DurableStorage`] keeping one file per key in a directory. Survives process restarts.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Use `dir` as the storage directory, creating it if necessary.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(FileStorage { dir })
    }

    /// The storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' | '.' => c,
                _ => '_',
            })
            .collect();
        self.dir.join(file_name)
    }
}

impl DurableStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path(key);
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_clones_share_contents() {
        let storage = MemoryStorage::new();
        let reloaded = storage.clone();
        storage.set("k", "v").unwrap();
        assert_eq!(Some("v".to_string()), reloaded.get("k").unwrap());
        reloaded.remove("k").unwrap();
        assert_eq!(None, storage.get("k").unwrap());
        assert!(storage.is_available());
    }

    #[test]
    fn file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("buffers")).unwrap();
        assert_eq!(None, storage.get("p_AI_buffer").unwrap());
        storage.set("p_AI_buffer", "[\"a\"]").unwrap();
        assert_eq!(
            Some("[\"a\"]".to_string()),
            FileStorage::new(storage.dir()).unwrap().get("p_AI_buffer").unwrap()
        );
        storage.remove("p_AI_buffer").unwrap();
        storage.remove("p_AI_buffer").unwrap();
        assert_eq!(None, storage.get("p_AI_buffer").unwrap());
        assert!(storage.is_available());
    }

    #[test]
    fn file_names_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        storage.set("../escape/key", "v").unwrap();
        assert!(dir.path().join(".._escape_key").exists());
    }
}
