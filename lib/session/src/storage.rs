//! Persisted key-value slots.
//!
//! The coordinator owns exactly one durable value (the remembered
//! destination). Storage is treated as fallible: every operation returns a
//! `StorageError` instead of panicking, and callers decide how to degrade.

use rootcause::prelude::Report;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::error::StorageError;

/// A fallible string key-value store.
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, Report<StorageError>>;

    /// Stores `value` under `key`, replacing any existing value.
    fn set(&self, key: &str, value: &str) -> Result<(), Report<StorageError>>;

    /// Removes the value stored under `key`. Removing a missing key succeeds.
    fn remove(&self, key: &str) -> Result<(), Report<StorageError>>;
}

/// Key-value store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, Report<StorageError>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Report<StorageError>> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Report<StorageError>> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

/// Key-value store persisted as a JSON object in a single file.
///
/// Values survive a process restart. Writes go to a sibling temporary file
/// that is renamed over the original, so a crash never leaves a torn file.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileKeyValueStore {
    /// Creates a store backed by `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self, key: &str) -> Result<HashMap<String, String>, StorageError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                return Err(StorageError::ReadFailed {
                    key: key.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }

        serde_json::from_str(&contents).map_err(|e| StorageError::ReadFailed {
            key: key.to_string(),
            reason: format!("corrupt storage file {}: {e}", self.path.display()),
        })
    }

    fn persist(&self, key: &str, values: &HashMap<String, String>) -> Result<(), StorageError> {
        let write_failed = |reason: String| StorageError::WriteFailed {
            key: key.to_string(),
            reason,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| write_failed(e.to_string()))?;
            }
        }

        let json = serde_json::to_string_pretty(values).map_err(|e| write_failed(e.to_string()))?;
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, json).map_err(|e| write_failed(e.to_string()))?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| write_failed(e.to_string()))?;
        Ok(())
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, Report<StorageError>> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut values = self.load(key)?;
        Ok(values.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Report<StorageError>> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut values = self.load(key)?;
        values.insert(key.to_string(), value.to_string());
        self.persist(key, &values)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Report<StorageError>> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut values = self.load(key)?;
        if values.remove(key).is_some() {
            self.persist(key, &values)?;
        }
        Ok(())
    }
}
