//! Durable key-value store contract
//!
//! The shell only needs a handful of string values under fixed keys (the
//! pending-change log and a couple of preferences), so the contract is a
//! plain get/put/remove over strings.

use crate::error::PersistenceError;
use dashmap::DashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Durable key-value store
pub trait Persistence: Send + Sync {
    /// Read a value; `Ok(None)` when the key was never written
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Overwrite a value
    fn put(&self, key: &str, value: &str) -> Result<(), PersistenceError>;

    /// Delete a value; deleting a missing key succeeds
    fn remove(&self, key: &str) -> Result<(), PersistenceError>;
}

/// In-process store, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been written
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Persistence for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn put(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Directory-backed store, one file per key
///
/// Writes land in a hidden temp file that is renamed over the target, so a
/// reader never sees a half-written value.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`
    ///
    /// # Errors
    /// - `PersistenceError::Io` if the directory cannot be created
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| PersistenceError::Io {
            key: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Directory holding the values
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File name for `key`
    ///
    /// Bytes outside `[A-Za-z0-9_-]` are written as `%XX`, and `%` itself is
    /// escaped, so distinct keys never share a file.
    fn file_name(key: &str) -> String {
        let mut name = String::with_capacity(key.len() + 5);
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                name.push(char::from(byte));
            } else {
                name.push_str(&format!("%{byte:02X}"));
            }
        }
        name.push_str(".json");
        name
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(Self::file_name(key))
    }

    fn io_error(key: &str, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            key: key.to_string(),
            source,
        }
    }
}

impl Persistence for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(key, e)),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let target = self.path_for(key);
        let staging = self.root.join(format!(".{}.tmp", Self::file_name(key)));
        fs::write(&staging, value).map_err(|e| Self::io_error(key, e))?;
        fs::rename(&staging, &target).map_err(|e| Self::io_error(key, e))
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(key, e)),
        }
    }
}
