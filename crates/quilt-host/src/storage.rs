//! Durable key-value storage capability.
//!
//! The settings store persists one JSON record under a well-known key. The
//! [`KeyValueStorage`] trait is the seam where the embedding host supplies
//! real durable storage; [`MemoryStorage`] backs tests and ephemeral
//! sessions, and [`FileStorage`] keeps the record in a JSON file on disk.
//!
//! Mirroring browser local storage, writes are best-effort: implementations
//! swallow I/O failures (logging them) rather than surfacing errors to every
//! settings mutation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;

use tracing::warn;

/// Tracing target for storage operations.
const STORAGE_TARGET: &str = "quilt_host::storage";

/// Durable string-to-string storage, in the shape of browser local storage.
pub trait KeyValueStorage {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str);

    /// Removes the value stored under `key`, if any.
    fn remove(&self, key: &str);
}

/// In-memory [`KeyValueStorage`] for tests and remote-mode sessions.
///
/// # Example
///
/// ```
/// use quilt_host::storage::{KeyValueStorage, MemoryStorage};
///
/// let storage = MemoryStorage::new();
/// storage.set("tw:addons", "{}");
/// assert_eq!(storage.get("tw:addons").as_deref(), Some("{}"));
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates storage pre-populated with a single entry.
    #[must_use]
    pub fn with_entry(key: &str, value: &str) -> Self {
        let storage = Self::new();
        storage.set(key, value);
        storage
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
    }

    fn remove(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }
}

/// File-backed [`KeyValueStorage`] keeping all entries in one JSON object.
///
/// Reads parse the file on every call and writes rewrite it whole; the
/// record involved is small. A missing or unreadable file reads as empty.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Creates storage backed by the JSON file at `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_entries(&self) -> HashMap<String, String> {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return HashMap::new();
        };
        match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    target: STORAGE_TARGET,
                    path = %self.path.display(),
                    error = %err,
                    "ignoring unparseable storage file"
                );
                HashMap::new()
            }
        }
    }

    fn write_entries(&self, entries: &HashMap<String, String>) {
        let serialized = match serde_json::to_string(entries) {
            Ok(serialized) => serialized,
            Err(err) => {
                warn!(target: STORAGE_TARGET, error = %err, "failed to serialise storage");
                return;
            }
        };
        if let Err(err) = std::fs::write(&self.path, serialized) {
            warn!(
                target: STORAGE_TARGET,
                path = %self.path.display(),
                error = %err,
                "failed to write storage file"
            );
        }
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.read_entries().remove(key)
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.read_entries();
        entries.insert(key.to_owned(), value.to_owned());
        self.write_entries(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.read_entries();
        if entries.remove(key).is_some() {
            self.write_entries(&entries);
        }
    }
}
