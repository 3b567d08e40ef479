//! File-backed durable storage
//!
//! The "local" layer: a flat string key/value map persisted as a JSON
//! object on disk, written through on every mutation so values survive
//! process restarts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::errors::{LayerError, LayerResult};
use crate::layers::StorageBackend;

/// Durable string store persisted to a single JSON file
#[derive(Debug)]
pub struct FileBackend {
    file: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileBackend {
    /// Open (or create) a file-backed store
    ///
    /// # Errors
    ///
    /// Returns `LayerError::Io` when the file exists but cannot be read,
    /// or `LayerError::Serialization` when its contents are not a JSON
    /// string map.
    pub fn open(file: impl AsRef<Path>) -> LayerResult<Self> {
        let file = file.as_ref().to_path_buf();
        let entries = if file.exists() {
            let raw = std::fs::read_to_string(&file)?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            if let Some(parent) = file.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            HashMap::new()
        };

        Ok(Self {
            file,
            entries: RwLock::new(entries),
        })
    }

    fn flush(&self, entries: &HashMap<String, String>) -> LayerResult<()> {
        let raw = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.file, raw).map_err(LayerError::from)
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> LayerResult<Option<String>> {
        Ok(self
            .entries
            .read()
            .expect("file backend lock poisoned")
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> LayerResult<()> {
        let mut entries = self.entries.write().expect("file backend lock poisoned");
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> LayerResult<()> {
        let mut entries = self.entries.write().expect("file backend lock poisoned");
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}
