//! Process-lifetime string storage
//!
//! The "session" layer: same contract as the durable file layer but held
//! only in memory, so values vanish when the process exits.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::errors::LayerResult;
use crate::layers::StorageBackend;

/// In-process string key/value store
#[derive(Debug, Default)]
pub struct SessionBackend {
    entries: RwLock<HashMap<String, String>>,
}

impl SessionBackend {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for SessionBackend {
    fn get(&self, key: &str) -> LayerResult<Option<String>> {
        Ok(self
            .entries
            .read()
            .expect("session backend lock poisoned")
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> LayerResult<()> {
        self.entries
            .write()
            .expect("session backend lock poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> LayerResult<()> {
        self.entries
            .write()
            .expect("session backend lock poisoned")
            .remove(key);
        Ok(())
    }
}
