//! In-memory typed cache
//!
//! Fast path in front of the durable layers. Holds values as parsed JSON
//! (possibly still inside their TTL envelope) with no serialization.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;

/// Process-lifetime key → value cache
#[derive(Debug, Default)]
pub struct MemoryLayer {
    cache: RwLock<HashMap<String, Value>>,
}

impl MemoryLayer {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a cached value
    pub fn get(&self, key: &str) -> Option<Value> {
        self.cache
            .read()
            .expect("memory cache lock poisoned")
            .get(key)
            .cloned()
    }

    /// Store a value
    pub fn set(&self, key: &str, value: Value) {
        self.cache
            .write()
            .expect("memory cache lock poisoned")
            .insert(key.to_string(), value);
    }

    /// Delete a value
    pub fn delete(&self, key: &str) {
        self.cache
            .write()
            .expect("memory cache lock poisoned")
            .remove(key);
    }

    /// Drop every cached entry
    pub fn clear(&self) {
        self.cache
            .write()
            .expect("memory cache lock poisoned")
            .clear();
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.cache.read().expect("memory cache lock poisoned").len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
