//! Cookie-style storage
//!
//! Models the cookie accessor/mutator contract: entries are scoped to the
//! root path, carry an optional expiry, and an expired entry reads as
//! absent. Deleting writes a negative expiry, matching cookie semantics.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::errors::LayerResult;
use crate::layers::StorageBackend;

#[derive(Debug, Clone)]
struct CookieEntry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

/// In-process cookie jar with per-entry expiry
pub struct CookieJar {
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, CookieEntry>>,
}

impl CookieJar {
    /// Create an empty jar reading time from the given clock
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn is_expired(&self, entry: &CookieEntry) -> bool {
        entry
            .expires_at
            .map(|at| self.clock.now() >= at)
            .unwrap_or(false)
    }
}

impl StorageBackend for CookieJar {
    fn get(&self, key: &str) -> LayerResult<Option<String>> {
        let expired = {
            let entries = self.entries.read().expect("cookie jar lock poisoned");
            match entries.get(key) {
                Some(entry) if self.is_expired(entry) => true,
                Some(entry) => return Ok(Some(entry.value.clone())),
                None => return Ok(None),
            }
        };
        if expired {
            self.entries
                .write()
                .expect("cookie jar lock poisoned")
                .remove(key);
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: &str) -> LayerResult<()> {
        self.entries
            .write()
            .expect("cookie jar lock poisoned")
            .insert(
                key.to_string(),
                CookieEntry {
                    value: value.to_string(),
                    expires_at: None,
                },
            );
        Ok(())
    }

    fn remove(&self, key: &str) -> LayerResult<()> {
        // Negative expiry, like clearing a browser cookie
        self.set_with_expiry(key, "", -1)
    }

    fn set_with_expiry(&self, key: &str, value: &str, expires_days: i64) -> LayerResult<()> {
        let expires_at = self.clock.now() + Duration::days(expires_days);
        self.entries
            .write()
            .expect("cookie jar lock poisoned")
            .insert(
                key.to_string(),
                CookieEntry {
                    value: value.to_string(),
                    expires_at: Some(expires_at),
                },
            );
        Ok(())
    }
}
