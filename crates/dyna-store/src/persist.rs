//! Persistence orchestration
//!
//! Everything between the manager and the raw layer adapters lives here:
//! per-path persist configuration, the TTL envelope, the per-key debounced
//! write table, and the fan-out/fallback logic across configured layers.
//! Layer failures are recorded per layer and logged; they never abort the
//! remaining layers or surface to callers.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::clock::Clock;
use crate::errors::LayerResult;
use crate::layers::{LayerKind, LayerStack};
use crate::serializer::{JsonSerializer, Serializer};

/// Envelope marker key for TTL-wrapped payloads
pub const TTL_META_KEY: &str = "__dyna_meta";

/// Absolute-expiry field inside the envelope metadata
pub const TTL_EXPIRES_FIELD: &str = "expiresAt";

/// Default delay for coalescing durable writes
pub const DEFAULT_WRITE_DELAY: Duration = Duration::from_millis(150);

const MILLIS_PER_DAY: i64 = 24 * 3600 * 1000;

/// Per-path persistence configuration
///
/// One entry per path the application wants durable. The last
/// configuration registered for a path wins.
#[derive(Clone)]
pub struct PersistConfig {
    /// Dot-path into the state tree
    pub path: String,
    /// Backends to write through, in fallback order
    pub layers: Vec<LayerKind>,
    /// Lifetime after which a persisted value reads as absent
    pub ttl_ms: Option<i64>,
    /// Storage key override (defaults to `path`)
    pub key: Option<String>,
    /// Codec override (defaults to plain JSON)
    pub serializer: Option<Arc<dyn Serializer>>,
}

impl PersistConfig {
    /// Configure persistence for a path through the given layers
    pub fn new(path: impl Into<String>, layers: Vec<LayerKind>) -> Self {
        Self {
            path: path.into(),
            layers,
            ttl_ms: None,
            key: None,
            serializer: None,
        }
    }

    /// Set a lifetime in milliseconds
    pub fn with_ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    /// Override the storage key
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Override the codec
    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Storage key for this entry
    pub fn storage_key(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.path)
    }

    /// Whether this entry writes to any durable layer
    pub fn persists(&self) -> bool {
        !self.layers.is_empty() && !self.layers.contains(&LayerKind::None)
    }

    pub(crate) fn serializer(&self) -> Arc<dyn Serializer> {
        self.serializer
            .clone()
            .unwrap_or_else(|| Arc::new(JsonSerializer))
    }

    /// Cookie lifetime derived from the TTL, one year when unset
    pub(crate) fn cookie_expiry_days(&self) -> i64 {
        match self.ttl_ms {
            Some(ttl) if ttl > 0 => (ttl + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY,
            _ => 365,
        }
    }
}

impl fmt::Debug for PersistConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistConfig")
            .field("path", &self.path)
            .field("layers", &self.layers)
            .field("ttl_ms", &self.ttl_ms)
            .field("key", &self.key)
            .field("custom_serializer", &self.serializer.is_some())
            .finish()
    }
}

/// Result of unwrapping a possibly-enveloped payload
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Unwrapped {
    /// The inner (or plain) value, still alive
    Live(Value),
    /// The envelope's expiry has passed
    Expired,
}

/// Wrap a value in a TTL envelope when the entry carries a lifetime
pub(crate) fn wrap_ttl(cfg: &PersistConfig, value: Value, clock: &dyn Clock) -> Value {
    let Some(ttl_ms) = cfg.ttl_ms else {
        return value;
    };
    let mut meta = serde_json::Map::new();
    meta.insert(
        TTL_EXPIRES_FIELD.to_string(),
        Value::from(clock.now_millis() + ttl_ms),
    );
    let mut envelope = serde_json::Map::new();
    envelope.insert(TTL_META_KEY.to_string(), Value::Object(meta));
    envelope.insert("value".to_string(), value);
    Value::Object(envelope)
}

/// Unwrap a stored payload, honoring the envelope's expiry
pub(crate) fn unwrap_ttl(data: &Value, now_ms: i64) -> Unwrapped {
    let Some(meta) = data.get(TTL_META_KEY) else {
        return Unwrapped::Live(data.clone());
    };
    if let Some(expires_at) = meta.get(TTL_EXPIRES_FIELD).and_then(Value::as_i64) {
        if now_ms > expires_at {
            return Unwrapped::Expired;
        }
    }
    Unwrapped::Live(data.get("value").cloned().unwrap_or(Value::Null))
}

struct PendingWrite {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Per-key table of scheduled durable writes
///
/// A second write to a key before its timer fires aborts the pending task
/// and reschedules, so only the latest value ever flushes.
pub(crate) struct DebouncedWriter {
    delay: Duration,
    generation: AtomicU64,
    timers: Mutex<HashMap<String, PendingWrite>>,
}

impl DebouncedWriter {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: AtomicU64::new(0),
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Schedule `flush` to run after the write delay, replacing any write
    /// already pending for the key
    pub(crate) fn schedule(self: &Arc<Self>, key: &str, flush: impl FnOnce() + Send + 'static) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let writer = Arc::clone(self);
        let task_key = key.to_string();
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            flush();
            let mut timers = writer.timers.lock().expect("write timer lock poisoned");
            if timers.get(&task_key).map(|p| p.generation) == Some(generation) {
                timers.remove(&task_key);
            }
        });

        let mut timers = self.timers.lock().expect("write timer lock poisoned");
        if let Some(previous) = timers.insert(
            key.to_string(),
            PendingWrite { generation, handle },
        ) {
            previous.handle.abort();
        }
    }

    /// Abort a pending write; true when one was pending
    pub(crate) fn cancel(&self, key: &str) -> bool {
        let mut timers = self.timers.lock().expect("write timer lock poisoned");
        match timers.remove(key) {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Number of keys with a write still pending
    pub(crate) fn pending(&self) -> usize {
        self.timers.lock().expect("write timer lock poisoned").len()
    }
}

/// Outcome of one layer touched by a write/clear pass
#[derive(Debug)]
pub(crate) struct LayerOutcome {
    pub layer: LayerKind,
    pub result: LayerResult<()>,
}

/// Outcome of a layered read
#[derive(Debug)]
pub(crate) struct ReadOutcome {
    /// The resolved value, if any layer produced one
    pub value: Option<Value>,
    /// Whether an expired envelope was encountered and cleaned up
    pub expired: bool,
}

/// Orchestrates reads and writes across the layer stack
pub(crate) struct Persistence {
    layers: Arc<LayerStack>,
    writer: Arc<DebouncedWriter>,
    clock: Arc<dyn Clock>,
}

impl Persistence {
    pub(crate) fn new(
        layers: Arc<LayerStack>,
        writer: Arc<DebouncedWriter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            layers,
            writer,
            clock,
        }
    }

    /// Wrap a value per the entry's TTL
    pub(crate) fn envelope(&self, cfg: &PersistConfig, value: Value) -> Value {
        wrap_ttl(cfg, value, self.clock.as_ref())
    }

    /// Schedule a debounced write of an already-enveloped payload
    pub(crate) fn schedule_write(&self, cfg: &PersistConfig, payload: Value) {
        if !cfg.persists() {
            return;
        }
        let serialized = match cfg.serializer().serialize(&payload) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    storage_key = cfg.storage_key(),
                    err_code = error.code(),
                    %error,
                    "skipping persist, payload failed to serialize"
                );
                return;
            }
        };

        let layers = Arc::clone(&self.layers);
        let kinds = cfg.layers.clone();
        let key = cfg.storage_key().to_string();
        let days = cfg.cookie_expiry_days();
        let flush_key = key.clone();
        self.writer.schedule(&key, move || {
            write_layers(&layers, &kinds, &flush_key, &payload, &serialized, days);
        });
    }

    /// Read through memory → fallback → configured layers
    ///
    /// The first live value wins and is back-filled into memory. An
    /// expired envelope found anywhere marks the path expired and clears
    /// it from every configured layer.
    pub(crate) fn read(&self, cfg: &PersistConfig, fallback: Option<Value>) -> ReadOutcome {
        let key = cfg.storage_key();
        let now_ms = self.clock.now_millis();
        let mut expired = false;

        if let Some(cached) = self.layers.memory().get(key) {
            match unwrap_ttl(&cached, now_ms) {
                Unwrapped::Live(value) => {
                    return ReadOutcome {
                        value: Some(value),
                        expired: false,
                    }
                }
                Unwrapped::Expired => {
                    self.clear(cfg);
                    expired = true;
                }
            }
        }

        if !expired {
            if let Some(value) = fallback {
                return ReadOutcome {
                    value: Some(value),
                    expired: false,
                };
            }
        }

        for kind in &cfg.layers {
            let Some(backend) = self.layers.backend(*kind) else {
                continue;
            };
            let raw = match backend.get(key) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(error) => {
                    warn!(
                        layer = %kind,
                        storage_key = key,
                        err_code = error.code(),
                        %error,
                        "layer read failed, skipping"
                    );
                    continue;
                }
            };
            let data = match cfg.serializer().deserialize(&raw) {
                Ok(data) => data,
                Err(error) => {
                    warn!(
                        layer = %kind,
                        storage_key = key,
                        err_code = error.code(),
                        %error,
                        "stored payload failed to decode, skipping"
                    );
                    continue;
                }
            };
            match unwrap_ttl(&data, now_ms) {
                Unwrapped::Live(value) => {
                    // Back-fill so the next read hits the fast path
                    self.layers.memory().set(key, data);
                    return ReadOutcome {
                        value: Some(value),
                        expired,
                    };
                }
                Unwrapped::Expired => {
                    self.clear(cfg);
                    expired = true;
                }
            }
        }

        ReadOutcome {
            value: None,
            expired,
        }
    }

    /// Remove the entry from the memory cache and every configured layer,
    /// aborting any pending write for its key
    pub(crate) fn clear(&self, cfg: &PersistConfig) -> Vec<LayerOutcome> {
        let key = cfg.storage_key();
        self.writer.cancel(key);
        self.layers.memory().delete(key);

        let mut outcomes = Vec::new();
        for kind in &cfg.layers {
            let Some(backend) = self.layers.backend(*kind) else {
                continue;
            };
            let result = backend.remove(key);
            if let Err(error) = &result {
                warn!(
                    layer = %kind,
                    storage_key = key,
                    err_code = error.code(),
                    %error,
                    "layer clear failed, skipping"
                );
            }
            outcomes.push(LayerOutcome {
                layer: *kind,
                result,
            });
        }
        outcomes
    }

    #[cfg(test)]
    pub(crate) fn write_now(&self, cfg: &PersistConfig, payload: &Value) -> Vec<LayerOutcome> {
        let serialized = cfg
            .serializer()
            .serialize(payload)
            .expect("test payload must serialize");
        write_layers(
            &self.layers,
            &cfg.layers,
            cfg.storage_key(),
            payload,
            &serialized,
            cfg.cookie_expiry_days(),
        )
    }
}

/// Fan a payload out to the given layers, logging and skipping failures
fn write_layers(
    layers: &LayerStack,
    kinds: &[LayerKind],
    key: &str,
    payload: &Value,
    serialized: &str,
    expiry_days: i64,
) -> Vec<LayerOutcome> {
    let mut outcomes = Vec::new();
    for kind in kinds {
        let result = match kind {
            LayerKind::Memory => {
                layers.memory().set(key, payload.clone());
                Ok(())
            }
            LayerKind::Cookie => match layers.backend(*kind) {
                Some(backend) => backend.set_with_expiry(key, serialized, expiry_days),
                None => continue,
            },
            LayerKind::Local | LayerKind::Session => match layers.backend(*kind) {
                Some(backend) => backend.set(key, serialized),
                None => continue,
            },
            LayerKind::None => continue,
        };
        if let Err(error) = &result {
            warn!(
                layer = %kind,
                storage_key = key,
                err_code = error.code(),
                %error,
                "layer write failed, skipping"
            );
        }
        outcomes.push(LayerOutcome {
            layer: *kind,
            result,
        });
    }
    outcomes
}
