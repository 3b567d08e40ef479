//! Path-addressable state manager
//!
//! `DynaManager` layers the reactive store, the memory cache and the
//! configured durable backends behind one async surface:
//! `get`/`set`/`merge`/`bulk_set`/`reset`/`subscribe`/`configure_persist`.
//! Persistence is best-effort — the reactive store is the authority of
//! record and manager operations never fail because a layer did.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::layers::LayerStack;
use crate::path::{get_path, merge_objects};
use crate::persist::{
    unwrap_ttl, DebouncedWriter, Persistence, PersistConfig, Unwrapped, DEFAULT_WRITE_DELAY,
};
use crate::state::{Action, StateStore};
use crate::subscription::{SubscriberCallback, SubscriberEntry, Subscription};

/// Builder for a [`DynaManager`]
///
/// Everything is injectable: the layer stack, the reactive store, the
/// debounce delay and the clock.
pub struct DynaManagerBuilder {
    layers: Option<Arc<LayerStack>>,
    store: Option<Arc<StateStore>>,
    write_delay: Duration,
    clock: Arc<dyn Clock>,
}

impl DynaManagerBuilder {
    fn new() -> Self {
        Self {
            layers: None,
            store: None,
            write_delay: DEFAULT_WRITE_DELAY,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use an explicit layer stack
    pub fn with_layers(mut self, layers: Arc<LayerStack>) -> Self {
        self.layers = Some(layers);
        self
    }

    /// Use an explicit reactive store
    pub fn with_store(mut self, store: Arc<StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the durable-write debounce delay
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    /// Override the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Assemble the manager
    pub fn build(self) -> DynaManager {
        let clock = self.clock;
        let layers = self
            .layers
            .unwrap_or_else(|| Arc::new(LayerStack::ephemeral_with_clock(clock.clone())));
        let store = self.store.unwrap_or_else(|| Arc::new(StateStore::new()));
        let writer = Arc::new(DebouncedWriter::new(self.write_delay));
        let persistence = Persistence::new(layers.clone(), writer, clock.clone());

        DynaManager {
            store,
            layers,
            persistence,
            persist_map: RwLock::new(HashMap::new()),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            clock,
        }
    }
}

/// Keyed state store with layered persistence and change subscriptions
pub struct DynaManager {
    store: Arc<StateStore>,
    layers: Arc<LayerStack>,
    persistence: Persistence,
    persist_map: RwLock<HashMap<String, PersistConfig>>,
    subscribers: Arc<Mutex<Vec<SubscriberEntry>>>,
    clock: Arc<dyn Clock>,
}

impl DynaManager {
    /// Start building a manager
    pub fn builder() -> DynaManagerBuilder {
        DynaManagerBuilder::new()
    }

    /// Manager with in-process backends and the system clock
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// The underlying reactive store
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// The layer stack this manager writes through
    pub fn layers(&self) -> &Arc<LayerStack> {
        &self.layers
    }

    /// Register persist configuration; the last entry for a path wins
    pub fn configure_persist(&self, entries: Vec<PersistConfig>) {
        let mut map = self.persist_map.write().expect("persist map lock poisoned");
        for entry in entries {
            map.insert(entry.path.clone(), entry);
        }
    }

    /// Read a path (or the whole tree when `path` is `None`)
    ///
    /// Paths without persist configuration read straight from the
    /// reactive store. Configured paths fall back memory cache →
    /// reactive store → durable layers, honoring TTL expiry.
    pub async fn get(&self, path: Option<&str>) -> Option<Value> {
        let Some(path) = path else {
            return Some(self.store.get_state());
        };

        let cfg = self.config_for(path);
        let store_value = get_path(&self.store.get_state(), path).cloned();
        let Some(cfg) = cfg else {
            return store_value;
        };

        let outcome = self.persistence.read(&cfg, store_value);
        if outcome.expired && outcome.value.is_none() {
            // The stale tree entry must not resurrect an expired value
            self.store.dispatch(Action::SetPath {
                path: path.to_string(),
                value: None,
            });
        }
        outcome.value
    }

    /// Replace the value at a path
    pub async fn set(&self, path: &str, value: Value) {
        debug!(path, "set");
        self.store.dispatch(Action::SetPath {
            path: path.to_string(),
            value: Some(value.clone()),
        });

        match self.config_for(path) {
            Some(cfg) => {
                let payload = self.persistence.envelope(&cfg, value);
                self.layers.memory().set(cfg.storage_key(), payload.clone());
                self.persistence.schedule_write(&cfg, payload);
            }
            None => self.layers.memory().set(path, value),
        }

        self.notify_path(path).await;
    }

    /// Shallow-merge an object onto the value at a path
    pub async fn merge(&self, path: &str, value: Value) {
        debug!(path, "merge");
        let cfg = self.config_for(path);
        let key = cfg
            .as_ref()
            .map(|c| c.storage_key().to_string())
            .unwrap_or_else(|| path.to_string());

        let previous = self
            .cached_live_value(&key)
            .or_else(|| get_path(&self.store.get_state(), path).cloned());
        let merged = merge_objects(previous.as_ref(), &value);

        self.store.dispatch(Action::MergePath {
            path: path.to_string(),
            value,
        });

        match cfg {
            Some(cfg) => {
                let payload = self.persistence.envelope(&cfg, merged);
                self.layers.memory().set(&key, payload.clone());
                self.persistence.schedule_write(&cfg, payload);
            }
            None => self.layers.memory().set(&key, merged),
        }

        self.notify_path(path).await;
    }

    /// Apply several path replacements as one store transaction
    ///
    /// Unlike `set`, this notifies every subscriber afterwards, not just
    /// those watching a written path.
    pub async fn bulk_set(&self, values: HashMap<String, Value>) {
        debug!(paths = values.len(), "bulk_set");
        self.store.dispatch(Action::BulkSet(values.clone()));

        for (path, value) in values {
            match self.config_for(&path) {
                Some(cfg) => {
                    let payload = self.persistence.envelope(&cfg, value);
                    self.layers.memory().set(cfg.storage_key(), payload.clone());
                    self.persistence.schedule_write(&cfg, payload);
                }
                None => self.layers.memory().set(&path, value),
            }
        }

        self.notify_all().await;
    }

    /// Replace the whole tree and re-derive every persisted entry
    pub async fn reset(&self, next: Option<Value>) {
        debug!(seeded = next.is_some(), "reset");
        self.store.dispatch(Action::Reset(next.clone()));
        self.layers.memory().clear();

        let entries: Vec<PersistConfig> = {
            let map = self.persist_map.read().expect("persist map lock poisoned");
            map.values().cloned().collect()
        };
        for cfg in entries {
            let derived = next
                .as_ref()
                .and_then(|tree| get_path(tree, &cfg.path).cloned());
            match derived {
                Some(value) => {
                    let payload = self.persistence.envelope(&cfg, value);
                    self.persistence.schedule_write(&cfg, payload);
                }
                None => {
                    self.persistence.clear(&cfg);
                }
            }
        }

        self.notify_all().await;
    }

    /// Register a change subscriber for a path (or the whole tree)
    ///
    /// The callback is invoked once with the current value, then again
    /// whenever the observed value changes; consecutive structurally
    /// equal values are suppressed.
    pub async fn subscribe(
        &self,
        callback: impl Fn(Option<Value>) + Send + Sync + 'static,
        path: Option<&str>,
    ) -> Subscription {
        let id = Uuid::now_v7();
        let callback: SubscriberCallback = Arc::new(callback);
        {
            let mut subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
            subscribers.push(SubscriberEntry {
                id,
                path: path.map(str::to_string),
                callback: callback.clone(),
                last: None,
            });
        }

        // Initial delivery of the current value
        let value = self.get(path).await;
        let still_subscribed = {
            let mut subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
            match subscribers.iter_mut().find(|entry| entry.id == id) {
                Some(entry) => {
                    entry.last = value.clone();
                    true
                }
                None => false,
            }
        };
        if still_subscribed {
            callback(value);
        }

        Subscription::new(id, Arc::downgrade(&self.subscribers))
    }

    fn config_for(&self, path: &str) -> Option<PersistConfig> {
        self.persist_map
            .read()
            .expect("persist map lock poisoned")
            .get(path)
            .cloned()
    }

    /// Unexpired memory-cache value for a storage key
    fn cached_live_value(&self, key: &str) -> Option<Value> {
        let cached = self.layers.memory().get(key)?;
        match unwrap_ttl(&cached, self.clock.now_millis()) {
            Unwrapped::Live(value) => Some(value),
            Unwrapped::Expired => None,
        }
    }

    async fn notify_path(&self, path: &str) {
        let targets = self.matching_subscribers(Some(path));
        self.deliver(targets).await;
    }

    async fn notify_all(&self) {
        let targets = self.matching_subscribers(None);
        self.deliver(targets).await;
    }

    /// Subscribers to notify: exact path matches plus whole-tree
    /// subscribers, or everyone when `path` is `None`
    fn matching_subscribers(
        &self,
        path: Option<&str>,
    ) -> Vec<(Uuid, Option<String>, SubscriberCallback)> {
        let subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
        subscribers
            .iter()
            .filter(|entry| match (path, entry.path.as_deref()) {
                (None, _) | (_, None) => true,
                (Some(changed), Some(watched)) => changed == watched,
            })
            .map(|entry| (entry.id, entry.path.clone(), entry.callback.clone()))
            .collect()
    }

    async fn deliver(&self, targets: Vec<(Uuid, Option<String>, SubscriberCallback)>) {
        for (id, path, callback) in targets {
            let value = self.get(path.as_deref()).await;
            let changed = {
                let mut subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
                match subscribers.iter_mut().find(|entry| entry.id == id) {
                    Some(entry) if entry.last != value => {
                        entry.last = value.clone();
                        true
                    }
                    _ => false,
                }
            };
            if changed {
                callback(value);
            }
        }
    }
}

impl Default for DynaManager {
    fn default() -> Self {
        Self::new()
    }
}
