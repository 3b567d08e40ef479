//! Reactive state store
//!
//! The single source of truth for "current" values. Mutations go through
//! `dispatch` with one of four actions; registered listeners observe every
//! new state snapshot. The tree itself is a `serde_json::Value`, which
//! gives the path helpers a strongly-typed recursive variant to walk.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::path::{get_path, merge_objects, set_path};

/// Mutations accepted by the store
#[derive(Debug, Clone)]
pub enum Action {
    /// Replace the value at a dot-path (`None` removes the leaf)
    SetPath { path: String, value: Option<Value> },
    /// Shallow-merge an object onto the value at a dot-path
    MergePath { path: String, value: Value },
    /// Apply several path replacements as one transaction
    BulkSet(HashMap<String, Value>),
    /// Replace the whole tree (`None` resets to an empty tree)
    Reset(Option<Value>),
}

/// Handle for removing a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(Uuid);

type Listener = Box<dyn Fn(&Value) + Send + Sync>;

/// Owned reactive store over a nested JSON tree
pub struct StateStore {
    state: RwLock<Value>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
}

impl StateStore {
    /// Create a store with an empty tree
    pub fn new() -> Self {
        Self::with_state(Value::Object(Map::new()))
    }

    /// Create a store seeded with an initial tree
    pub fn with_state(initial: Value) -> Self {
        Self {
            state: RwLock::new(initial),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the current tree
    pub fn get_state(&self) -> Value {
        self.state.read().expect("state lock poisoned").clone()
    }

    /// Apply an action and notify listeners with the new snapshot
    pub fn dispatch(&self, action: Action) {
        let snapshot = {
            let mut state = self.state.write().expect("state lock poisoned");
            Self::reduce(&mut state, action);
            state.clone()
        };

        let listeners = self.listeners.lock().expect("listener lock poisoned");
        for (_, listener) in listeners.iter() {
            listener(&snapshot);
        }
    }

    /// Register a listener invoked after every dispatch
    pub fn subscribe(&self, listener: impl Fn(&Value) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(Uuid::now_v7());
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .push((id, Box::new(listener)));
        id
    }

    /// Remove a previously registered listener
    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .retain(|(listener_id, _)| *listener_id != id);
    }

    fn reduce(state: &mut Value, action: Action) {
        match action {
            Action::SetPath { path, value } => set_path(state, &path, value),
            Action::MergePath { path, value } => {
                let merged = merge_objects(get_path(state, &path), &value);
                set_path(state, &path, Some(merged));
            }
            Action::BulkSet(values) => {
                for (path, value) in values {
                    set_path(state, &path, Some(value));
                }
            }
            Action::Reset(next) => {
                *state = next.unwrap_or_else(|| Value::Object(Map::new()));
            }
        }
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
