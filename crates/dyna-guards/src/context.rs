//! Shared middleware context
//!
//! One mutable context flows through a pipeline run: a navigation hook,
//! the current location, and an open value map that handlers extend
//! (the authentication guard injects `user`, which the permission guard
//! reads). The manager keeps a default context that call-local overlays
//! are merged onto per run.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Navigation hook supplied by the hosting shell
///
/// Guards call this to land a denied user on a login or access-denied
/// view; the target interprets the path and options.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str, options: &NavigateOptions);
}

/// Options attached to a navigation request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigateOptions {
    /// Replace the current history entry instead of pushing
    pub replace: bool,
    /// Structured state delivered to the target view
    pub state: Option<Value>,
}

/// Current location descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub pathname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Location {
    /// Location at the application root
    pub fn root() -> Self {
        Self::new("/")
    }

    pub fn new(pathname: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
            search: None,
            hash: None,
        }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::root()
    }
}

/// User identity carried through the pipeline
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Mutable context shared by every handler in one pipeline run
#[derive(Clone, Default)]
pub struct MiddlewareContext {
    navigator: Option<Arc<dyn Navigator>>,
    location: Location,
    values: Map<String, Value>,
}

impl MiddlewareContext {
    /// Context with no navigator, root location and no values
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a navigation hook
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Set the current location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Seed a context value
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn navigator(&self) -> Option<&Arc<dyn Navigator>> {
        self.navigator.as_ref()
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Read a context value by key
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// All context values
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Insert a single context value
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Shallow-merge an object of values into the context
    pub fn merge_values(&mut self, patch: Map<String, Value>) {
        for (key, value) in patch {
            self.values.insert(key, value);
        }
    }

    /// The authenticated user, when a handler has injected one
    ///
    /// Returns `None` when no `user` value is present or it does not
    /// have the expected shape.
    pub fn user(&self) -> Option<AuthenticatedUser> {
        self.values
            .get("user")
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Apply a call-local overlay on top of this context
    pub fn apply(&mut self, overlay: ContextOverlay) {
        if let Some(navigator) = overlay.navigator {
            self.navigator = Some(navigator);
        }
        if let Some(location) = overlay.location {
            self.location = location;
        }
        self.merge_values(overlay.values);
    }
}

impl fmt::Debug for MiddlewareContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareContext")
            .field("navigator", &self.navigator.is_some())
            .field("location", &self.location)
            .field("values", &self.values)
            .finish()
    }
}

/// Partial context merged onto the manager's default per call
#[derive(Clone, Default)]
pub struct ContextOverlay {
    pub navigator: Option<Arc<dyn Navigator>>,
    pub location: Option<Location>,
    pub values: Map<String, Value>,
}

impl ContextOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }
}

impl fmt::Debug for ContextOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextOverlay")
            .field("navigator", &self.navigator.is_some())
            .field("location", &self.location)
            .field("values", &self.values)
            .finish()
    }
}
