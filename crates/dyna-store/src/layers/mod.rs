//! Durable-layer adapters
//!
//! Each adapter exposes a uniform string-valued get/set/remove contract
//! over one physical backend. Adapters carry no TTL or debounce logic —
//! that discipline lives in the persistence orchestrator, which also
//! catches adapter failures per layer and continues.

pub mod cookie;
pub mod local;
pub mod memory;
pub mod session;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use cookie::CookieJar;
pub use local::FileBackend;
pub use memory::MemoryLayer;
pub use session::SessionBackend;

use crate::clock::{Clock, SystemClock};
use crate::errors::LayerResult;

/// Names of the storage layers a path can persist to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// Process-lifetime typed cache (always the fast path)
    Memory,
    /// Durable key/value storage surviving restarts
    Local,
    /// Process-lifetime string storage
    Session,
    /// Cookie-style storage with per-entry expiry
    Cookie,
    /// Explicitly no persistence
    None,
}

impl LayerKind {
    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKind::Memory => "memory",
            LayerKind::Local => "local",
            LayerKind::Session => "session",
            LayerKind::Cookie => "cookie",
            LayerKind::None => "none",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(LayerKind::Memory),
            "local" => Ok(LayerKind::Local),
            "session" => Ok(LayerKind::Session),
            "cookie" => Ok(LayerKind::Cookie),
            "none" => Ok(LayerKind::None),
            other => Err(format!("unknown layer kind: {other}")),
        }
    }
}

/// String-valued storage contract shared by the durable layers
///
/// Mirrors the `getItem`/`setItem`/`removeItem` shape of the storage
/// objects the store was designed against. Serialization happens above
/// this trait; adapters only move strings.
pub trait StorageBackend: Send + Sync {
    /// Read the stored value for a key, `None` when absent
    fn get(&self, key: &str) -> LayerResult<Option<String>>;

    /// Store a value under a key
    fn set(&self, key: &str, value: &str) -> LayerResult<()>;

    /// Delete a key (absent keys are not an error)
    fn remove(&self, key: &str) -> LayerResult<()>;

    /// Store a value with a lifetime in days
    ///
    /// Only the cookie adapter honors the expiry; other backends fall
    /// back to a plain `set`.
    fn set_with_expiry(&self, key: &str, value: &str, _expires_days: i64) -> LayerResult<()> {
        self.set(key, value)
    }
}

/// The set of physical backends a manager writes through
///
/// The memory layer is held as a concrete typed cache; the three durable
/// backends are injected trait objects so tests and embedders can swap
/// them.
pub struct LayerStack {
    memory: MemoryLayer,
    local: Arc<dyn StorageBackend>,
    session: Arc<dyn StorageBackend>,
    cookie: Arc<dyn StorageBackend>,
}

impl LayerStack {
    /// Build a stack from explicit backends
    pub fn new(
        local: Arc<dyn StorageBackend>,
        session: Arc<dyn StorageBackend>,
        cookie: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            memory: MemoryLayer::new(),
            local,
            session,
            cookie,
        }
    }

    /// Stack with purely in-process backends (tests, demos)
    pub fn ephemeral() -> Self {
        Self::ephemeral_with_clock(Arc::new(SystemClock))
    }

    /// In-process stack whose cookie jar uses the given clock
    pub fn ephemeral_with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::new(
            Arc::new(SessionBackend::new()),
            Arc::new(SessionBackend::new()),
            Arc::new(CookieJar::new(clock)),
        )
    }

    /// The typed fast-path cache
    pub fn memory(&self) -> &MemoryLayer {
        &self.memory
    }

    /// The durable local backend
    pub fn local(&self) -> Arc<dyn StorageBackend> {
        self.local.clone()
    }

    /// The process-lifetime session backend
    pub fn session(&self) -> Arc<dyn StorageBackend> {
        self.session.clone()
    }

    /// The cookie backend
    pub fn cookie(&self) -> Arc<dyn StorageBackend> {
        self.cookie.clone()
    }

    /// Resolve a durable backend by kind
    ///
    /// Memory and None have no string backend and return `None`.
    pub fn backend(&self, kind: LayerKind) -> Option<Arc<dyn StorageBackend>> {
        match kind {
            LayerKind::Local => Some(self.local.clone()),
            LayerKind::Session => Some(self.session.clone()),
            LayerKind::Cookie => Some(self.cookie.clone()),
            LayerKind::Memory | LayerKind::None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_kind_round_trip() {
        for kind in [
            LayerKind::Memory,
            LayerKind::Local,
            LayerKind::Session,
            LayerKind::Cookie,
            LayerKind::None,
        ] {
            assert_eq!(kind.as_str().parse::<LayerKind>().unwrap(), kind);
        }
        assert!("bogus".parse::<LayerKind>().is_err());
    }

    #[test]
    fn test_stack_resolves_backends_by_kind() {
        let stack = LayerStack::ephemeral();
        assert!(stack.backend(LayerKind::Local).is_some());
        assert!(stack.backend(LayerKind::Session).is_some());
        assert!(stack.backend(LayerKind::Cookie).is_some());
        assert!(stack.backend(LayerKind::Memory).is_none());
        assert!(stack.backend(LayerKind::None).is_none());
    }
}
