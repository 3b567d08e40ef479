//! dyna-store - Path-addressable state with layered persistence
//!
//! This crate provides the state-management core of dynastate:
//! - A reactive `StateStore` over a nested JSON tree with a small action
//!   vocabulary (set/merge/bulk-set/reset by dot-path)
//! - Durable layer adapters (file-backed local, in-process session,
//!   cookie jar) behind a uniform string-valued `StorageBackend` contract
//! - Persistence orchestration: per-path configuration, TTL envelopes,
//!   debounced per-key writes, best-effort failure handling
//! - `DynaManager`, the async facade tying the pieces together with
//!   change subscriptions deduplicated by structural equality
//! - A structured logging facility shared by the workspace

pub mod clock;
pub mod errors;
pub mod layers;
pub mod logging_facility;
pub mod manager;
pub mod path;
pub mod persist;
pub mod serializer;
pub mod state;
pub mod subscription;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{LayerError, LayerResult};
pub use layers::{
    CookieJar, FileBackend, LayerKind, LayerStack, MemoryLayer, SessionBackend, StorageBackend,
};
pub use manager::{DynaManager, DynaManagerBuilder};
pub use persist::{PersistConfig, DEFAULT_WRITE_DELAY, TTL_META_KEY};
pub use serializer::{JsonSerializer, Serializer};
pub use state::{Action, ListenerId, StateStore};
pub use subscription::Subscription;
