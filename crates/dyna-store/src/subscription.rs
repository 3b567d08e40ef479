//! Change subscriptions
//!
//! Subscribers register a callback for one path (or the whole tree) and
//! are re-invoked only when the observed value actually changes, judged by
//! structural equality.

use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use uuid::Uuid;

/// Callback invoked with the freshly observed value (`None` = absent)
pub type SubscriberCallback = Arc<dyn Fn(Option<Value>) + Send + Sync>;

pub(crate) struct SubscriberEntry {
    pub id: Uuid,
    /// `None` subscribes to the whole tree
    pub path: Option<String>,
    pub callback: SubscriberCallback,
    /// Last value delivered, for structural-equality dedup
    pub last: Option<Value>,
}

/// Handle returned by `subscribe`; call `unsubscribe` to stop deliveries
///
/// Dropping the handle without calling `unsubscribe` leaves the
/// subscription active for the manager's lifetime.
pub struct Subscription {
    id: Uuid,
    subscribers: Weak<Mutex<Vec<SubscriberEntry>>>,
}

impl Subscription {
    pub(crate) fn new(id: Uuid, subscribers: Weak<Mutex<Vec<SubscriberEntry>>>) -> Self {
        Self { id, subscribers }
    }

    /// Identifier of this subscription
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Remove the subscriber; further changes are not delivered
    pub fn unsubscribe(self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers
                .lock()
                .expect("subscriber lock poisoned")
                .retain(|entry| entry.id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
