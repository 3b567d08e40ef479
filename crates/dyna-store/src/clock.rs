//! Injectable time source
//!
//! TTL expiry, cookie lifetimes and token expiry checks all compare
//! against "now". Routing every read of the wall clock through this trait
//! keeps that logic deterministic under test.

use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};

/// A source of the current time
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;

    /// Current instant as Unix milliseconds
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Wall-clock time source used in production
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests
///
/// Hold an `Arc<ManualClock>` in the test, pass a clone wherever a
/// `Arc<dyn Clock>` is expected, and advance it explicitly.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at the given instant
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Create a clock frozen at the given Unix-millisecond timestamp
    pub fn at_epoch_millis(millis: i64) -> Self {
        Self::new(DateTime::from_timestamp_millis(millis).unwrap_or_default())
    }

    /// Move the clock forward
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.write().expect("clock lock poisoned");
        *now += delta;
    }

    /// Jump the clock to an absolute instant
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut now = self.now.write().expect("clock lock poisoned");
        *now = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().expect("clock lock poisoned")
    }
}
