use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dyna_store::{
    CookieJar, DynaManager, LayerResult, LayerStack, ManualClock, SessionBackend, StorageBackend,
};
use serde_json::Value;

/// Backend wrapper that counts durable writes and remembers the last one
#[allow(dead_code)]
pub struct CountingBackend {
    inner: SessionBackend,
    writes: AtomicUsize,
    last_write: Mutex<Option<String>>,
}

#[allow(dead_code)]
impl CountingBackend {
    pub fn new() -> Self {
        Self {
            inner: SessionBackend::new(),
            writes: AtomicUsize::new(0),
            last_write: Mutex::new(None),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn last_write(&self) -> Option<String> {
        self.last_write.lock().unwrap().clone()
    }
}

impl StorageBackend for CountingBackend {
    fn get(&self, key: &str) -> LayerResult<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> LayerResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.last_write.lock().unwrap() = Some(value.to_string());
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> LayerResult<()> {
        self.inner.remove(key)
    }
}

/// Backend that refuses every call
#[allow(dead_code)]
pub struct FailingBackend;

impl StorageBackend for FailingBackend {
    fn get(&self, _key: &str) -> LayerResult<Option<String>> {
        Err(dyna_store::LayerError::Unavailable {
            name: "failing".into(),
        })
    }

    fn set(&self, _key: &str, _value: &str) -> LayerResult<()> {
        Err(dyna_store::LayerError::Unavailable {
            name: "failing".into(),
        })
    }

    fn remove(&self, _key: &str) -> LayerResult<()> {
        Err(dyna_store::LayerError::Unavailable {
            name: "failing".into(),
        })
    }
}

/// A manager wired to a counting local backend and a manual clock
#[allow(dead_code)]
pub struct TestEnv {
    pub manager: DynaManager,
    pub clock: Arc<ManualClock>,
    pub local: Arc<CountingBackend>,
}

/// Build a manager whose local layer counts writes
#[allow(dead_code)]
pub fn manager_with_counting_local() -> TestEnv {
    let clock = Arc::new(ManualClock::at_epoch_millis(0));
    let local = Arc::new(CountingBackend::new());
    let stack = LayerStack::new(
        local.clone(),
        Arc::new(SessionBackend::new()),
        Arc::new(CookieJar::new(clock.clone())),
    );
    let manager = DynaManager::builder()
        .with_clock(clock.clone())
        .with_layers(Arc::new(stack))
        .build();

    TestEnv {
        manager,
        clock,
        local,
    }
}

/// Collecting callback for subscription tests
#[allow(dead_code)]
pub fn collecting_callback() -> (
    impl Fn(Option<Value>) + Send + Sync + 'static,
    Arc<Mutex<Vec<Option<Value>>>>,
) {
    let seen: Arc<Mutex<Vec<Option<Value>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback = move |value: Option<Value>| {
        sink.lock().unwrap().push(value);
    };
    (callback, seen)
}
