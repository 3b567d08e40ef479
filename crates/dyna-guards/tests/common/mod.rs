use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use dyna_guards::{NavigateOptions, Navigator};
use dyna_store::SessionBackend;
use serde_json::Value;

/// Build a three-segment token around the given claim set (unsigned —
/// the guards never verify signatures)
#[allow(dead_code)]
pub fn token_with_claims(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\",\"typ\":\"JWT\"}");
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.unsigned")
}

/// Navigator double that records every navigation request
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingNavigator {
    calls: Mutex<Vec<(String, NavigateOptions)>>,
}

#[allow(dead_code)]
impl RecordingNavigator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<(String, NavigateOptions)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_call(&self) -> Option<(String, NavigateOptions)> {
        self.calls.lock().unwrap().last().cloned()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str, options: &NavigateOptions) {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_string(), options.clone()));
    }
}

/// Fresh in-process credential storage
#[allow(dead_code)]
pub fn credential_storage() -> Arc<SessionBackend> {
    Arc::new(SessionBackend::new())
}
