//! Value codecs for durable layers
//!
//! Durable backends move strings; a `Serializer` turns tree values into
//! those strings and back. Persist entries can carry their own codec; the
//! default is plain JSON.

use serde_json::Value;

use crate::errors::{LayerError, LayerResult};

/// Encode/decode pair used when writing a value to a string-valued layer
pub trait Serializer: Send + Sync {
    /// Encode a value for storage
    fn serialize(&self, value: &Value) -> LayerResult<String>;

    /// Decode a stored string back into a value
    fn deserialize(&self, raw: &str) -> LayerResult<Value>;
}

/// Default JSON codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, value: &Value) -> LayerResult<String> {
        serde_json::to_string(value).map_err(LayerError::from)
    }

    fn deserialize(&self, raw: &str) -> LayerResult<Value> {
        serde_json::from_str(raw).map_err(LayerError::from)
    }
}
