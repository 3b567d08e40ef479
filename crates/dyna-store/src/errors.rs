use thiserror::Error;

/// Result type alias for layer-level operations
pub type LayerResult<T> = std::result::Result<T, LayerError>;

/// Error taxonomy for durable-layer operations
///
/// These errors never cross the public store API: persistence is
/// best-effort and a failing layer is logged and skipped. The type exists
/// so layer adapters and the persistence orchestrator can report outcomes
/// precisely, and so tests can assert on a specific layer failing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayerError {
    /// The backend refused the operation (disabled storage, closed jar)
    #[error("storage backend unavailable: {name}")]
    Unavailable { name: String },

    /// Underlying I/O failed (file write, quota)
    #[error("storage i/o failure: {message}")]
    Io { message: String },

    /// Value could not be encoded/decoded for storage
    #[error("serialization failure: {message}")]
    Serialization { message: String },
}

impl LayerError {
    /// Get the stable error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            LayerError::Unavailable { .. } => "ERR_LAYER_UNAVAILABLE",
            LayerError::Io { .. } => "ERR_LAYER_IO",
            LayerError::Serialization { .. } => "ERR_LAYER_SERIALIZATION",
        }
    }
}

impl From<std::io::Error> for LayerError {
    fn from(err: std::io::Error) -> Self {
        LayerError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for LayerError {
    fn from(err: serde_json::Error) -> Self {
        LayerError::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_error_codes() {
        let cases = [
            (
                LayerError::Unavailable {
                    name: "local".into(),
                },
                "ERR_LAYER_UNAVAILABLE",
            ),
            (
                LayerError::Io {
                    message: "disk full".into(),
                },
                "ERR_LAYER_IO",
            ),
            (
                LayerError::Serialization {
                    message: "bad json".into(),
                },
                "ERR_LAYER_SERIALIZATION",
            ),
        ];
        for (err, expected_code) in cases {
            assert_eq!(err.code(), expected_code, "Wrong code for {:?}", err);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: LayerError = io.into();
        assert!(matches!(err, LayerError::Io { .. }));
    }
}
