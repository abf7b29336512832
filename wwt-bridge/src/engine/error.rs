//! Errors reported by the rendering engine.

use thiserror::Error;

/// Failures surfaced by an [`Engine`](super::Engine) implementation.
///
/// These are opaque to the bridge and propagated to callers unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// No imageset with this name is known to the engine.
    #[error("Unknown imageset: {0}")]
    UnknownImageset(String),

    /// A WTML collection could not be loaded.
    #[error("Failed to load collection {url}: {reason}")]
    CollectionLoad { url: String, reason: String },

    /// A setting value was rejected.
    #[error("Invalid value for setting {setting}: {reason}")]
    InvalidSetting {
        setting: &'static str,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_load_display() {
        let err = EngineError::CollectionLoad {
            url: "https://example.org/a.wtml".to_string(),
            reason: "404".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("a.wtml"));
        assert!(msg.contains("404"));
    }

    #[test]
    fn test_unknown_imageset_display() {
        let err = EngineError::UnknownImageset("DSS".to_string());
        assert_eq!(err.to_string(), "Unknown imageset: DSS");
    }
}
