//! Error types for conf-core

use std::time::Duration;

use crate::layer::Layer;
use crate::path::ConfigPath;

/// Result type for conf-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving configuration
///
/// Source errors (a layer could not be produced) and enforcement errors
/// (a value has the wrong shape) are separate variants so callers can tell
/// connectivity problems from configuration problems.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A layer source could not be read
    #[error("Source for {layer} layer unavailable: {reason}")]
    SourceUnavailable { layer: Layer, reason: String },

    /// A local layer document exists but could not be parsed
    #[error("Failed to load {layer} layer document: {source}")]
    LayerDocument {
        layer: Layer,
        #[source]
        source: conf_fs::Error,
    },

    /// The remote layer could not be fetched
    #[error(transparent)]
    RemoteFetch(#[from] RemoteFetchError),

    /// A value failed schema validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No usable default layer at first startup
    #[error("No usable default layer: {reason}")]
    DefaultUnavailable { reason: String },

    /// A dotted path could not be parsed
    #[error("Invalid config path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Engine settings are inconsistent
    #[error("Invalid engine settings: {message}")]
    Settings { message: String },

    /// Filesystem error from conf-fs
    #[error(transparent)]
    Fs(#[from] conf_fs::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error describes a layer that could not be produced.
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. }
                | Self::LayerDocument { .. }
                | Self::RemoteFetch(_)
                | Self::DefaultUnavailable { .. }
        )
    }

    /// Whether this error describes a value rejected by validation.
    pub fn is_enforcement_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Failure to fetch the remote layer
///
/// The store keeps the last successfully fetched layer whenever one of these
/// occurs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteFetchError {
    #[error("Remote fetch timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Remote request failed: {0}")]
    Http(String),

    #[error("Remote endpoint returned status {status}")]
    Status { status: u16 },

    #[error("Malformed remote payload: {0}")]
    Payload(String),
}

/// A resolved value that failed schema validation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invalid value at {path} from {layer} layer: {message}")]
pub struct ValidationError {
    pub path: ConfigPath,
    pub layer: Layer,
    pub message: String,
    /// Whether the last known-good value was restored (otherwise the path was removed)
    pub restored: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_and_enforcement_errors_are_distinct() {
        let remote = Error::from(RemoteFetchError::Timeout {
            after: Duration::from_secs(10),
        });
        assert!(remote.is_source_error());
        assert!(!remote.is_enforcement_error());

        let invalid = Error::from(ValidationError {
            path: ConfigPath::parse("system_unit").unwrap(),
            layer: Layer::User,
            message: "expected one of metric, english".into(),
            restored: true,
        });
        assert!(invalid.is_enforcement_error());
        assert!(!invalid.is_source_error());
    }

    #[test]
    fn validation_error_displays_path_and_layer() {
        let err = ValidationError {
            path: ConfigPath::parse("hotwords.wake.sensitivity").unwrap(),
            layer: Layer::Remote,
            message: "1.5 is outside [0, 1]".into(),
            restored: false,
        };
        let display = err.to_string();
        assert!(display.contains("hotwords.wake.sensitivity"));
        assert!(display.contains("remote"));
    }
}
