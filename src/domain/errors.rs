//! Domain error types
//!
//! This module defines the error hierarchy for Conduit. The variants mirror how far an
//! error is allowed to travel: record-level errors are counted and skipped, job, protocol
//! and authentication errors escalate to whoever started the run.
//! None of the variants expose third-party types.

use thiserror::Error;

/// Main Conduit error type
///
/// This is the primary error type used throughout the application.
#[derive(Debug, Error)]
pub enum ConduitError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Token acquisition failed. Fatal for the run, never triggers a fallback.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The EHR refused the operation for this credential or endpoint (401/403).
    #[error("Capability denied ({status}): {message}")]
    CapabilityDenied { status: u16, message: String },

    /// Malformed or unexpected response shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The bulk export job reported an error
    #[error("Export failed: {0}")]
    ExportFailed(String),

    /// Export polling exhausted its attempt budget
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Network/connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Non-success HTTP response that is not a capability denial
    #[error("Request failed with status {status}: {message}")]
    RequestFailed { status: u16, message: String },

    /// Local clinical store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A single record could not be translated, validated or written
    #[error("Record error: {0}")]
    Record(String),

    /// Watermark persistence errors
    #[error("State management error: {0}")]
    State(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl ConduitError {
    /// Returns `true` when the error means the EHR does not support the attempted operation.
    pub fn is_capability_denied(&self) -> bool {
        matches!(self, ConduitError::CapabilityDenied { .. })
    }

    /// Returns `true` for transient failures that are worth retrying against the EHR.
    pub fn is_retryable(&self) -> bool {
        match self {
            ConduitError::Connection(_) => true,
            ConduitError::RequestFailed { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Classifies a non-success EHR response.
    ///
    /// 401 and 403 are capability denials, everything else is a plain request failure.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => ConduitError::CapabilityDenied { status, message },
            _ => ConduitError::RequestFailed { status, message },
        }
    }
}

/// Local clinical store errors
///
/// Errors that occur when reading from or writing to the local store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to connect to the store
    #[error("Failed to connect to store: {0}")]
    ConnectionFailed(String),

    /// Search or read failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Create or update was rejected
    #[error("Write failed with status {status}: {message}")]
    WriteFailed { status: u16, message: String },

    /// A conditional create matched more than one record
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The store returned something that is not a resource
    #[error("Invalid response from store: {0}")]
    InvalidResponse(String),
}

// Conversion from std::io::Error
impl From<std::io::Error> for ConduitError {
    fn from(err: std::io::Error) -> Self {
        ConduitError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for ConduitError {
    fn from(err: serde_json::Error) -> Self {
        ConduitError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for ConduitError {
    fn from(err: toml::de::Error) -> Self {
        ConduitError::Configuration(format!("TOML parse error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conduit_error_display() {
        let err = ConduitError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_from_status_classification() {
        assert!(ConduitError::from_status(401, "unauthorized").is_capability_denied());
        assert!(ConduitError::from_status(403, "forbidden").is_capability_denied());

        let err = ConduitError::from_status(404, "missing");
        assert!(matches!(
            err,
            ConduitError::RequestFailed { status: 404, .. }
        ));
        assert!(!err.is_capability_denied());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(ConduitError::Connection("reset".to_string()).is_retryable());
        assert!(ConduitError::from_status(503, "unavailable").is_retryable());
        assert!(ConduitError::from_status(429, "slow down").is_retryable());
        assert!(!ConduitError::from_status(400, "bad request").is_retryable());
        assert!(!ConduitError::from_status(403, "forbidden").is_retryable());
        assert!(!ConduitError::Authentication("nope".to_string()).is_retryable());
    }

    #[test]
    fn test_store_error_conversion() {
        let store_err = StoreError::Conflict("two matches".to_string());
        let err: ConduitError = store_err.into();
        assert!(matches!(err, ConduitError::Store(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: ConduitError = io_err.into();
        assert!(matches!(err, ConduitError::Io(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: ConduitError = json_err.into();
        assert!(matches!(err, ConduitError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: ConduitError = toml_err.into();
        assert!(matches!(err, ConduitError::Configuration(_)));
        assert!(err.to_string().contains("TOML parse error"));
    }
}
