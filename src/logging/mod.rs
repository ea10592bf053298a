//! Logging and observability
//!
//! Structured logging through `tracing`:
//! - Human-readable console output
//! - JSON log files with daily or hourly rotation
//! - `RUST_LOG` / configured log level filtering
//!
//! # Example
//!
//! ```no_run
//! use conduit::logging::init_logging;
//! use conduit::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(resource_type = "Patient", created = 3, "Reconciled batch");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of a sync run
///
/// # Example
///
/// ```no_run
/// use conduit::log_sync_start;
///
/// let since: Option<chrono::DateTime<chrono::Utc>> = None;
/// log_sync_start!("https://ehr.example.com/fhir", "group:g-1", since);
/// ```
#[macro_export]
macro_rules! log_sync_start {
    ($source:expr, $scope:expr, $since:expr) => {
        tracing::info!(
            source = %$source,
            scope = %$scope,
            since = ?$since,
            "Starting sync run"
        );
    };
}

/// Log a record that could not be reconciled
///
/// # Example
///
/// ```no_run
/// use conduit::log_record_failure;
/// use conduit::domain::ConduitError;
///
/// let error = ConduitError::Record("missing subject".to_string());
/// log_record_failure!("Observation", "obs-1", &error);
/// ```
#[macro_export]
macro_rules! log_record_failure {
    ($resource_type:expr, $source_id:expr, $error:expr) => {
        tracing::warn!(
            resource_type = %$resource_type,
            source_id = %$source_id,
            error = %$error,
            "Failed to reconcile record"
        );
    };
}

/// Log a retry attempt
///
/// # Example
///
/// ```no_run
/// use conduit::log_retry_attempt;
///
/// log_retry_attempt!(2, 3, 2000u64, "Connection timeout");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($attempt:expr, $max_attempts:expr, $delay_ms:expr, $reason:expr) => {
        tracing::warn!(
            attempt = $attempt,
            max_attempts = $max_attempts,
            delay_ms = $delay_ms,
            reason = %$reason,
            "Retrying request after error"
        );
    };
}
