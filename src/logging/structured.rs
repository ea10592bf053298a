//! Subscriber setup
//!
//! Human-readable events go to stderr so command output on stdout stays clean. When
//! `logging.local_enabled` is set, the same events are also written as JSON lines to
//! `<local_path>/conduit.log.<period>`.

use crate::config::LoggingConfig;
use crate::domain::{ConduitError, Result};
use std::str::FromStr;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const LOG_FILE_PREFIX: &str = "conduit.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Flushes the JSON file writer when dropped; hold it until the process exits
#[must_use]
pub struct LoggingGuard {
    _file_writer: Option<WorkerGuard>,
}

/// Installs the global subscriber
///
/// `RUST_LOG`, when set, replaces the `conduit=<level>` filter built from `log_level`.
///
/// ```no_run
/// use conduit::config::LoggingConfig;
/// use conduit::logging::init_logging;
///
/// let _guard = init_logging("info", &LoggingConfig::default()).expect("logging");
/// ```
pub fn init_logging(log_level: &str, config: &LoggingConfig) -> Result<LoggingGuard> {
    let level = Level::from_str(log_level).map_err(|_| {
        ConduitError::Configuration(format!(
            "Invalid log level '{log_level}': expected trace, debug, info, warn or error"
        ))
    })?;
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("conduit={level}")))
    };

    let mut layers: Vec<BoxedLayer> = vec![tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(filter())
        .boxed()];

    let file_writer = if config.local_enabled {
        let (layer, guard) = json_file_layer(config)?;
        layers.push(layer.with_filter(filter()).boxed());
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| ConduitError::Other(format!("Failed to install subscriber: {e}")))?;

    tracing::info!(
        level = %level,
        file_logging = config.local_enabled,
        local_path = %config.local_path,
        rotation = %config.local_rotation,
        "Logging initialized"
    );

    Ok(LoggingGuard {
        _file_writer: file_writer,
    })
}

fn json_file_layer(config: &LoggingConfig) -> Result<(BoxedLayer, WorkerGuard)> {
    let rotation = if config.local_rotation == "hourly" {
        Rotation::HOURLY
    } else {
        Rotation::DAILY
    };

    std::fs::create_dir_all(&config.local_path).map_err(|e| {
        ConduitError::Configuration(format!(
            "Cannot create log directory {}: {e}",
            config.local_path
        ))
    })?;

    let appender = RollingFileAppender::new(rotation, &config.local_path, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(false)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(writer)
        .boxed();
    Ok((layer, guard))
}
