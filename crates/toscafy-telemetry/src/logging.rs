//! Structured logging to stderr.
//!
//! stdout is reserved for archive streaming, so every layer writes to stderr.

use crate::{LogFormat, TelemetryConfig, TelemetryError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install the global subscriber for one process.
///
/// `RUST_LOG` replaces the configured directives entirely.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    match config.log_format {
        LogFormat::Json => init_json_logging(filter),
        LogFormat::Pretty => init_pretty_logging(filter),
    }
}

fn init_json_logging(filter: EnvFilter) -> Result<(), TelemetryError> {
    let json_layer = fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_current_span(true)
        .with_span_list(false)
        .flatten_event(true)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::LoggingInit(e.to_string())
        })
}

fn init_pretty_logging(filter: EnvFilter) -> Result<(), TelemetryError> {
    let pretty_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(pretty_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::LoggingInit(e.to_string())
        })
}

/// Standard log event names.
pub mod events {
    /// A pipeline stage started.
    pub const STAGE_STARTED: &str = "stage_started";

    /// A pipeline stage completed.
    pub const STAGE_COMPLETED: &str = "stage_completed";

    /// An embedded directive was executed and replaced.
    pub const DIRECTIVE_RESOLVED: &str = "directive_resolved";

    /// An artifact was rewritten into a generated API service.
    pub const ARTIFACT_WRAPPED: &str = "artifact_wrapped";

    /// The final archive was written and closed.
    pub const ARCHIVE_WRITTEN: &str = "archive_written";

    /// Removing temporary state failed after the primary outcome was decided.
    pub const CLEANUP_FAILED: &str = "cleanup_failed";
}

/// Helper macros for structured logging with standard fields.
///
/// These wrap the tracing macros to ensure consistent field naming.
#[macro_export]
macro_rules! log_stage_started {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::STAGE_STARTED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_stage_completed {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::STAGE_COMPLETED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_directive_resolved {
    ($($field:tt)*) => {
        tracing::debug!(
            event = $crate::logging::events::DIRECTIVE_RESOLVED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_artifact_wrapped {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::ARTIFACT_WRAPPED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_archive_written {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::ARCHIVE_WRITTEN,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_cleanup_failed {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::CLEANUP_FAILED,
            $($field)*
        )
    };
}
