//! Logging infrastructure for the toscafy CSAR compiler.
//!
//! This crate provides:
//! - Structured JSON or pretty logging to stderr
//! - Standard event names for compiler stages
//! - `log_*!` macros attaching those event names
//!
//! # Usage
//!
//! ```ignore
//! use toscafy_telemetry::{init_logging, LogFormat, TelemetryConfig};
//!
//! let config = TelemetryConfig::new()
//!     .with_log_level("debug")
//!     .with_log_format(LogFormat::Pretty);
//!
//! init_logging(&config)?;
//! ```

pub mod config;
pub mod logging;

pub use config::{LogFormat, TelemetryConfig};
pub use logging::{events, init_logging};

use thiserror::Error;

/// Telemetry errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize logging.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("invalid log format '{0}' (expected json or pretty)")]
    InvalidFormat(String),
}
