//! Logging configuration for compiler runs.

use std::fmt;
use std::str::FromStr;

use crate::TelemetryError;

/// Crates whose debug output drowns the compiler's own events when a spec
/// fetches remote resources. Capped at `warn` unless `RUST_LOG` says otherwise.
const NOISY_TARGETS: &[&str] = &["reqwest", "hyper_util", "rustls"];

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event (CI pipelines that package CSARs).
    Json,
    /// Compact human-readable lines.
    #[default]
    Pretty,
}

impl LogFormat {
    /// Parse from string, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" | "text" => Some(Self::Pretty),
            _ => None,
        }
    }
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| TelemetryError::InvalidFormat(s.to_string()))
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        })
    }
}

/// How a compiler run logs to stderr.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Level for toscafy's own events (default: "warn"). `RUST_LOG` takes
    /// precedence over everything in this struct.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Keep HTTP client internals at `warn` regardless of `log_level`.
    pub quiet_http: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            log_format: LogFormat::Pretty,
            quiet_http: true,
        }
    }
}

impl TelemetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    pub fn with_quiet_http(mut self, quiet: bool) -> Self {
        self.quiet_http = quiet;
        self
    }

    /// `EnvFilter` directives for this config: the base level, then one
    /// `target=warn` per noisy crate.
    pub fn filter_directives(&self) -> String {
        let level = self.log_level.trim();
        let mut directives = vec![if level.is_empty() { "warn" } else { level }.to_string()];
        if self.quiet_http {
            directives.extend(NOISY_TARGETS.iter().map(|t| format!("{}=warn", t)));
        }
        directives.join(",")
    }
}
