//! Shared configuration for hosts embedding the Nostr signer dispatcher.
//!
//! Settings are layered by `ortho_config`: built-in defaults, an optional
//! configuration file, `NOSTR_SIGNER_*` environment variables, and finally
//! command-line flags. Every field is optional on the wire so that the
//! accessors can fall back to the values in [`defaults`].

mod defaults;
mod logging;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use self::defaults::{
    DEFAULT_INTERACTIVE_TIMEOUT_SECS, DEFAULT_LOG_FILTER, default_interactive_timeout,
    default_log_filter, default_log_format,
};
pub use self::logging::{LogFormat, LogFormatParseError};
pub use ortho_config::{OrthoConfig, OrthoError};

/// Resolved configuration for a signer session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(prefix = "NOSTR_SIGNER")]
pub struct Config {
    /// Package identifier of the signer application selected at start-up.
    signer_package: Option<String>,
    /// Seconds an interactive round trip may stay pending.
    interactive_timeout_secs: Option<u64>,
    /// Tracing filter expression.
    log_filter: Option<String>,
    /// Log output format.
    log_format: Option<LogFormat>,
}

impl Config {
    /// Selects a signer package without going through the loader.
    #[must_use]
    pub fn with_signer_package(mut self, package: impl Into<String>) -> Self {
        self.signer_package = Some(package.into());
        self
    }

    /// Overrides the interactive timeout.
    #[must_use]
    pub const fn with_interactive_timeout_secs(mut self, secs: u64) -> Self {
        self.interactive_timeout_secs = Some(secs);
        self
    }

    /// Overrides the log filter.
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    /// Overrides the log format.
    #[must_use]
    pub const fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = Some(format);
        self
    }

    /// Signer package configured at start-up, ignoring blank values.
    #[must_use]
    pub fn signer_package(&self) -> Option<&str> {
        self.signer_package
            .as_deref()
            .map(str::trim)
            .filter(|package| !package.is_empty())
    }

    /// Interactive round-trip timeout.
    #[must_use]
    pub fn interactive_timeout(&self) -> Duration {
        self.interactive_timeout_secs
            .map_or_else(default_interactive_timeout, Duration::from_secs)
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }
}
