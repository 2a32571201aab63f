use std::time::Duration;

/// Default log filter expression used by hosts embedding the dispatcher.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default number of seconds an interactive signer round trip may take
/// before the pending call is abandoned.
pub const DEFAULT_INTERACTIVE_TIMEOUT_SECS: u64 = 120;

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Default interactive round-trip timeout.
#[must_use]
pub const fn default_interactive_timeout() -> Duration {
    Duration::from_secs(DEFAULT_INTERACTIVE_TIMEOUT_SECS)
}
