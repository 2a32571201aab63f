//! Domain errors raised while dispatching delegated signer operations.
//!
//! Every variant rejects exactly one request; none of them disable the
//! dispatcher. Parameter and configuration errors are raised before any IPC
//! takes place. Failures of the direct query channel never surface here
//! because the dispatcher falls back to the interactive channel instead.

use std::time::Duration;

use thiserror::Error;

/// Errors arising from signer operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    /// A required request parameter was absent.
    #[error("missing required parameter '{name}'")]
    MissingParameter {
        /// Name of the missing parameter.
        name: String,
    },

    /// A request parameter had a shape the bridge cannot forward.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Name of the offending parameter.
        name: String,
        /// Description of the problem.
        message: String,
    },

    /// No signer package has been selected for this session.
    #[error("signer package name not set; call setPackageName first")]
    NoSignerConfigured,

    /// The selected signer package does not handle the signer scheme.
    #[error("signer '{package}' is not installed")]
    SignerNotInstalled {
        /// Package that was looked up.
        package: String,
    },

    /// Another interactive request is still awaiting its result.
    #[error("an interactive signer request is already in flight")]
    ChannelBusy,

    /// The user dismissed the signer application.
    #[error("request rejected or cancelled by the user")]
    UserCancelled,

    /// The signer replied with data that does not fit the operation.
    #[error("malformed response for '{kind}': {message}")]
    MalformedResponse {
        /// Operation kind tag the reply was decoded against or declared.
        kind: String,
        /// Description of the decoding failure.
        message: String,
    },

    /// An operation name or tag is not part of the catalog.
    #[error("unknown operation kind '{tag}'")]
    UnknownOperationKind {
        /// The unrecognised tag.
        tag: String,
    },

    /// The signer neither replied nor reported cancellation in time.
    #[error("interactive signer request timed out after {}ms", .timeout.as_millis())]
    Timeout {
        /// Configured round-trip timeout.
        timeout: Duration,
    },

    /// The operating system could not launch the signer application.
    #[error("failed to launch signer '{package}': {message}")]
    LaunchFailed {
        /// Package the launch was addressed to.
        package: String,
        /// Human-readable failure description.
        message: String,
    },

    /// The signer echoed a correlation id that belongs to another request.
    #[error("reply correlation id '{received}' does not match request '{expected}'")]
    CorrelationMismatch {
        /// Correlation id sent with the request.
        expected: String,
        /// Correlation id found in the reply.
        received: String,
    },

    /// Internal invariant violation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl SignerError {
    /// Creates a missing parameter error.
    #[must_use]
    pub fn missing_parameter(name: impl Into<String>) -> Self {
        Self::MissingParameter { name: name.into() }
    }

    /// Creates a malformed response error.
    #[must_use]
    pub fn malformed(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Creates an unknown operation kind error.
    #[must_use]
    pub fn unknown_kind(tag: impl Into<String>) -> Self {
        Self::UnknownOperationKind { tag: tag.into() }
    }

    /// Returns `true` when the error was raised before any IPC was attempted.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::MissingParameter { .. }
                | Self::InvalidParameter { .. }
                | Self::NoSignerConfigured
                | Self::UnknownOperationKind { .. }
        )
    }
}
