//! Interactive channel: launching the signer for user approval.
//!
//! A round trip hands a [`LaunchRequest`] to an [`ActivityLauncher`] and
//! suspends the caller until the host delivers the signer's
//! [`ActivityOutcome`] through [`PendingCalls::deliver`]. Only one round trip
//! may be in flight; a second request is rejected with
//! [`SignerError::ChannelBusy`] and the pending call is left untouched.
//!
//! The pending entry is owned by a guard held inside the caller's future,
//! so the slot is released on every exit path: a delivered outcome, a
//! launch failure, a timeout, or the future being dropped.

mod pending;

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::{OperationKind, params};
use crate::discovery::SIGNER_SCHEME;
use crate::error::SignerError;
use crate::protocol::{OperationRequest, RawReply, fields};

pub use self::pending::{CallPhase, Delivery, PendingCalls};

/// Tracing target for interactive round trips.
pub(crate) const INTERACTIVE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::interactive");

/// Launch extras understood by signer applications.
pub mod extras {
    /// Operation kind tag.
    pub const TYPE: &str = "type";
    /// Correlation id the signer echoes back.
    pub const ID: &str = "id";
    /// Acting user's public key.
    pub const CURRENT_USER: &str = "current_user";
    /// Counterparty public key.
    pub const PUB_KEY: &str = "pubKey";
    /// Requested permissions.
    pub const PERMISSIONS: &str = "permissions";
}

/// Request handed to the operating system to open the signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    package: String,
    uri: String,
    extras: BTreeMap<String, String>,
}

impl LaunchRequest {
    /// Builds the launch request for `request` addressed to `package`.
    ///
    /// # Example
    ///
    /// ```
    /// use nostr_signer::OperationKind;
    /// use nostr_signer::catalog::Params;
    /// use nostr_signer::interactive::LaunchRequest;
    ///
    /// let params: Params = [("npub", "npub1me")]
    ///     .into_iter()
    ///     .map(|(k, v)| (k.to_owned(), v.to_owned()))
    ///     .collect();
    /// let request = OperationKind::GetRelays.validate(&params).expect("valid");
    /// let launch = LaunchRequest::for_operation("app.signer", &request);
    /// assert_eq!(launch.uri(), "nostrsigner:");
    /// assert_eq!(launch.extra("type"), Some("get_relays"));
    /// assert_eq!(launch.extra("current_user"), Some("npub1me"));
    /// ```
    #[must_use]
    pub fn for_operation(package: &str, request: &OperationRequest) -> Self {
        let kind = request.kind();
        let payload = match kind {
            OperationKind::GetPublicKey | OperationKind::GetRelays => None,
            OperationKind::SignEvent | OperationKind::DecryptNotificationEvent => {
                request.param(params::EVENT_JSON)
            }
            OperationKind::Nip04Encrypt | OperationKind::Nip44Encrypt => {
                request.param(params::PLAIN_TEXT)
            }
            OperationKind::Nip04Decrypt | OperationKind::Nip44Decrypt => {
                request.param(params::ENCRYPTED_TEXT)
            }
        };

        let mut values = BTreeMap::new();
        values.insert(extras::TYPE.to_owned(), kind.tag().to_owned());
        values.insert(extras::ID.to_owned(), request.correlation_id().to_owned());
        let forwarded = [
            (params::NPUB, extras::CURRENT_USER),
            (params::PUB_KEY, extras::PUB_KEY),
            (params::PERMISSIONS, extras::PERMISSIONS),
        ];
        for (param, extra) in forwarded {
            if let Some(value) = request.param(param) {
                values.insert(extra.to_owned(), value.to_owned());
            }
        }

        Self {
            package: package.to_owned(),
            uri: format!("{SIGNER_SCHEME}{}", payload.unwrap_or_default()),
            extras: values,
        }
    }

    /// Returns the package the request is addressed to.
    #[must_use]
    pub const fn package(&self) -> &str {
        self.package.as_str()
    }

    /// Returns the `nostrsigner:` URI carrying the payload.
    #[must_use]
    pub const fn uri(&self) -> &str {
        self.uri.as_str()
    }

    /// Returns all launch extras.
    #[must_use]
    pub const fn extras(&self) -> &BTreeMap<String, String> {
        &self.extras
    }

    /// Returns one launch extra.
    #[must_use]
    pub fn extra(&self, name: &str) -> Option<&str> {
        self.extras.get(name).map(String::as_str)
    }
}

/// Failures reported by an [`ActivityLauncher`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
    /// No activity handles the request.
    #[error("no activity in '{package}' handles the signer request")]
    NoHandler {
        /// Package the request was addressed to.
        package: String,
    },
    /// The operating system refused the launch.
    #[error("launch refused: {message}")]
    Refused {
        /// Platform-supplied description.
        message: String,
    },
}

/// Operating-system service that opens the signer's UI.
///
/// The outcome does not come back through this trait; the host feeds it to
/// [`PendingCalls::deliver`] once the signer's activity finishes.
pub trait ActivityLauncher {
    /// Starts the signer activity.
    ///
    /// # Errors
    ///
    /// Returns a [`LaunchError`] when the activity cannot be started.
    fn launch(&self, request: &LaunchRequest) -> Result<(), LaunchError>;
}

/// Result code attached to an activity outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    /// The user approved and the signer answered.
    Ok,
    /// The user cancelled or the signer declined.
    Cancelled,
}

/// Outcome of a signer activity as reported by the operating system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityOutcome {
    code: ResultCode,
    extras: BTreeMap<String, String>,
}

impl ActivityOutcome {
    /// Creates an approved outcome without extras.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            code: ResultCode::Ok,
            extras: BTreeMap::new(),
        }
    }

    /// Creates a cancelled outcome.
    #[must_use]
    pub const fn cancelled() -> Self {
        Self {
            code: ResultCode::Cancelled,
            extras: BTreeMap::new(),
        }
    }

    /// Adds a string extra.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(name.into(), value.into());
        self
    }

    /// Returns the result code.
    #[must_use]
    pub const fn code(&self) -> ResultCode {
        self.code
    }

    /// Returns the string extras.
    #[must_use]
    pub const fn extras(&self) -> &BTreeMap<String, String> {
        &self.extras
    }

    /// Converts an approved outcome into a reply; cancelled outcomes carry
    /// no reply.
    #[must_use]
    pub fn into_reply(self) -> Option<RawReply> {
        match self.code {
            ResultCode::Ok => Some(self.extras.into_iter().collect()),
            ResultCode::Cancelled => None,
        }
    }
}

/// Launches signer activities and awaits their outcomes.
#[derive(Debug, Clone)]
pub struct InteractiveChannel<L> {
    launcher: L,
    pending: PendingCalls,
    timeout: Duration,
}

impl<L> InteractiveChannel<L> {
    /// Creates a channel that reports outcomes through `pending`.
    #[must_use]
    pub const fn new(launcher: L, pending: PendingCalls, timeout: Duration) -> Self {
        Self {
            launcher,
            pending,
            timeout,
        }
    }

    /// Returns the launcher.
    #[must_use]
    pub const fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Returns the handle the host uses to deliver outcomes.
    #[must_use]
    pub const fn pending(&self) -> &PendingCalls {
        &self.pending
    }

    /// Returns how long a round trip may wait for its outcome.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<L: ActivityLauncher> InteractiveChannel<L> {
    /// Launches the signer and waits for its answer.
    ///
    /// # Errors
    ///
    /// - [`SignerError::ChannelBusy`] if another round trip is in flight.
    /// - [`SignerError::LaunchFailed`] if the launcher refuses.
    /// - [`SignerError::UserCancelled`] if the outcome is cancelled.
    /// - [`SignerError::Timeout`] if no outcome arrives in time.
    pub async fn round_trip(
        &self,
        package: &str,
        request: &OperationRequest,
    ) -> Result<RawReply, SignerError> {
        let kind = request.kind();
        let launch = LaunchRequest::for_operation(package, request);
        let (guard, receiver) = self.pending.reserve(kind)?;

        debug!(
            target: INTERACTIVE_TARGET,
            %kind,
            package,
            ticket = guard.ticket(),
            "launching signer"
        );
        if let Err(err) = self.launcher.launch(&launch) {
            warn!(target: INTERACTIVE_TARGET, %kind, package, error = %err, "signer launch failed");
            return Err(SignerError::LaunchFailed {
                package: package.to_owned(),
                message: err.to_string(),
            });
        }
        guard.awaiting_result();

        let outcome = match tokio::time::timeout(self.timeout, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                return Err(SignerError::Internal {
                    message: format!("outcome channel for {kind} closed without a result"),
                });
            }
            Err(_) => {
                warn!(
                    target: INTERACTIVE_TARGET,
                    %kind,
                    package,
                    timeout = ?self.timeout,
                    "signer did not answer in time"
                );
                return Err(SignerError::Timeout {
                    timeout: self.timeout,
                });
            }
        };
        drop(guard);

        let code = outcome.code();
        outcome.into_reply().map_or_else(
            || {
                debug!(target: INTERACTIVE_TARGET, %kind, ?code, "signer request cancelled");
                Err(SignerError::UserCancelled)
            },
            |reply| {
                debug!(
                    target: INTERACTIVE_TARGET,
                    %kind,
                    tagged = reply.get(fields::TYPE).is_some(),
                    "signer answered"
                );
                Ok(reply)
            },
        )
    }
}
