//! Routes catalog operations to the selected signer application.
//!
//! The [`Dispatcher`] owns the session's active signer selection and drives
//! each request through the same pipeline: validate the parameters, require
//! a selected and installed signer, try the direct query channel, fall back
//! to the interactive channel, then decode the reply into the operation's
//! result shape.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use nostr_signer_config::{Config, default_interactive_timeout};
use tracing::{debug, info};

use crate::catalog::{OperationKind, Params, params};
use crate::direct::{ContentQuery, DirectChannel, DirectOutcome};
use crate::discovery::{Discovery, PackageResolver, SignerIdentity};
use crate::error::SignerError;
use crate::interactive::{ActivityLauncher, InteractiveChannel, PendingCalls};
use crate::protocol::{
    CipherPayload, OperationRequest, OperationResult, PublicKey, RelayList, SignedEvent, decode,
};

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Per-session tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    interactive_timeout: Duration,
}

impl SessionSettings {
    /// Creates settings with the given interactive timeout.
    #[must_use]
    pub const fn new(interactive_timeout: Duration) -> Self {
        Self {
            interactive_timeout,
        }
    }

    /// Derives settings from loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.interactive_timeout())
    }

    /// Returns how long an interactive round trip may wait.
    #[must_use]
    pub const fn interactive_timeout(&self) -> Duration {
        self.interactive_timeout
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::new(default_interactive_timeout())
    }
}

/// Operating-system services the dispatcher talks to.
#[derive(Debug, Clone, Default)]
pub struct SignerPorts<R, Q, L> {
    /// Answers which applications handle the signer scheme.
    pub resolver: R,
    /// Executes direct content-provider queries.
    pub query: Q,
    /// Opens the signer for interactive approval.
    pub launcher: L,
}

/// Dispatches delegated operations for one session.
#[derive(Debug)]
pub struct Dispatcher<R, Q, L> {
    discovery: Discovery<R>,
    direct: DirectChannel<Q>,
    interactive: InteractiveChannel<L>,
    selection: RwLock<Option<String>>,
}

impl<R, Q, L> Dispatcher<R, Q, L> {
    /// Creates a dispatcher with no signer selected.
    ///
    /// Activity outcomes must be fed to `pending`; the same handle is
    /// available later through [`Dispatcher::activity_results`].
    #[must_use]
    pub fn new(ports: SignerPorts<R, Q, L>, pending: PendingCalls, settings: SessionSettings) -> Self {
        let SignerPorts {
            resolver,
            query,
            launcher,
        } = ports;
        Self {
            discovery: Discovery::new(resolver),
            direct: DirectChannel::new(query),
            interactive: InteractiveChannel::new(launcher, pending, settings.interactive_timeout()),
            selection: RwLock::new(None),
        }
    }

    /// Creates a dispatcher from loaded configuration, preselecting the
    /// configured signer package if there is one.
    #[must_use]
    pub fn from_config(ports: SignerPorts<R, Q, L>, pending: PendingCalls, config: &Config) -> Self {
        let dispatcher = Self::new(ports, pending, SessionSettings::from_config(config));
        if let Some(package) = config.signer_package() {
            dispatcher.replace_selection(package.to_owned());
        }
        dispatcher
    }

    /// Selects the signer application used by every later request.
    ///
    /// Surrounding whitespace is ignored. The selection is not checked
    /// against installed applications; that happens per request.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::MissingParameter`] naming `packageName` when
    /// `package` is blank.
    pub fn set_package_name(&self, package: &str) -> Result<(), SignerError> {
        let trimmed = package.trim();
        if trimmed.is_empty() {
            return Err(SignerError::missing_parameter(params::PACKAGE_NAME));
        }
        self.replace_selection(trimmed.to_owned());
        Ok(())
    }

    /// Returns the selected signer package, if any.
    #[must_use]
    pub fn active_package(&self) -> Option<String> {
        self.selection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the handle through which the host delivers activity outcomes.
    #[must_use]
    pub fn activity_results(&self) -> PendingCalls {
        self.interactive.pending().clone()
    }

    /// Returns the discovery front-end.
    #[must_use]
    pub const fn discovery(&self) -> &Discovery<R> {
        &self.discovery
    }

    /// Returns the interactive round-trip timeout.
    #[must_use]
    pub const fn interactive_timeout(&self) -> Duration {
        self.interactive.timeout()
    }

    fn replace_selection(&self, package: String) {
        info!(target: DISPATCH_TARGET, package = package.as_str(), "signer package selected");
        *self
            .selection
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(package);
    }
}

impl<R, Q, L> Dispatcher<R, Q, L>
where
    R: PackageResolver,
    Q: ContentQuery,
    L: ActivityLauncher,
{
    /// Reports whether a signer is installed.
    ///
    /// Checks `package` when given, otherwise the active selection, and
    /// otherwise whether any signer at all is installed.
    #[must_use]
    pub fn is_external_signer_installed(&self, package: Option<&str>) -> bool {
        package
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .or_else(|| self.active_package())
            .map_or_else(
                || self.discovery.any_installed(),
                |wanted| self.discovery.is_installed(&wanted),
            )
    }

    /// Lists every installed signer application.
    #[must_use]
    pub fn list_installed_signers(&self) -> Vec<SignerIdentity> {
        self.discovery.list_candidates().collect()
    }

    /// Validates `supplied` against `kind` and dispatches the request.
    ///
    /// Must be polled on a Tokio runtime with the time driver enabled;
    /// interactive round trips wait under a Tokio timeout.
    ///
    /// # Errors
    ///
    /// Returns the first [`SignerError`] raised by validation, signer
    /// selection, the interactive channel, or reply decoding.
    pub async fn execute(
        &self,
        kind: OperationKind,
        supplied: &Params,
    ) -> Result<OperationResult, SignerError> {
        let request = kind.validate(supplied)?;
        self.dispatch(&request).await
    }

    /// Dispatches an already validated request.
    ///
    /// Has the same runtime requirement as [`Dispatcher::execute`].
    ///
    /// # Errors
    ///
    /// - [`SignerError::NoSignerConfigured`] when no signer is selected.
    /// - [`SignerError::SignerNotInstalled`] when the selected signer is
    ///   missing.
    /// - Any interactive channel or decoding error.
    pub async fn dispatch(&self, request: &OperationRequest) -> Result<OperationResult, SignerError> {
        let kind = request.kind();
        let package = self.active_package().ok_or(SignerError::NoSignerConfigured)?;
        if !self.discovery.is_installed(&package) {
            return Err(SignerError::SignerNotInstalled { package });
        }

        let reply = match self.direct.fetch(&package, request) {
            DirectOutcome::Answered(reply) => {
                debug!(target: DISPATCH_TARGET, %kind, package = package.as_str(), "answered by direct query");
                reply
            }
            DirectOutcome::NoResult => {
                debug!(
                    target: DISPATCH_TARGET,
                    %kind,
                    package = package.as_str(),
                    "falling back to interactive signer"
                );
                self.interactive.round_trip(&package, request).await?
            }
        };

        let result = decode(request, &package, &reply)?;
        debug!(target: DISPATCH_TARGET, %kind, "operation completed");
        Ok(result)
    }

    /// Retrieves the user's public key, forwarding optional permissions.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    pub async fn get_public_key(&self, permissions: Option<&str>) -> Result<PublicKey, SignerError> {
        let supplied = build_params(&[(params::PERMISSIONS, permissions)]);
        match self.execute(OperationKind::GetPublicKey, &supplied).await? {
            OperationResult::PublicKey(key) => Ok(key),
            other => Err(unexpected_variant(OperationKind::GetPublicKey, &other)),
        }
    }

    /// Signs an event.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    pub async fn sign_event(
        &self,
        event_json: &str,
        event_id: &str,
        npub: &str,
    ) -> Result<SignedEvent, SignerError> {
        let supplied = build_params(&[
            (params::EVENT_JSON, Some(event_json)),
            (params::EVENT_ID, Some(event_id)),
            (params::NPUB, Some(npub)),
        ]);
        match self.execute(OperationKind::SignEvent, &supplied).await? {
            OperationResult::SignedEvent(event) => Ok(event),
            other => Err(unexpected_variant(OperationKind::SignEvent, &other)),
        }
    }

    /// Encrypts `plain_text` for `pub_key` with NIP-04.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    pub async fn nip04_encrypt(
        &self,
        plain_text: &str,
        pub_key: &str,
        npub: &str,
        id: Option<&str>,
    ) -> Result<CipherPayload, SignerError> {
        self.cipher(OperationKind::Nip04Encrypt, params::PLAIN_TEXT, plain_text, pub_key, npub, id)
            .await
    }

    /// Decrypts `encrypted_text` from `pub_key` with NIP-04.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    pub async fn nip04_decrypt(
        &self,
        encrypted_text: &str,
        pub_key: &str,
        npub: &str,
        id: Option<&str>,
    ) -> Result<CipherPayload, SignerError> {
        self.cipher(
            OperationKind::Nip04Decrypt,
            params::ENCRYPTED_TEXT,
            encrypted_text,
            pub_key,
            npub,
            id,
        )
        .await
    }

    /// Encrypts `plain_text` for `pub_key` with NIP-44.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    pub async fn nip44_encrypt(
        &self,
        plain_text: &str,
        pub_key: &str,
        npub: &str,
        id: Option<&str>,
    ) -> Result<CipherPayload, SignerError> {
        self.cipher(OperationKind::Nip44Encrypt, params::PLAIN_TEXT, plain_text, pub_key, npub, id)
            .await
    }

    /// Decrypts `encrypted_text` from `pub_key` with NIP-44.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    pub async fn nip44_decrypt(
        &self,
        encrypted_text: &str,
        pub_key: &str,
        npub: &str,
        id: Option<&str>,
    ) -> Result<CipherPayload, SignerError> {
        self.cipher(
            OperationKind::Nip44Decrypt,
            params::ENCRYPTED_TEXT,
            encrypted_text,
            pub_key,
            npub,
            id,
        )
        .await
    }

    /// Decrypts a private zap notification event.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    pub async fn decrypt_notification_event(
        &self,
        event_json: &str,
        npub: &str,
        id: Option<&str>,
    ) -> Result<CipherPayload, SignerError> {
        let kind = OperationKind::DecryptNotificationEvent;
        let supplied = build_params(&[
            (params::EVENT_JSON, Some(event_json)),
            (params::NPUB, Some(npub)),
            (params::ID, id),
        ]);
        let result = self.execute(kind, &supplied).await?;
        result
            .cipher_payload()
            .cloned()
            .ok_or_else(|| unexpected_variant(kind, &result))
    }

    /// Retrieves the user's relay list.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    pub async fn get_relays(&self, npub: &str, id: Option<&str>) -> Result<RelayList, SignerError> {
        let supplied = build_params(&[(params::NPUB, Some(npub)), (params::ID, id)]);
        match self.execute(OperationKind::GetRelays, &supplied).await? {
            OperationResult::Relays(relays) => Ok(relays),
            other => Err(unexpected_variant(OperationKind::GetRelays, &other)),
        }
    }

    async fn cipher(
        &self,
        kind: OperationKind,
        text_param: &str,
        text: &str,
        pub_key: &str,
        npub: &str,
        id: Option<&str>,
    ) -> Result<CipherPayload, SignerError> {
        let supplied = build_params(&[
            (text_param, Some(text)),
            (params::PUB_KEY, Some(pub_key)),
            (params::NPUB, Some(npub)),
            (params::ID, id),
        ]);
        let result = self.execute(kind, &supplied).await?;
        if result.kind() != kind {
            return Err(unexpected_variant(kind, &result));
        }
        result
            .cipher_payload()
            .cloned()
            .ok_or_else(|| unexpected_variant(kind, &result))
    }
}

fn build_params(entries: &[(&str, Option<&str>)]) -> Params {
    entries
        .iter()
        .filter_map(|(name, value)| value.map(|present| ((*name).to_owned(), present.to_owned())))
        .collect()
}

fn unexpected_variant(kind: OperationKind, result: &OperationResult) -> SignerError {
    SignerError::Internal {
        message: format!("{kind} produced a {} result", result.kind()),
    }
}

#[cfg(test)]
mod tests;
