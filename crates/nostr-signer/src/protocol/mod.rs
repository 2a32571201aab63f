//! Request, reply, and result types exchanged with signer applications.
//!
//! Both IPC channels answer with a [`RawReply`]: a flat bag of string fields,
//! optionally tagged with the operation kind in its `type` field. The
//! [`decode`] function turns a reply into the [`OperationResult`] variant of
//! the requested kind. Decoding only extracts and renames fields; signatures,
//! ciphertexts and plaintexts pass through untouched.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::catalog::{OperationKind, Params};
use crate::error::SignerError;

/// Field names used in replies from signer applications.
pub mod fields {
    /// Operation kind tag.
    pub const TYPE: &str = "type";
    /// Primary answer column (signature, key, ciphertext or plaintext).
    pub const SIGNATURE: &str = "signature";
    /// Newer name for the primary answer column.
    pub const RESULT: &str = "result";
    /// Signed event JSON.
    pub const EVENT: &str = "event";
    /// Echoed correlation id.
    pub const ID: &str = "id";
    /// Package of the signer that answered.
    pub const PACKAGE: &str = "package";
    /// Present when the signer refuses to answer without user interaction.
    pub const REJECTED: &str = "rejected";
}

/// A validated request for one catalog operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    kind: OperationKind,
    params: Params,
    correlation_id: String,
}

impl OperationRequest {
    pub(crate) const fn new(kind: OperationKind, params: Params, correlation_id: String) -> Self {
        Self {
            kind,
            params,
            correlation_id,
        }
    }

    /// Returns the operation kind.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Returns the validated parameters, defaults included.
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// Looks up a parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Looks up a parameter the contract declares as required.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::MissingParameter`] when the parameter is
    /// absent, which only happens for requests built outside the catalog.
    pub fn require(&self, name: &str) -> Result<&str, SignerError> {
        self.param(name)
            .ok_or_else(|| SignerError::missing_parameter(name))
    }

    /// Returns the correlation id the signer is expected to echo.
    #[must_use]
    pub const fn correlation_id(&self) -> &str {
        self.correlation_id.as_str()
    }
}

/// Undecoded reply from a signer application.
///
/// # Example
///
/// ```
/// use nostr_signer::protocol::RawReply;
///
/// let reply = RawReply::new()
///     .with("type", "sign_event")
///     .with("signature", "sig1");
/// assert_eq!(reply.tag(), Some("sign_event"));
/// assert_eq!(reply.get("signature"), Some("sig1"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawReply {
    fields: BTreeMap<String, String>,
}

impl RawReply {
    /// Creates an empty reply.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, replacing any previous value.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Returns a field value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Returns the operation kind tag, if the signer supplied one.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.get(fields::TYPE)
    }

    /// Returns the primary answer, preferring `signature` over `result`.
    #[must_use]
    pub fn answer(&self) -> Option<&str> {
        self.get(fields::SIGNATURE)
            .or_else(|| self.get(fields::RESULT))
    }

    /// Returns all fields.
    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawReply {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

/// Public key returned by the signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicKey {
    npub: String,
    #[serde(rename = "package")]
    package_id: String,
}

impl PublicKey {
    /// Creates a public key result.
    #[must_use]
    pub fn new(npub: impl Into<String>, package_id: impl Into<String>) -> Self {
        Self {
            npub: npub.into(),
            package_id: package_id.into(),
        }
    }

    /// Returns the public key as reported by the signer.
    #[must_use]
    pub const fn npub(&self) -> &str {
        self.npub.as_str()
    }

    /// Returns the package that answered.
    #[must_use]
    pub const fn package_id(&self) -> &str {
        self.package_id.as_str()
    }
}

/// Signature and signed event returned by the signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedEvent {
    signature: String,
    #[serde(rename = "id")]
    event_id: String,
    #[serde(rename = "event")]
    event_json: String,
}

impl SignedEvent {
    /// Creates a signed event result.
    #[must_use]
    pub fn new(
        signature: impl Into<String>,
        event_id: impl Into<String>,
        event_json: impl Into<String>,
    ) -> Self {
        Self {
            signature: signature.into(),
            event_id: event_id.into(),
            event_json: event_json.into(),
        }
    }

    /// Returns the signature.
    #[must_use]
    pub const fn signature(&self) -> &str {
        self.signature.as_str()
    }

    /// Returns the id of the signed event.
    #[must_use]
    pub const fn event_id(&self) -> &str {
        self.event_id.as_str()
    }

    /// Returns the signed event JSON.
    #[must_use]
    pub const fn event_json(&self) -> &str {
        self.event_json.as_str()
    }
}

/// Opaque payload produced by an encrypt or decrypt operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CipherPayload {
    #[serde(rename = "result")]
    payload: String,
    #[serde(rename = "id")]
    correlation_id: String,
}

impl CipherPayload {
    /// Creates a payload result.
    #[must_use]
    pub fn new(payload: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            correlation_id: correlation_id.into(),
        }
    }

    /// Returns the ciphertext or plaintext.
    #[must_use]
    pub const fn payload(&self) -> &str {
        self.payload.as_str()
    }

    /// Returns the echoed correlation id.
    #[must_use]
    pub const fn correlation_id(&self) -> &str {
        self.correlation_id.as_str()
    }
}

/// Relay list returned by the signer, as the JSON text it supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayList {
    #[serde(rename = "result")]
    relays_json: String,
    #[serde(rename = "id")]
    correlation_id: String,
}

impl RelayList {
    /// Creates a relay list result.
    #[must_use]
    pub fn new(relays_json: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            relays_json: relays_json.into(),
            correlation_id: correlation_id.into(),
        }
    }

    /// Returns the relay list JSON.
    #[must_use]
    pub const fn relays_json(&self) -> &str {
        self.relays_json.as_str()
    }

    /// Returns the echoed correlation id.
    #[must_use]
    pub const fn correlation_id(&self) -> &str {
        self.correlation_id.as_str()
    }
}

/// Typed outcome of a delegated operation, one variant per catalog kind.
///
/// Serialises to the flat object the host runtime receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OperationResult {
    /// Result of [`OperationKind::GetPublicKey`].
    PublicKey(PublicKey),
    /// Result of [`OperationKind::SignEvent`].
    SignedEvent(SignedEvent),
    /// Result of [`OperationKind::Nip04Encrypt`].
    Nip04Encrypt(CipherPayload),
    /// Result of [`OperationKind::Nip04Decrypt`].
    Nip04Decrypt(CipherPayload),
    /// Result of [`OperationKind::Nip44Encrypt`].
    Nip44Encrypt(CipherPayload),
    /// Result of [`OperationKind::Nip44Decrypt`].
    Nip44Decrypt(CipherPayload),
    /// Result of [`OperationKind::DecryptNotificationEvent`].
    NotificationDecrypt(CipherPayload),
    /// Result of [`OperationKind::GetRelays`].
    Relays(RelayList),
}

impl OperationResult {
    /// Returns the kind this result answers.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::PublicKey(_) => OperationKind::GetPublicKey,
            Self::SignedEvent(_) => OperationKind::SignEvent,
            Self::Nip04Encrypt(_) => OperationKind::Nip04Encrypt,
            Self::Nip04Decrypt(_) => OperationKind::Nip04Decrypt,
            Self::Nip44Encrypt(_) => OperationKind::Nip44Encrypt,
            Self::Nip44Decrypt(_) => OperationKind::Nip44Decrypt,
            Self::NotificationDecrypt(_) => OperationKind::DecryptNotificationEvent,
            Self::Relays(_) => OperationKind::GetRelays,
        }
    }

    /// Returns the payload of any encrypt or decrypt variant.
    #[must_use]
    pub const fn cipher_payload(&self) -> Option<&CipherPayload> {
        match self {
            Self::Nip04Encrypt(payload)
            | Self::Nip04Decrypt(payload)
            | Self::Nip44Encrypt(payload)
            | Self::Nip44Decrypt(payload)
            | Self::NotificationDecrypt(payload) => Some(payload),
            Self::PublicKey(_) | Self::SignedEvent(_) | Self::Relays(_) => None,
        }
    }

    /// Converts the result into the JSON object handed to the host.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::Internal`] if serialisation fails.
    pub fn to_json(&self) -> Result<serde_json::Value, SignerError> {
        serde_json::to_value(self).map_err(|err| SignerError::Internal {
            message: format!("failed to serialise {} result: {err}", self.kind()),
        })
    }
}

/// Decodes a reply into the result shape of the requested operation.
///
/// `package` is the active signer package and fills in a key retrieval
/// reply that does not name its sender. A reply without an `id` inherits
/// the request's correlation id.
///
/// # Errors
///
/// - [`SignerError::MalformedResponse`] when the reply's `type` tag is
///   outside the catalog or names a different kind, or when a result field
///   is missing.
/// - [`SignerError::CorrelationMismatch`] when the echoed id differs from the
///   request's correlation id.
pub fn decode(
    request: &OperationRequest,
    package: &str,
    reply: &RawReply,
) -> Result<OperationResult, SignerError> {
    let kind = request.kind();
    check_tag(kind, reply)?;
    let correlation_id = check_correlation(request, reply)?;

    match kind {
        OperationKind::GetPublicKey => decode_public_key(reply, package),
        OperationKind::SignEvent => decode_signed_event(reply, correlation_id),
        OperationKind::Nip04Encrypt => {
            decode_payload(kind, reply, correlation_id).map(OperationResult::Nip04Encrypt)
        }
        OperationKind::Nip04Decrypt => {
            decode_payload(kind, reply, correlation_id).map(OperationResult::Nip04Decrypt)
        }
        OperationKind::Nip44Encrypt => {
            decode_payload(kind, reply, correlation_id).map(OperationResult::Nip44Encrypt)
        }
        OperationKind::Nip44Decrypt => {
            decode_payload(kind, reply, correlation_id).map(OperationResult::Nip44Decrypt)
        }
        OperationKind::DecryptNotificationEvent => {
            decode_payload(kind, reply, correlation_id).map(OperationResult::NotificationDecrypt)
        }
        OperationKind::GetRelays => decode_relays(reply, correlation_id),
    }
}

fn check_tag(kind: OperationKind, reply: &RawReply) -> Result<(), SignerError> {
    let Some(tag) = reply.tag() else {
        return Ok(());
    };
    let declared = OperationKind::from_tag(tag).map_err(|_| {
        SignerError::malformed(tag, "reply declares an operation kind outside the catalog")
    })?;
    if declared != kind {
        return Err(SignerError::malformed(
            tag,
            format!("reply answers '{declared}' but '{kind}' was requested"),
        ));
    }
    Ok(())
}

fn check_correlation<'a>(
    request: &'a OperationRequest,
    reply: &'a RawReply,
) -> Result<&'a str, SignerError> {
    let expected = request.correlation_id();
    match reply.get(fields::ID) {
        Some(received) if received != expected => Err(SignerError::CorrelationMismatch {
            expected: expected.to_owned(),
            received: received.to_owned(),
        }),
        _ => Ok(expected),
    }
}

fn answer(kind: OperationKind, reply: &RawReply) -> Result<String, SignerError> {
    reply
        .answer()
        .map(str::to_owned)
        .ok_or_else(|| SignerError::malformed(kind.tag(), "reply carries no result field"))
}

fn decode_public_key(reply: &RawReply, package: &str) -> Result<OperationResult, SignerError> {
    let npub = answer(OperationKind::GetPublicKey, reply)?;
    let package_id = reply.get(fields::PACKAGE).unwrap_or(package);
    Ok(OperationResult::PublicKey(PublicKey::new(npub, package_id)))
}

fn decode_signed_event(
    reply: &RawReply,
    correlation_id: &str,
) -> Result<OperationResult, SignerError> {
    let kind = OperationKind::SignEvent;
    let signature = answer(kind, reply)?;
    let event_json = reply
        .get(fields::EVENT)
        .ok_or_else(|| SignerError::malformed(kind.tag(), "reply carries no signed event"))?;
    Ok(OperationResult::SignedEvent(SignedEvent::new(
        signature,
        correlation_id,
        event_json,
    )))
}

fn decode_payload(
    kind: OperationKind,
    reply: &RawReply,
    correlation_id: &str,
) -> Result<CipherPayload, SignerError> {
    let payload = answer(kind, reply)?;
    Ok(CipherPayload::new(payload, correlation_id))
}

fn decode_relays(reply: &RawReply, correlation_id: &str) -> Result<OperationResult, SignerError> {
    let relays_json = answer(OperationKind::GetRelays, reply)?;
    Ok(OperationResult::Relays(RelayList::new(
        relays_json,
        correlation_id,
    )))
}
