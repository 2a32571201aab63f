//! Operation catalog for delegated signer requests.
//!
//! The catalog is the fixed set of operations a signer application can be
//! asked to perform. Each [`OperationKind`] declares its wire tag, the
//! content-provider endpoint used by the direct query channel, the host
//! method name, and an [`OperationContract`] listing required parameters,
//! optional parameters with their defaults, and the fields of its result.
//!
//! Validation against a contract is pure: it either produces an
//! [`OperationRequest`] with defaults filled in, or fails with
//! [`SignerError::MissingParameter`] naming the first absent parameter.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SignerError;
use crate::protocol::OperationRequest;

/// Correlation id used when the caller does not supply one.
///
/// Signer applications echo the id verbatim, so every request that omits
/// it shares this placeholder.
pub const PLACEHOLDER_CORRELATION_ID: &str = "some_id";

/// Parameter names accepted by the catalog.
pub mod params {
    /// Package identifier of a signer application.
    pub const PACKAGE_NAME: &str = "packageName";
    /// Permission list forwarded when requesting the public key.
    pub const PERMISSIONS: &str = "permissions";
    /// Unsigned or encrypted event serialised as JSON.
    pub const EVENT_JSON: &str = "eventJson";
    /// Identifier of the event being signed.
    pub const EVENT_ID: &str = "eventId";
    /// Acting user's public key.
    pub const NPUB: &str = "npub";
    /// Text to encrypt.
    pub const PLAIN_TEXT: &str = "plainText";
    /// Text to decrypt.
    pub const ENCRYPTED_TEXT: &str = "encryptedText";
    /// Counterparty public key for encryption and decryption.
    pub const PUB_KEY: &str = "pubKey";
    /// Caller-supplied correlation id.
    pub const ID: &str = "id";
}

/// Key-value parameters attached to a request.
pub type Params = BTreeMap<String, String>;

/// An optional request parameter and the value used when it is omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionalParameter {
    name: &'static str,
    default: Option<&'static str>,
}

impl OptionalParameter {
    const fn new(name: &'static str, default: Option<&'static str>) -> Self {
        Self { name, default }
    }

    /// Returns the parameter name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the default applied when the parameter is omitted.
    #[must_use]
    pub const fn default(&self) -> Option<&'static str> {
        self.default
    }
}

/// Where a request takes its correlation id from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationSource {
    /// The request has no caller id; the placeholder is used.
    Placeholder,
    /// The named parameter holds the correlation id.
    Parameter(&'static str),
}

/// Parameter and result declaration for one operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationContract {
    required: &'static [&'static str],
    optional: &'static [OptionalParameter],
    correlation: CorrelationSource,
    result_fields: &'static [&'static str],
}

impl OperationContract {
    /// Parameters that must be present, in declaration order.
    #[must_use]
    pub const fn required(&self) -> &'static [&'static str] {
        self.required
    }

    /// Parameters that may be omitted.
    #[must_use]
    pub const fn optional(&self) -> &'static [OptionalParameter] {
        self.optional
    }

    /// Source of the request's correlation id.
    #[must_use]
    pub const fn correlation(&self) -> CorrelationSource {
        self.correlation
    }

    /// Field names of the host-facing result object.
    #[must_use]
    pub const fn result_fields(&self) -> &'static [&'static str] {
        self.result_fields
    }
}

const OPTIONAL_ID: &[OptionalParameter] = &[OptionalParameter::new(
    params::ID,
    Some(PLACEHOLDER_CORRELATION_ID),
)];

const CIPHER_RESULT: &[&str] = &["result", "id"];

const GET_PUBLIC_KEY: OperationContract = OperationContract {
    required: &[],
    optional: &[OptionalParameter::new(params::PERMISSIONS, None)],
    correlation: CorrelationSource::Placeholder,
    result_fields: &["npub", "package"],
};

const SIGN_EVENT: OperationContract = OperationContract {
    required: &[params::EVENT_JSON, params::EVENT_ID, params::NPUB],
    optional: &[],
    correlation: CorrelationSource::Parameter(params::EVENT_ID),
    result_fields: &["signature", "id", "event"],
};

const ENCRYPT: OperationContract = OperationContract {
    required: &[params::PLAIN_TEXT, params::PUB_KEY, params::NPUB],
    optional: OPTIONAL_ID,
    correlation: CorrelationSource::Parameter(params::ID),
    result_fields: CIPHER_RESULT,
};

const DECRYPT: OperationContract = OperationContract {
    required: &[params::ENCRYPTED_TEXT, params::PUB_KEY, params::NPUB],
    optional: OPTIONAL_ID,
    correlation: CorrelationSource::Parameter(params::ID),
    result_fields: CIPHER_RESULT,
};

const DECRYPT_NOTIFICATION: OperationContract = OperationContract {
    required: &[params::EVENT_JSON, params::NPUB],
    optional: OPTIONAL_ID,
    correlation: CorrelationSource::Parameter(params::ID),
    result_fields: CIPHER_RESULT,
};

const GET_RELAYS: OperationContract = OperationContract {
    required: &[params::NPUB],
    optional: OPTIONAL_ID,
    correlation: CorrelationSource::Parameter(params::ID),
    result_fields: CIPHER_RESULT,
};

/// A delegated operation supported by signer applications.
///
/// # Example
///
/// ```
/// use nostr_signer::OperationKind;
///
/// let kind = OperationKind::from_tag("nip44_decrypt").expect("known tag");
/// assert_eq!(kind, OperationKind::Nip44Decrypt);
/// assert_eq!(kind.endpoint(), "NIP44_DECRYPT");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Retrieve the user's public key.
    GetPublicKey,
    /// Sign an event.
    SignEvent,
    /// Encrypt with the NIP-04 scheme.
    Nip04Encrypt,
    /// Decrypt with the NIP-04 scheme.
    Nip04Decrypt,
    /// Encrypt with the NIP-44 scheme.
    Nip44Encrypt,
    /// Decrypt with the NIP-44 scheme.
    Nip44Decrypt,
    /// Decrypt a private zap notification event.
    #[serde(rename = "decrypt_zap_event")]
    DecryptNotificationEvent,
    /// Retrieve the user's relay list.
    GetRelays,
}

impl OperationKind {
    /// Every kind in the catalog.
    pub const ALL: [Self; 8] = [
        Self::GetPublicKey,
        Self::SignEvent,
        Self::Nip04Encrypt,
        Self::Nip04Decrypt,
        Self::Nip44Encrypt,
        Self::Nip44Decrypt,
        Self::DecryptNotificationEvent,
        Self::GetRelays,
    ];

    /// Returns the wire tag carried in the `type` field of launch requests
    /// and replies.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::GetPublicKey => "get_public_key",
            Self::SignEvent => "sign_event",
            Self::Nip04Encrypt => "nip04_encrypt",
            Self::Nip04Decrypt => "nip04_decrypt",
            Self::Nip44Encrypt => "nip44_encrypt",
            Self::Nip44Decrypt => "nip44_decrypt",
            Self::DecryptNotificationEvent => "decrypt_zap_event",
            Self::GetRelays => "get_relays",
        }
    }

    /// Parses a wire tag.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::UnknownOperationKind`] for tags outside the
    /// catalog.
    pub fn from_tag(tag: &str) -> Result<Self, SignerError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.tag() == tag)
            .ok_or_else(|| SignerError::unknown_kind(tag))
    }

    /// Returns the content-provider endpoint suffix for direct queries.
    #[must_use]
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::GetPublicKey => "GET_PUBLIC_KEY",
            Self::SignEvent => "SIGN_EVENT",
            Self::Nip04Encrypt => "NIP04_ENCRYPT",
            Self::Nip04Decrypt => "NIP04_DECRYPT",
            Self::Nip44Encrypt => "NIP44_ENCRYPT",
            Self::Nip44Decrypt => "NIP44_DECRYPT",
            Self::DecryptNotificationEvent => "DECRYPT_ZAP_EVENT",
            Self::GetRelays => "GET_RELAYS",
        }
    }

    /// Returns the host runtime method that invokes this operation.
    #[must_use]
    pub const fn method_name(self) -> &'static str {
        match self {
            Self::GetPublicKey => "getPublicKey",
            Self::SignEvent => "signEvent",
            Self::Nip04Encrypt => "nip04Encrypt",
            Self::Nip04Decrypt => "nip04Decrypt",
            Self::Nip44Encrypt => "nip44Encrypt",
            Self::Nip44Decrypt => "nip44Decrypt",
            Self::DecryptNotificationEvent => "decryptNotificationEvent",
            Self::GetRelays => "getRelays",
        }
    }

    /// Resolves a host method name, accepting the legacy `decryptZapEvent`
    /// alias.
    #[must_use]
    pub fn from_method_name(name: &str) -> Option<Self> {
        if name == "decryptZapEvent" {
            return Some(Self::DecryptNotificationEvent);
        }
        Self::ALL.into_iter().find(|kind| kind.method_name() == name)
    }

    /// Returns the parameter and result contract.
    #[must_use]
    pub const fn contract(self) -> &'static OperationContract {
        match self {
            Self::GetPublicKey => &GET_PUBLIC_KEY,
            Self::SignEvent => &SIGN_EVENT,
            Self::Nip04Encrypt | Self::Nip44Encrypt => &ENCRYPT,
            Self::Nip04Decrypt | Self::Nip44Decrypt => &DECRYPT,
            Self::DecryptNotificationEvent => &DECRYPT_NOTIFICATION,
            Self::GetRelays => &GET_RELAYS,
        }
    }

    /// Validates parameters against this kind's contract.
    ///
    /// Optional parameters that are absent receive their declared default;
    /// parameters the contract does not mention are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::MissingParameter`] naming the first required
    /// parameter that is absent.
    pub fn validate(self, supplied: &Params) -> Result<OperationRequest, SignerError> {
        let contract = self.contract();
        let mut accepted = Params::new();

        for &name in contract.required {
            let value = supplied
                .get(name)
                .ok_or_else(|| SignerError::missing_parameter(name))?;
            accepted.insert(name.to_owned(), value.clone());
        }

        for optional in contract.optional {
            let value = supplied
                .get(optional.name)
                .cloned()
                .or_else(|| optional.default.map(str::to_owned));
            if let Some(present) = value {
                accepted.insert(optional.name.to_owned(), present);
            }
        }

        let correlation_id = match contract.correlation {
            CorrelationSource::Placeholder => PLACEHOLDER_CORRELATION_ID.to_owned(),
            CorrelationSource::Parameter(name) => accepted
                .get(name)
                .cloned()
                .unwrap_or_else(|| PLACEHOLDER_CORRELATION_ID.to_owned()),
        };

        Ok(OperationRequest::new(self, accepted, correlation_id))
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
