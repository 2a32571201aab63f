//! Direct query channel: non-interactive answers from a signer's content
//! provider.
//!
//! A signer that already holds the user's permission for an operation can
//! answer it synchronously through a content provider addressed as
//! `content://<package>.<ENDPOINT>`. The operation's parameters travel
//! positionally in the query projection. The first record's `signature`
//! column carries the answer.
//!
//! Nothing that goes wrong here is an error for the caller. A missing
//! provider, an empty cursor, a missing column, or a failing query all mean
//! [`DirectOutcome::NoResult`], and the dispatcher falls back to the
//! interactive channel.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::catalog::{OperationKind, params};
use crate::error::SignerError;
use crate::protocol::{OperationRequest, RawReply, fields};

/// Tracing target for direct query operations.
const DIRECT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::direct");

/// Projection used when asking for the public key.
const LOGIN_PROJECTION: &str = "login";

/// Selection flag sent with signing queries.
const SIGN_SELECTION: &str = "1";

/// First record of a query result, keyed by column name.
pub type Record = BTreeMap<String, String>;

/// A synchronous query against a signer's content provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentQueryRequest {
    uri: String,
    projection: Vec<String>,
    selection: Option<String>,
}

impl ContentQueryRequest {
    /// Builds the query for `request` addressed to `package`.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::MissingParameter`] if the request lacks a
    /// parameter its kind requires.
    pub fn for_operation(package: &str, request: &OperationRequest) -> Result<Self, SignerError> {
        let kind = request.kind();
        let uri = format!("content://{package}.{}", kind.endpoint());
        let (projection, selection) = match kind {
            OperationKind::GetPublicKey => (vec![LOGIN_PROJECTION.to_owned()], None),
            OperationKind::SignEvent => (
                vec![
                    request.require(params::EVENT_JSON)?.to_owned(),
                    String::new(),
                    request.require(params::NPUB)?.to_owned(),
                ],
                Some(SIGN_SELECTION.to_owned()),
            ),
            OperationKind::Nip04Encrypt | OperationKind::Nip44Encrypt => (
                vec![
                    request.require(params::PLAIN_TEXT)?.to_owned(),
                    request.require(params::PUB_KEY)?.to_owned(),
                    request.require(params::NPUB)?.to_owned(),
                ],
                None,
            ),
            OperationKind::Nip04Decrypt | OperationKind::Nip44Decrypt => (
                vec![
                    request.require(params::ENCRYPTED_TEXT)?.to_owned(),
                    request.require(params::PUB_KEY)?.to_owned(),
                    request.require(params::NPUB)?.to_owned(),
                ],
                None,
            ),
            OperationKind::DecryptNotificationEvent => (
                vec![
                    request.require(params::EVENT_JSON)?.to_owned(),
                    String::new(),
                    request.require(params::NPUB)?.to_owned(),
                ],
                None,
            ),
            OperationKind::GetRelays => (vec![request.require(params::NPUB)?.to_owned()], None),
        };
        Ok(Self {
            uri,
            projection,
            selection,
        })
    }

    /// Returns the provider URI.
    #[must_use]
    pub const fn uri(&self) -> &str {
        self.uri.as_str()
    }

    /// Returns the positional filter terms.
    #[must_use]
    pub fn projection(&self) -> &[String] {
        &self.projection
    }

    /// Returns the selection clause, if any.
    #[must_use]
    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }
}

/// Failures reported by a [`ContentQuery`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// No provider is registered for the URI.
    #[error("content provider '{uri}' is unavailable")]
    Unavailable {
        /// URI that was queried.
        uri: String,
    },
    /// The provider raised an error.
    #[error("query against '{uri}' failed: {message}")]
    Failed {
        /// URI that was queried.
        uri: String,
        /// Provider-supplied description.
        message: String,
    },
}

/// Operating-system service executing synchronous record queries.
pub trait ContentQuery {
    /// Runs the query and returns its first record, or `None` when the
    /// provider returned no cursor or no rows.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] when the provider is missing or fails.
    fn query(&self, request: &ContentQueryRequest) -> Result<Option<Record>, QueryError>;
}

/// Outcome of a direct query attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectOutcome {
    /// The signer answered without user interaction.
    Answered(RawReply),
    /// The operation needs the interactive channel.
    NoResult,
}

/// Runs direct queries through a [`ContentQuery`] implementation.
#[derive(Debug, Clone, Default)]
pub struct DirectChannel<Q> {
    query: Q,
}

impl<Q> DirectChannel<Q> {
    /// Creates a channel over the given query service.
    #[must_use]
    pub const fn new(query: Q) -> Self {
        Self { query }
    }

    /// Returns the underlying query service.
    #[must_use]
    pub const fn query_service(&self) -> &Q {
        &self.query
    }
}

impl<Q: ContentQuery> DirectChannel<Q> {
    /// Attempts to answer `request` without launching the signer.
    #[must_use]
    pub fn fetch(&self, package: &str, request: &OperationRequest) -> DirectOutcome {
        let kind = request.kind();
        let query = match ContentQueryRequest::for_operation(package, request) {
            Ok(query) => query,
            Err(err) => {
                debug!(target: DIRECT_TARGET, %kind, error = %err, "direct query skipped");
                return DirectOutcome::NoResult;
            }
        };

        let record = match self.query.query(&query) {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(target: DIRECT_TARGET, %kind, uri = query.uri(), "direct query returned no record");
                return DirectOutcome::NoResult;
            }
            Err(err) => {
                debug!(target: DIRECT_TARGET, %kind, error = %err, "direct query failed");
                return DirectOutcome::NoResult;
            }
        };

        match answer_from_record(kind, &record) {
            Some(reply) => {
                debug!(target: DIRECT_TARGET, %kind, "direct query answered");
                DirectOutcome::Answered(reply)
            }
            None => {
                debug!(
                    target: DIRECT_TARGET,
                    %kind,
                    columns = record.len(),
                    "direct query record lacks result columns"
                );
                DirectOutcome::NoResult
            }
        }
    }
}

/// Extracts the answer columns, or `None` if the record cannot answer.
fn answer_from_record(kind: OperationKind, record: &Record) -> Option<RawReply> {
    if record.contains_key(fields::REJECTED) {
        return None;
    }
    let answer = record
        .get(fields::SIGNATURE)
        .or_else(|| record.get(fields::RESULT))?;
    let reply = RawReply::new().with(fields::SIGNATURE, answer.as_str());
    match kind {
        OperationKind::SignEvent => {
            let event = record.get(fields::EVENT)?;
            Some(reply.with(fields::EVENT, event.as_str()))
        }
        OperationKind::GetPublicKey
        | OperationKind::Nip04Encrypt
        | OperationKind::Nip04Decrypt
        | OperationKind::Nip44Encrypt
        | OperationKind::Nip44Decrypt
        | OperationKind::DecryptNotificationEvent
        | OperationKind::GetRelays => Some(reply),
    }
}
