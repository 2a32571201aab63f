//! Delegated signing for Nostr clients through an external signer
//! application.
//!
//! A Nostr client that does not hold the user's private key asks a separate
//! signer application to retrieve the public key, sign events, and encrypt
//! or decrypt messages on its behalf. This crate implements the client side
//! of that protocol as a dispatch layer over three operating-system
//! services:
//!
//! - a [`discovery::PackageResolver`] that lists applications handling the
//!   `nostrsigner:` scheme,
//! - a [`direct::ContentQuery`] that answers already-permitted operations
//!   synchronously, and
//! - an [`interactive::ActivityLauncher`] that opens the signer for user
//!   approval.
//!
//! # Architecture
//!
//! Every request flows through the [`Dispatcher`]: its parameters are
//! validated against the [`catalog`], the session's selected signer must be
//! installed, the direct query channel is tried first, and the interactive
//! channel is used only when the direct channel cannot answer. Replies are
//! decoded into an [`OperationResult`] without touching the cryptographic
//! payloads. The [`HostBridge`] exposes the same operations as named JSON
//! methods for a host runtime.
//!
//! Interactive round trips suspend the caller until the host delivers the
//! signer's outcome through [`PendingCalls::deliver`]. One round trip may be
//! in flight at a time.
//!
//! # Example
//!
//! ```rust
//! use nostr_signer::{OperationKind, SignerError};
//! use nostr_signer::catalog::Params;
//!
//! let mut params = Params::new();
//! params.insert("eventJson".into(), "{\"kind\":1}".into());
//! params.insert("eventId".into(), "abc".into());
//!
//! let err = OperationKind::SignEvent
//!     .validate(&params)
//!     .expect_err("npub is required");
//! assert_eq!(err, SignerError::missing_parameter("npub"));
//! ```

pub mod bridge;
pub mod catalog;
pub mod direct;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod interactive;
pub mod protocol;
pub mod telemetry;

#[cfg(test)]
mod tests;

pub use self::bridge::HostBridge;
pub use self::catalog::OperationKind;
pub use self::discovery::SignerIdentity;
pub use self::dispatcher::{Dispatcher, SessionSettings, SignerPorts};
pub use self::error::SignerError;
pub use self::interactive::{ActivityOutcome, PendingCalls};
pub use self::protocol::OperationResult;
