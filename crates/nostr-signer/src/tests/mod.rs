//! Crate-level integration and BDD tests, plus the stub signer they share.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::catalog::{OperationKind, Params, params};
use crate::direct::{ContentQuery, ContentQueryRequest, QueryError, Record};
use crate::discovery::{PackageResolver, ResolvedHandler};
use crate::dispatcher::{Dispatcher, SessionSettings, SignerPorts};
use crate::error::SignerError;
use crate::interactive::{
    ActivityLauncher, ActivityOutcome, Delivery, LaunchError, LaunchRequest, PendingCalls,
};
use crate::protocol::OperationResult;


pub(crate) const SIGNER_PACKAGE: &str = "com.greenart7c3.nostrsigner";
pub(crate) const STUB_NPUB: &str = "npub1stubsigner";
pub(crate) const STUB_SIGNATURE: &str = "sig1";
pub(crate) const STUB_RELAYS: &str = "{\"wss://relay.example\":{\"read\":true,\"write\":true}}";

pub(crate) type StubDispatcher = Dispatcher<StubSigner, StubSigner, StubSigner>;

/// How the stub signer reacts when launched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) enum Approval {
    /// Answer every launch as a cooperative signer would.
    #[default]
    Approve,
    /// Report that the user dismissed the signer.
    Cancel,
    /// Stay open; the test delivers the outcome itself.
    Ignore,
    /// Answer with exactly these extras.
    Reply(Vec<(String, String)>),
    /// Fail the launch.
    Refuse,
}

#[derive(Debug, Default)]
struct StubState {
    installed: Vec<ResolvedHandler>,
    direct: HashSet<OperationKind>,
    approval: Approval,
    launches: Vec<LaunchRequest>,
    queries: Vec<ContentQueryRequest>,
}

/// In-process signer application standing in for every OS service.
///
/// Encryption is base64 of the plaintext, so ciphertexts round-trip
/// through decryption without any real cryptography.
#[derive(Debug, Clone, Default)]
pub(crate) struct StubSigner {
    state: Rc<RefCell<StubState>>,
    pending: PendingCalls,
}

impl StubSigner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn installed(self, package: &str, label: &str) -> Self {
        self.state.borrow_mut().installed.push(ResolvedHandler::new(
            package,
            Some(label.to_owned()),
            vec![0x89, 0x50, 0x4e, 0x47],
        ));
        self
    }

    /// Lets the content provider answer `kind` without user interaction.
    pub(crate) fn allow_direct(self, kind: OperationKind) -> Self {
        self.state.borrow_mut().direct.insert(kind);
        self
    }

    pub(crate) fn set_approval(&self, approval: Approval) {
        self.state.borrow_mut().approval = approval;
    }

    pub(crate) fn launches(&self) -> Vec<LaunchRequest> {
        self.state.borrow().launches.clone()
    }

    pub(crate) fn queries(&self) -> Vec<ContentQueryRequest> {
        self.state.borrow().queries.clone()
    }

    pub(crate) const fn pending(&self) -> &PendingCalls {
        &self.pending
    }

    pub(crate) fn ports(&self) -> SignerPorts<Self, Self, Self> {
        SignerPorts {
            resolver: self.clone(),
            query: self.clone(),
            launcher: self.clone(),
        }
    }

    pub(crate) fn dispatcher(&self) -> StubDispatcher {
        Dispatcher::new(
            self.ports(),
            self.pending.clone(),
            SessionSettings::new(Duration::from_secs(30)),
        )
    }
}

impl PackageResolver for StubSigner {
    fn resolve_handlers(&self, scheme: &str, package: Option<&str>) -> Vec<ResolvedHandler> {
        assert_eq!(scheme, "nostrsigner:");
        self.state
            .borrow()
            .installed
            .iter()
            .filter(|handler| package.is_none_or(|wanted| handler.package_id() == wanted))
            .cloned()
            .collect()
    }
}

impl ContentQuery for StubSigner {
    fn query(&self, request: &ContentQueryRequest) -> Result<Option<Record>, QueryError> {
        let mut state = self.state.borrow_mut();
        state.queries.push(request.clone());
        let kind = OperationKind::ALL
            .into_iter()
            .find(|kind| request.uri().ends_with(&format!(".{}", kind.endpoint())))
            .ok_or_else(|| QueryError::Unavailable {
                uri: request.uri().to_owned(),
            })?;
        if !state.direct.contains(&kind) {
            return Ok(None);
        }
        let payload = request.projection().first().map_or("", String::as_str);
        Ok(Some(answer(kind, payload).into_iter().collect()))
    }
}

impl ActivityLauncher for StubSigner {
    fn launch(&self, request: &LaunchRequest) -> Result<(), LaunchError> {
        let approval = {
            let mut state = self.state.borrow_mut();
            state.launches.push(request.clone());
            state.approval.clone()
        };
        let outcome = match approval {
            Approval::Ignore => return Ok(()),
            Approval::Refuse => {
                return Err(LaunchError::NoHandler {
                    package: request.package().to_owned(),
                });
            }
            Approval::Cancel => ActivityOutcome::cancelled(),
            Approval::Reply(extras) => extras
                .into_iter()
                .fold(ActivityOutcome::ok(), |outcome, (name, value)| {
                    outcome.with(name, value)
                }),
            Approval::Approve => {
                let kind = OperationKind::from_tag(request.extra("type").unwrap_or_default())
                    .expect("launch carries a catalog tag");
                let payload = request.uri().trim_start_matches("nostrsigner:");
                let echoed = [
                    ("type", kind.tag().to_owned()),
                    ("id", request.extra("id").unwrap_or_default().to_owned()),
                ];
                answer(kind, payload)
                    .into_iter()
                    .chain(echoed.map(|(name, value)| (name.to_owned(), value)))
                    .fold(ActivityOutcome::ok(), |outcome, (name, value)| {
                        outcome.with(name, value)
                    })
            }
        };
        assert_eq!(
            self.pending.deliver(outcome),
            Delivery::Resolved,
            "the caller is waiting while the signer is open"
        );
        Ok(())
    }
}

/// Answer columns the stub signer produces for `kind`.
fn answer(kind: OperationKind, payload: &str) -> Vec<(String, String)> {
    let columns = match kind {
        OperationKind::GetPublicKey => vec![("signature", STUB_NPUB.to_owned())],
        OperationKind::SignEvent => vec![
            ("signature", STUB_SIGNATURE.to_owned()),
            ("event", signed_event_json(payload)),
        ],
        OperationKind::Nip04Encrypt | OperationKind::Nip44Encrypt => {
            vec![("signature", STANDARD.encode(payload))]
        }
        OperationKind::Nip04Decrypt | OperationKind::Nip44Decrypt => {
            let plain = STANDARD.decode(payload).expect("stub ciphertext is base64");
            vec![(
                "signature",
                String::from_utf8(plain).expect("stub plaintext is UTF-8"),
            )]
        }
        OperationKind::DecryptNotificationEvent => {
            vec![("signature", "{\"kind\":9733,\"content\":\"zap\"}".to_owned())]
        }
        OperationKind::GetRelays => vec![("result", STUB_RELAYS.to_owned())],
    };
    columns
        .into_iter()
        .map(|(name, value)| (name.to_owned(), value))
        .collect()
}

pub(crate) fn signed_event_json(unsigned: &str) -> String {
    let trimmed = unsigned.trim_end().trim_end_matches('}');
    if trimmed.trim_start() == "{" {
        format!("{{\"sig\":\"{STUB_SIGNATURE}\"}}")
    } else {
        format!("{trimmed},\"sig\":\"{STUB_SIGNATURE}\"}}")
    }
}

pub(crate) fn params_of(entries: &[(&str, &str)]) -> Params {
    entries
        .iter()
        .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
        .collect()
}

fn current_thread() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("build test runtime")
}

/// Runs an operation to completion on a fresh current-thread runtime.
pub(crate) fn run_operation(
    dispatcher: &StubDispatcher,
    kind: OperationKind,
    supplied: &Params,
) -> Result<OperationResult, SignerError> {
    current_thread().block_on(dispatcher.execute(kind, supplied))
}

#[test]
fn end_to_end_sign_then_encrypt_with_stub() {
    let signer = StubSigner::new().installed(SIGNER_PACKAGE, "Amber");
    let dispatcher = signer.dispatcher();
    dispatcher
        .set_package_name(SIGNER_PACKAGE)
        .expect("select signer");

    let signed = run_operation(
        &dispatcher,
        OperationKind::SignEvent,
        &params_of(&[
            (params::EVENT_JSON, "{\"kind\":1,\"content\":\"hi\"}"),
            (params::EVENT_ID, "abc"),
            (params::NPUB, STUB_NPUB),
        ]),
    )
    .expect("sign");
    assert_eq!(
        signed.to_json().expect("json")["event"],
        "{\"kind\":1,\"content\":\"hi\",\"sig\":\"sig1\"}"
    );

    let encrypted = run_operation(
        &dispatcher,
        OperationKind::Nip04Encrypt,
        &params_of(&[
            (params::PLAIN_TEXT, "hello"),
            (params::PUB_KEY, "peer"),
            (params::NPUB, STUB_NPUB),
        ]),
    )
    .expect("encrypt");
    let payload = encrypted.cipher_payload().expect("cipher payload");
    assert_eq!(payload.payload(), STANDARD.encode("hello"));
    assert_eq!(payload.correlation_id(), "some_id");
    assert_eq!(signer.launches().len(), 2);
}
