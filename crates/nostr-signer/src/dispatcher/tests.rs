//! Unit tests for request dispatch.

use std::time::Duration;

use mockall::mock;
use nostr_signer_config::Config;
use rstest::{fixture, rstest};

use super::*;
use crate::interactive::{ActivityOutcome, LaunchError, LaunchRequest};
use crate::tests::{
    Approval, SIGNER_PACKAGE, STUB_NPUB, STUB_RELAYS, StubDispatcher, StubSigner, params_of,
};

mock! {
    Launcher {}
    impl ActivityLauncher for Launcher {
        fn launch(&self, request: &LaunchRequest) -> Result<(), LaunchError>;
    }
}

#[fixture]
fn signer() -> StubSigner {
    StubSigner::new().installed(SIGNER_PACKAGE, "Amber")
}

#[fixture]
fn selected(signer: StubSigner) -> (StubSigner, StubDispatcher) {
    let dispatcher = signer.dispatcher();
    dispatcher
        .set_package_name(SIGNER_PACKAGE)
        .expect("select signer");
    (signer, dispatcher)
}

fn full_params(kind: OperationKind) -> Params {
    kind.contract()
        .required()
        .iter()
        .map(|&name| (name.to_owned(), format!("{name}-value")))
        .collect()
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

#[rstest]
fn selection_is_trimmed_and_replaced(signer: StubSigner) {
    let dispatcher = signer.dispatcher();
    assert_eq!(dispatcher.active_package(), None);
    dispatcher.set_package_name("  first.signer ").expect("select");
    assert_eq!(dispatcher.active_package().as_deref(), Some("first.signer"));
    dispatcher.set_package_name(SIGNER_PACKAGE).expect("reselect");
    assert_eq!(dispatcher.active_package().as_deref(), Some(SIGNER_PACKAGE));
}

#[rstest]
#[case::empty("")]
#[case::blank("   ")]
fn blank_package_name_is_missing(signer: StubSigner, #[case] package: &str) {
    let dispatcher = signer.dispatcher();
    let err = dispatcher.set_package_name(package).expect_err("blank");
    assert_eq!(err, SignerError::missing_parameter("packageName"));
    assert_eq!(dispatcher.active_package(), None);
}

#[test]
fn config_preselects_package_and_timeout() {
    let signer = StubSigner::new();
    let ports = SignerPorts {
        resolver: signer.clone(),
        query: signer.clone(),
        launcher: signer.clone(),
    };
    let config = Config::default()
        .with_signer_package("configured.signer")
        .with_interactive_timeout_secs(9);
    let dispatcher = Dispatcher::from_config(ports, signer.pending().clone(), &config);
    assert_eq!(
        dispatcher.active_package().as_deref(),
        Some("configured.signer")
    );
    assert_eq!(dispatcher.interactive_timeout(), Duration::from_secs(9));
}

#[test]
fn default_settings_wait_two_minutes() {
    assert_eq!(
        SessionSettings::default().interactive_timeout(),
        Duration::from_secs(120)
    );
}

// ---------------------------------------------------------------------------
// Installation queries
// ---------------------------------------------------------------------------

#[rstest]
fn installed_check_prefers_explicit_package(selected: (StubSigner, StubDispatcher)) {
    let (_, dispatcher) = selected;
    assert!(dispatcher.is_external_signer_installed(Some(SIGNER_PACKAGE)));
    assert!(!dispatcher.is_external_signer_installed(Some("org.absent.signer")));
}

#[rstest]
fn installed_check_falls_back_to_selection(signer: StubSigner) {
    let dispatcher = signer.dispatcher();
    assert!(dispatcher.is_external_signer_installed(None), "any signer");
    dispatcher.set_package_name("org.absent.signer").expect("select");
    assert!(!dispatcher.is_external_signer_installed(None));
    assert!(!dispatcher.is_external_signer_installed(Some(" ")));
}

#[test]
fn installed_check_without_signers_is_false() {
    let dispatcher = StubSigner::new().dispatcher();
    assert!(!dispatcher.is_external_signer_installed(None));
    assert!(dispatcher.list_installed_signers().is_empty());
}

#[rstest]
fn lists_installed_signers(signer: StubSigner) {
    let signer = signer.installed("app.second.signer", "Second");
    let listed = signer.dispatcher().list_installed_signers();
    let names: Vec<&str> = listed.iter().map(SignerIdentity::display_name).collect();
    assert_eq!(names, ["Amber", "Second"]);
}

// ---------------------------------------------------------------------------
// Preconditions
// ---------------------------------------------------------------------------

#[rstest]
fn every_missing_required_parameter_is_named_before_ipc(selected: (StubSigner, StubDispatcher)) {
    let (signer, dispatcher) = selected;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime");
    for kind in OperationKind::ALL {
        for &omitted in kind.contract().required() {
            let mut supplied = full_params(kind);
            supplied.remove(omitted);
            let err = runtime
                .block_on(dispatcher.execute(kind, &supplied))
                .expect_err("missing parameter");
            assert_eq!(err, SignerError::missing_parameter(omitted), "{kind}");
        }
    }
    assert!(signer.queries().is_empty());
    assert!(signer.launches().is_empty());
}

#[rstest]
#[tokio::test]
async fn operations_before_selection_fail(signer: StubSigner) {
    let dispatcher = signer.dispatcher();
    for kind in OperationKind::ALL {
        let err = dispatcher
            .execute(kind, &full_params(kind))
            .await
            .expect_err("no selection");
        assert_eq!(err, SignerError::NoSignerConfigured);
    }
    assert!(signer.queries().is_empty());
    assert!(signer.launches().is_empty());
}

#[rstest]
#[tokio::test]
async fn uninstalled_selection_fails(signer: StubSigner) {
    let dispatcher = signer.dispatcher();
    dispatcher.set_package_name("org.absent.signer").expect("select");
    let err = dispatcher
        .get_public_key(None)
        .await
        .expect_err("not installed");
    assert_eq!(
        err,
        SignerError::SignerNotInstalled {
            package: "org.absent.signer".into(),
        }
    );
    assert!(signer.launches().is_empty());
}

// ---------------------------------------------------------------------------
// Direct channel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn direct_answer_never_launches() {
    let signer = StubSigner::new()
        .installed(SIGNER_PACKAGE, "Amber")
        .allow_direct(OperationKind::SignEvent);
    let mut launcher = MockLauncher::new();
    launcher.expect_launch().times(0);
    let dispatcher = Dispatcher::new(
        SignerPorts {
            resolver: signer.clone(),
            query: signer.clone(),
            launcher,
        },
        PendingCalls::new(),
        SessionSettings::default(),
    );
    dispatcher.set_package_name(SIGNER_PACKAGE).expect("select");

    let signed = dispatcher
        .sign_event("{\"kind\":1}", "abc", STUB_NPUB)
        .await
        .expect("signed");
    assert_eq!(signed.signature(), "sig1");
    assert_eq!(signed.event_id(), "abc");
    assert_eq!(signed.event_json(), "{\"kind\":1,\"sig\":\"sig1\"}");
    assert_eq!(
        OperationResult::SignedEvent(signed).to_json().expect("json"),
        serde_json::json!({
            "signature": "sig1",
            "id": "abc",
            "event": "{\"kind\":1,\"sig\":\"sig1\"}",
        })
    );
    assert_eq!(signer.queries().len(), 1);
}

#[tokio::test]
async fn direct_public_key_reports_active_package() {
    let signer = StubSigner::new()
        .installed(SIGNER_PACKAGE, "Amber")
        .allow_direct(OperationKind::GetPublicKey);
    let dispatcher = signer.dispatcher();
    dispatcher.set_package_name(SIGNER_PACKAGE).expect("select");
    let key = dispatcher.get_public_key(None).await.expect("key");
    assert_eq!(key.npub(), STUB_NPUB);
    assert_eq!(key.package_id(), SIGNER_PACKAGE);
    assert!(signer.launches().is_empty());
}

// ---------------------------------------------------------------------------
// Interactive channel
// ---------------------------------------------------------------------------

#[rstest]
#[tokio::test]
async fn public_key_without_record_launches_then_cancel_rejects(
    selected: (StubSigner, StubDispatcher),
) {
    let (signer, dispatcher) = selected;
    signer.set_approval(Approval::Cancel);
    let err = dispatcher
        .get_public_key(Some("[{\"type\":\"sign_event\",\"kind\":1}]"))
        .await
        .expect_err("cancelled");
    assert_eq!(err, SignerError::UserCancelled);

    let launches = signer.launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].package(), SIGNER_PACKAGE);
    assert_eq!(launches[0].extra("type"), Some("get_public_key"));
    assert_eq!(
        launches[0].extra("permissions"),
        Some("[{\"type\":\"sign_event\",\"kind\":1}]")
    );
    assert_eq!(signer.queries().len(), 1);
}

#[rstest]
#[tokio::test]
async fn nip44_round_trip_returns_plaintext(selected: (StubSigner, StubDispatcher)) {
    let (_, dispatcher) = selected;
    let cipher = dispatcher
        .nip44_encrypt("hello nostr", "peer", STUB_NPUB, Some("req-1"))
        .await
        .expect("encrypt");
    assert_eq!(cipher.correlation_id(), "req-1");
    assert_ne!(cipher.payload(), "hello nostr");

    let plain = dispatcher
        .nip44_decrypt(cipher.payload(), "peer", STUB_NPUB, Some("req-2"))
        .await
        .expect("decrypt");
    assert_eq!(plain.payload(), "hello nostr");
    assert_eq!(plain.correlation_id(), "req-2");
}

#[rstest]
#[tokio::test]
async fn remaining_helpers_decode_their_variants(selected: (StubSigner, StubDispatcher)) {
    let (_, dispatcher) = selected;
    let cipher = dispatcher
        .nip04_encrypt("hi", "peer", STUB_NPUB, None)
        .await
        .expect("nip04 encrypt");
    assert_eq!(cipher.correlation_id(), "some_id");
    let plain = dispatcher
        .nip04_decrypt(cipher.payload(), "peer", STUB_NPUB, None)
        .await
        .expect("nip04 decrypt");
    assert_eq!(plain.payload(), "hi");

    let zap = dispatcher
        .decrypt_notification_event("{\"kind\":9734}", STUB_NPUB, Some("zap-1"))
        .await
        .expect("zap");
    assert_eq!(zap.correlation_id(), "zap-1");

    let relays = dispatcher
        .get_relays(STUB_NPUB, None)
        .await
        .expect("relays");
    assert_eq!(relays.relays_json(), STUB_RELAYS);
}

#[rstest]
#[case::unknown_kind(&[("type", "launch_rockets"), ("signature", "x")])]
#[case::other_kind(&[("type", "nip04_decrypt"), ("signature", "x")])]
#[case::no_answer(&[("type", "nip44_encrypt")])]
#[tokio::test]
async fn unusable_replies_are_malformed(
    selected: (StubSigner, StubDispatcher),
    #[case] extras: &[(&str, &str)],
) {
    let (signer, dispatcher) = selected;
    signer.set_approval(Approval::Reply(
        extras
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect(),
    ));
    let err = dispatcher
        .nip44_encrypt("hello", "peer", STUB_NPUB, None)
        .await
        .expect_err("malformed");
    assert!(
        matches!(err, SignerError::MalformedResponse { .. }),
        "unexpected error: {err}"
    );
}

#[rstest]
#[tokio::test]
async fn foreign_correlation_id_is_rejected(selected: (StubSigner, StubDispatcher)) {
    let (signer, dispatcher) = selected;
    signer.set_approval(Approval::Reply(vec![
        ("signature".into(), "cipher".into()),
        ("id".into(), "someone-else".into()),
    ]));
    let err = dispatcher
        .nip04_encrypt("hello", "peer", STUB_NPUB, Some("mine"))
        .await
        .expect_err("mismatch");
    assert_eq!(
        err,
        SignerError::CorrelationMismatch {
            expected: "mine".into(),
            received: "someone-else".into(),
        }
    );
}

#[rstest]
#[tokio::test]
async fn refused_launch_surfaces_and_frees_channel(selected: (StubSigner, StubDispatcher)) {
    let (signer, dispatcher) = selected;
    signer.set_approval(Approval::Refuse);
    let err = dispatcher
        .get_relays(STUB_NPUB, None)
        .await
        .expect_err("refused");
    assert!(matches!(err, SignerError::LaunchFailed { .. }));

    signer.set_approval(Approval::Approve);
    dispatcher
        .get_relays(STUB_NPUB, None)
        .await
        .expect("channel free again");
}

#[rstest]
#[tokio::test]
async fn activity_results_resume_waiting_call(selected: (StubSigner, StubDispatcher)) {
    let (signer, dispatcher) = selected;
    signer.set_approval(Approval::Ignore);
    let results = dispatcher.activity_results();

    let (key, ()) = tokio::join!(dispatcher.get_public_key(None), async {
        tokio::task::yield_now().await;
        let delivery = results.deliver(ActivityOutcome::ok().with("signature", "npub1late"));
        assert_eq!(delivery, crate::interactive::Delivery::Resolved);
    });
    assert_eq!(key.expect("resolved").npub(), "npub1late");
    assert_eq!(
        results.deliver(ActivityOutcome::ok()),
        crate::interactive::Delivery::Mismatched
    );
}

#[test]
fn build_params_skips_absent_values() {
    let built = build_params(&[("a", Some("1")), ("b", None)]);
    assert_eq!(built, params_of(&[("a", "1")]));
}
