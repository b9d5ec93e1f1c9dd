mod common;

use serde_json::json;

use ordex_btc_connector_adapters::session::{AUTH_CANCELLED, MISSING_ORDINAL_ADDRESS};
use ordex_btc_connector_adapters::transport::deterministic_user_data;
use ordex_btc_connector_adapters::DETERMINISTIC_ADDRESS;
use ordex_btc_connector_core::{
    ActivationStatus, ChainId, ConnectorError, ErrorKind, StateSink, WalletKind, WalletProvider,
};

use common::{sample_psbt, WalletHarness};

#[tokio::test]
async fn activation_signs_in_and_uses_the_ordinal_address() {
    let h = WalletHarness::new(WalletKind::Hiro);

    h.connector.activate(None).await.expect("activate");

    let state = h.connector.state();
    assert_eq!(state.status, ActivationStatus::Activated);
    assert_eq!(state.chain_id, Some(ChainId::BtcMainnet));
    assert_eq!(state.accounts[0].as_str(), DETERMINISTIC_ADDRESS);
    assert_eq!(h.calls(), vec!["authenticate"]);

    let provider = h.connector.provider().expect("provider");
    assert!(provider.session().is_user_signed_in());
    assert!(provider.is_connected());
}

#[tokio::test]
async fn signed_in_user_is_not_prompted_again() {
    let h = WalletHarness::new(WalletKind::Hiro);
    h.connector.activate(None).await.expect("activate");
    h.connector.activate(None).await.expect("refresh");

    assert_eq!(h.calls(), vec!["authenticate"]);
}

#[tokio::test]
async fn closed_popup_is_a_session_error() {
    let h = WalletHarness::new(WalletKind::Hiro);
    h.wallet().debug_set_user_data(None).expect("cancel auth");

    let err = h.connector.activate(None).await.expect_err("cancelled");
    assert_eq!(err, ConnectorError::Session(AUTH_CANCELLED.to_owned()));
    assert_eq!(err.kind(), ErrorKind::SessionError);
    assert_eq!(h.connector.status(), ActivationStatus::Errored);
    assert_eq!(h.errors.errors(), vec![err]);
}

#[tokio::test]
async fn missing_ordinal_address_fails_and_signs_out() {
    let h = WalletHarness::new(WalletKind::Hiro);
    h.wallet()
        .debug_set_user_data(Some(json!({ "appPrivateKey": "key", "profile": {} })))
        .expect("user data");

    let err = h.connector.activate(None).await.expect_err("no address");
    assert_eq!(err, ConnectorError::Session(MISSING_ORDINAL_ADDRESS.to_owned()));
    assert!(h.connector.store().snapshot().is_idle());

    let provider = h.connector.locator().provider();
    assert!(!provider.session().is_user_signed_in());
}

#[tokio::test]
async fn eager_connection_never_opens_the_popup() {
    let h = WalletHarness::new(WalletKind::Hiro);

    h.connector.connect_eagerly().await;

    assert_eq!(h.connector.status(), ActivationStatus::Idle);
    assert!(h.calls().is_empty());
}

#[tokio::test]
async fn eager_connection_completes_a_pending_sign_in() {
    let h = WalletHarness::new(WalletKind::Hiro);
    h.wallet()
        .debug_set_pending_sign_in(Some(deterministic_user_data("bc1ppending")))
        .expect("pending user data");
    h.connector
        .locator()
        .provider()
        .session()
        .set_pending_sign_in("auth-response-token");

    h.connector.connect_eagerly().await;

    let state = h.connector.state();
    assert_eq!(state.status, ActivationStatus::Activated);
    assert_eq!(state.accounts[0].as_str(), "bc1ppending");
    assert_eq!(h.calls(), vec!["handlePendingSignIn"]);
}

#[tokio::test]
async fn signing_without_a_session_reports_no_provider() {
    let h = WalletHarness::new(WalletKind::Hiro);
    h.connector.connect_eagerly().await;
    assert!(h.connector.provider().is_some(), "provider located during eager connection");

    let err = h
        .connector
        .sign_transaction(&sample_psbt())
        .await
        .expect_err("signed out");
    assert_eq!(err, ConnectorError::ProviderNotFound(WalletKind::Hiro));
    assert!(h.calls().is_empty());

    let err = h
        .connector
        .locator()
        .provider()
        .sign_psbt(&sample_psbt())
        .await
        .expect_err("signed out");
    assert_eq!(err.kind(), ErrorKind::ProviderNotFound);

    h.connector.activate(None).await.expect("activate");
    let signed = h
        .connector
        .sign_transaction(&sample_psbt())
        .await
        .expect("sign");
    assert_eq!(signed.psbt, sample_psbt());
    assert_eq!(h.calls(), vec!["authenticate", "signPsbt"]);
}

#[tokio::test]
async fn failed_pending_sign_in_is_swallowed_and_cleaned_up() {
    let h = WalletHarness::new(WalletKind::Hiro);
    h.wallet()
        .debug_fail_next(
            "handlePendingSignIn",
            ConnectorError::Session("invalid auth response".to_owned()),
        )
        .expect("script failure");
    let session_owner = h.connector.locator().provider();
    session_owner.session().set_pending_sign_in("auth-response-token");

    h.connector.connect_eagerly().await;

    assert_eq!(h.connector.status(), ActivationStatus::Idle);
    assert!(h.connector.store().snapshot().is_idle());
    assert!(h.connector.provider().is_none());
    assert!(!session_owner.session().is_user_signed_in());
    assert!(!session_owner.session().is_sign_in_pending());
    assert!(h.errors.errors().is_empty());
}

#[tokio::test]
async fn pending_sign_in_without_ordinal_address_signs_out() {
    let h = WalletHarness::new(WalletKind::Hiro);
    h.wallet()
        .debug_set_pending_sign_in(Some(json!({ "appPrivateKey": "key", "profile": {} })))
        .expect("pending user data");
    let session_owner = h.connector.locator().provider();
    session_owner.session().set_pending_sign_in("auth-response-token");

    h.connector.connect_eagerly().await;

    assert_eq!(h.connector.status(), ActivationStatus::Idle);
    assert!(h.connector.store().snapshot().is_idle());
    assert!(!session_owner.session().is_user_signed_in());
    assert_eq!(h.calls(), vec!["handlePendingSignIn"]);
}

#[tokio::test]
async fn deactivate_signs_the_user_out() {
    let h = WalletHarness::new(WalletKind::Hiro);
    h.connector.activate(None).await.expect("activate");

    h.connector.deactivate();

    assert!(!h.connector.locator().provider().session().is_user_signed_in());
    assert_eq!(h.connector.status(), ActivationStatus::Idle);

    h.connector.connect_eagerly().await;
    assert_eq!(h.connector.status(), ActivationStatus::Idle);
}
