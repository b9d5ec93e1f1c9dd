use ordex_btc_connector_core::{
    activation_transition, derive_status, ActivationAction, ActivationStatus, BtcAddress, ChainId,
    ConnectorError, StoreState,
};

#[test]
fn activation_happy_path_transitions() {
    let (s1, _) = activation_transition(ActivationStatus::Idle, ActivationAction::Start)
        .expect("idle -> activating");
    assert_eq!(s1, ActivationStatus::Activating);
    let (s2, t) =
        activation_transition(s1, ActivationAction::Succeed).expect("activating -> activated");
    assert_eq!(s2, ActivationStatus::Activated);
    assert_eq!(t.from, ActivationStatus::Activating);
    let (s3, _) =
        activation_transition(s2, ActivationAction::Disconnect).expect("activated -> idle");
    assert_eq!(s3, ActivationStatus::Idle);
}

#[test]
fn failure_and_cancel_leave_activation() {
    let (failed, _) =
        activation_transition(ActivationStatus::Activating, ActivationAction::Fail).expect("fail");
    assert_eq!(failed, ActivationStatus::Errored);
    let (retry, _) =
        activation_transition(failed, ActivationAction::Start).expect("errored -> activating");
    assert_eq!(retry, ActivationStatus::Activating);
    let (cancelled, _) =
        activation_transition(retry, ActivationAction::Cancel).expect("activating -> idle");
    assert_eq!(cancelled, ActivationStatus::Idle);
}

#[test]
fn illegal_transition_is_rejected() {
    let err = activation_transition(ActivationStatus::Idle, ActivationAction::Succeed)
        .expect_err("must fail");
    assert!(err.to_string().contains("illegal activation transition"));

    activation_transition(ActivationStatus::Activating, ActivationAction::Start)
        .expect_err("activation already running");
}

#[test]
fn reset_is_legal_from_every_status() {
    for from in [
        ActivationStatus::Idle,
        ActivationStatus::Activating,
        ActivationStatus::Activated,
        ActivationStatus::Errored,
    ] {
        let (to, _) = activation_transition(from, ActivationAction::Reset).expect("reset");
        assert_eq!(to, ActivationStatus::Idle);
    }
}

#[test]
fn derived_status_requires_accounts_and_chain() {
    let accounts_only = StoreState {
        activating: false,
        chain_id: None,
        accounts: vec![BtcAddress::new("bc1p1").expect("address")],
    };
    assert_eq!(derive_status(&accounts_only, None), ActivationStatus::Idle);

    let connected = StoreState {
        chain_id: Some(ChainId::Unknown),
        ..accounts_only
    };
    assert_eq!(derive_status(&connected, None), ActivationStatus::Activated);

    let err = ConnectorError::NoAccountsReturned;
    assert_eq!(
        derive_status(&StoreState::default(), Some(&err)),
        ActivationStatus::Errored
    );
}
