use thiserror::Error;

use crate::domain::{ActivationStatus, StoreState};
use crate::ports::ConnectorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationAction {
    Start,
    Succeed,
    Fail,
    Cancel,
    Disconnect,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ActivationStatus,
    pub to: ActivationStatus,
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal activation transition: {from:?} --{action:?}-->")]
pub struct TransitionError {
    pub from: ActivationStatus,
    pub action: ActivationAction,
}

pub fn activation_transition(
    from: ActivationStatus,
    action: ActivationAction,
) -> Result<(ActivationStatus, StateTransition), TransitionError> {
    use ActivationAction as A;
    use ActivationStatus as S;

    let (to, reason) = match (from, action) {
        (S::Idle | S::Errored, A::Start) => (S::Activating, "activation started"),
        (S::Activated, A::Start) => (S::Activating, "reconnect requested"),
        (S::Activating, A::Succeed) => (S::Activated, "accounts and chain published"),
        (S::Activating, A::Fail) => (S::Errored, "activation failed"),
        (S::Activating, A::Cancel) => (S::Idle, "activation cancelled"),
        (S::Activating | S::Activated, A::Disconnect) => (S::Idle, "provider disconnected"),
        (_, A::Reset) => (S::Idle, "state reset"),
        // an already connected wallet refreshes its data without re-entering Activating
        (S::Activated, A::Succeed) => (S::Activated, "connection refreshed"),
        (S::Activated, A::Fail) => (S::Activated, "refresh failed"),
        _ => return Err(TransitionError { from, action }),
    };
    Ok((to, StateTransition { from, to, reason }))
}

/// Status of a connector given the published store data and its last explicit failure.
pub fn derive_status(state: &StoreState, last_error: Option<&ConnectorError>) -> ActivationStatus {
    if state.activating {
        ActivationStatus::Activating
    } else if state.has_connection() {
        ActivationStatus::Activated
    } else if last_error.is_some() {
        ActivationStatus::Errored
    } else {
        ActivationStatus::Idle
    }
}
