use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    BtcAddress, ChainId, EagerPolicy, PsbtPayload, SignedPsbt, StateUpdate, StoreState, WalletKind,
};
use crate::events::EventBridge;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectorError {
    #[error("{0} not installed")]
    ProviderNotFound(WalletKind),
    #[error("no accounts returned")]
    NoAccountsReturned,
    #[error("unknown chain id {0}")]
    UnknownChain(String),
    #[error("session error: {0}")]
    Session(String),
    #[error("activation already in progress")]
    ActivationPending,
    #[error("provider disconnected: {0}")]
    Disconnected(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("policy error: {0}")]
    Policy(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ProviderNotFound,
    NoAccountsReturned,
    UnknownChain,
    SessionError,
    ActivationPending,
    Transport,
    Validation,
    Policy,
}

impl ConnectorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectorError::ProviderNotFound(_) => ErrorKind::ProviderNotFound,
            ConnectorError::NoAccountsReturned => ErrorKind::NoAccountsReturned,
            ConnectorError::UnknownChain(_) => ErrorKind::UnknownChain,
            ConnectorError::Session(_) => ErrorKind::SessionError,
            ConnectorError::ActivationPending => ErrorKind::ActivationPending,
            ConnectorError::Disconnected(_) | ConnectorError::Transport(_) => ErrorKind::Transport,
            ConnectorError::Validation(_) => ErrorKind::Validation,
            ConnectorError::Policy(_) => ErrorKind::Policy,
        }
    }
}

/// Receives errors that cannot be returned to a caller (event listeners, unknown chains).
pub type ErrorHook = Arc<dyn Fn(&ConnectorError) + Send + Sync>;

/// Capability surface of one injected wallet provider.
///
/// The host (browser extension, proxy, test double) owns the provider's lifecycle; connectors
/// only hold a shared reference and notice a vanished provider on the next failing call.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait WalletProvider: Send + Sync {
    fn wallet(&self) -> WalletKind;

    fn eager_policy(&self) -> EagerPolicy {
        EagerPolicy::RequestAccounts
    }

    /// Already connected or signed in, so activation needs no "activating" phase.
    fn is_connected(&self) -> bool {
        false
    }

    /// Whether a sign request can reach the wallet. Session wallets need a signed-in user.
    fn can_sign(&self) -> bool {
        true
    }

    async fn request_accounts(&self) -> Result<Vec<BtcAddress>, ConnectorError>;

    async fn get_network(&self) -> Result<String, ConnectorError>;

    async fn sign_psbt(&self, psbt: &PsbtPayload) -> Result<SignedPsbt, ConnectorError>;

    /// Returns `false` when the wallet cannot switch networks.
    async fn switch_network(&self, _chain_id: ChainId) -> Result<bool, ConnectorError> {
        Ok(false)
    }

    /// Accounts of an existing session, resolved without user interaction.
    async fn restore_session(&self) -> Result<Option<Vec<BtcAddress>>, ConnectorError> {
        Ok(None)
    }

    /// Returns `false` when the provider emits no lifecycle events.
    fn subscribe(&self, _bridge: EventBridge) -> Result<bool, ConnectorError> {
        Ok(false)
    }

    /// Drops event listeners and any local session credentials.
    fn teardown(&self) {}
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait ProviderLocator: Send + Sync {
    type Provider: WalletProvider + 'static;

    fn wallet(&self) -> WalletKind;

    async fn locate(&self) -> Result<Arc<Self::Provider>, ConnectorError>;
}

pub trait StateSink: Send + Sync {
    fn update(&self, update: StateUpdate);
    fn reset_state(&self);
    fn snapshot(&self) -> StoreState;
}

pub trait ActivationStore: StateSink {
    type Token: ActivationToken;

    fn start_activation(&self) -> Self::Token;
}

pub trait ActivationToken: Send {
    /// No-op once the attempt settled or was superseded.
    fn cancel(self);

    /// A newer activation or a reset happened after this token was issued.
    fn is_superseded(&self) -> bool;
}
