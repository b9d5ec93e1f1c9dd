pub mod chain;
pub mod connector;
pub mod domain;
pub mod events;
pub mod ports;
pub mod state_machine;
pub mod store;

pub use chain::resolve_chain_id;
pub use connector::{Connector, ProviderHandle};
pub use domain::{
    ActivationStatus, BtcAddress, ChainId, ConnectorState, EagerPolicy, PsbtPayload, SignedPsbt,
    StateUpdate, StoreState, WalletKind,
};
pub use events::{EventBridge, ProviderEvent};
pub use ports::{
    ActivationStore, ActivationToken, ConnectorError, ErrorHook, ErrorKind, ProviderLocator,
    StateSink, WalletProvider,
};
pub use state_machine::{
    activation_transition, derive_status, ActivationAction, StateTransition, TransitionError,
};
pub use store::{ActivationHandle, ConnectorStore};
