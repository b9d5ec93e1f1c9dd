//! Injected Bitcoin wallet adapters: Unisat, Xverse and Hiro.
//!
//! Each wallet is an [`InjectedProvider`] configured by a [`WalletVariant`] and reached
//! through a [`WalletTransport`]. Pair one with a store via [`wallet_connector`].

#[cfg(target_arch = "wasm32")]
mod browser;
pub mod config;
pub mod locator;
pub mod provider;
pub mod session;
pub mod transport;
pub mod wallets;

use std::sync::Arc;

use ordex_btc_connector_core::{Connector, ConnectorStore, ErrorHook, WalletKind};

pub use config::{ConnectorConfig, RuntimeProfile};
pub use locator::InjectedLocator;
pub use provider::InjectedProvider;
pub use session::{AuthOptions, UserData, UserSession};
pub use transport::{DeterministicWallet, EventListener, WalletTransport, DETERMINISTIC_ADDRESS};
pub use wallets::{WalletVariant, HIRO, UNISAT, XVERSE};

pub type WalletConnector = Connector<InjectedLocator, ConnectorStore>;

pub fn wallet_connector(
    kind: WalletKind,
    config: ConnectorConfig,
    store: Arc<ConnectorStore>,
    on_error: Option<ErrorHook>,
) -> WalletConnector {
    let locator = InjectedLocator::new(WalletVariant::for_kind(kind), config);
    Connector::new(locator, store, on_error)
}
