use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use ordex_btc_connector_core::{ConnectorError, ProviderLocator, WalletKind};

use crate::config::ConnectorConfig;
use crate::provider::InjectedProvider;
use crate::wallets::{WalletVariant, HIRO, UNISAT, XVERSE};

/// Finds an injected wallet by probing its transport on every call.
///
/// The provider object is built once; only its presence is re-checked, so a wallet that
/// injects itself late is found by the next activation.
#[derive(Debug, Clone)]
pub struct InjectedLocator {
    provider: Arc<InjectedProvider>,
}

impl InjectedLocator {
    pub fn new(variant: WalletVariant, config: ConnectorConfig) -> Self {
        Self::from_provider(InjectedProvider::new(variant, config))
    }

    pub fn from_provider(provider: InjectedProvider) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }

    pub fn unisat(config: ConnectorConfig) -> Self {
        Self::new(UNISAT, config)
    }

    pub fn xverse(config: ConnectorConfig) -> Self {
        Self::new(XVERSE, config)
    }

    pub fn hiro(config: ConnectorConfig) -> Self {
        Self::new(HIRO, config)
    }

    pub fn provider(&self) -> &Arc<InjectedProvider> {
        &self.provider
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ProviderLocator for InjectedLocator {
    type Provider = InjectedProvider;

    fn wallet(&self) -> WalletKind {
        self.provider.variant().kind
    }

    async fn locate(&self) -> Result<Arc<InjectedProvider>, ConnectorError> {
        let wallet = self.wallet();
        if self.provider.transport().probe().await? {
            Ok(Arc::clone(&self.provider))
        } else {
            debug!(%wallet, global = self.provider.variant().global, "wallet not injected");
            Err(ConnectorError::ProviderNotFound(wallet))
        }
    }
}
