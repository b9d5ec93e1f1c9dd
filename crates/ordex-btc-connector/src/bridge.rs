//! The only boundary between the command line and the connector crates.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tracing::info;

use ordex_btc_connector_adapters::{wallet_connector, ConnectorConfig, WalletConnector};
use ordex_btc_connector_core::{
    ChainId, ConnectorError, ConnectorState, ConnectorStore, PsbtPayload, WalletKind,
};

pub struct ConnectorBridge {
    connector: WalletConnector,
    store: Arc<ConnectorStore>,
    reported: Arc<Mutex<Vec<ConnectorError>>>,
}

impl ConnectorBridge {
    pub fn new(kind: WalletKind, config: ConnectorConfig) -> Self {
        let store = Arc::new(ConnectorStore::new());
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        let hook = Arc::new(move |err: &ConnectorError| {
            if let Ok(mut g) = sink.lock() {
                g.push(err.clone());
            }
        });
        let connector = wallet_connector(kind, config, Arc::clone(&store), Some(hook));
        Self {
            connector,
            store,
            reported,
        }
    }

    /// Logs every published store change until the process exits.
    pub fn watch_store(&self) {
        let mut rx = self.store.subscribe();
        let wallet = self.connector.wallet();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                info!(
                    %wallet,
                    activating = state.activating,
                    chain_id = ?state.chain_id,
                    accounts = state.accounts.len(),
                    "store updated"
                );
            }
        });
    }

    pub async fn detect(&self) -> Result<bool, ConnectorError> {
        self.connector.locator().provider().transport().probe().await
    }

    pub async fn connect_eagerly(&self) -> ConnectorState {
        self.connector.connect_eagerly().await;
        self.connector.state()
    }

    pub async fn activate(&self, chain: Option<ChainId>) -> Result<ConnectorState, ConnectorError> {
        self.connector.activate(chain).await?;
        Ok(self.connector.state())
    }

    pub async fn sign(&self, raw_psbt: &str) -> Result<Value, ConnectorError> {
        let psbt = PsbtPayload::parse(raw_psbt.trim())?;
        self.connector.activate(None).await?;
        let signed = self.connector.sign_transaction(&psbt).await?;
        Ok(json!({
            "psbtBase64": signed.psbt.to_base64(),
            "psbtHex": signed.psbt.to_hex(),
            "txId": signed.txid,
        }))
    }

    /// Errors that reached the hook instead of a caller.
    pub fn reported_errors(&self) -> Vec<String> {
        self.reported
            .lock()
            .map(|g| g.iter().map(ToString::to_string).collect())
            .unwrap_or_default()
    }
}
