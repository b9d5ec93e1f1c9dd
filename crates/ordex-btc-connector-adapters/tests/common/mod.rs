#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use ordex_btc_connector_adapters::{
    wallet_connector, ConnectorConfig, DeterministicWallet, WalletConnector,
};
use ordex_btc_connector_core::{ConnectorError, ConnectorStore, ErrorHook, PsbtPayload, WalletKind};

pub fn sample_psbt() -> PsbtPayload {
    PsbtPayload::from_hex("70736274ff0100520200000001").expect("valid psbt")
}

#[derive(Default, Clone)]
pub struct ErrorLog(Arc<Mutex<Vec<ConnectorError>>>);

impl ErrorLog {
    pub fn hook(&self) -> ErrorHook {
        let log = Arc::clone(&self.0);
        Arc::new(move |err: &ConnectorError| log.lock().expect("error log").push(err.clone()))
    }

    pub fn errors(&self) -> Vec<ConnectorError> {
        self.0.lock().expect("error log").clone()
    }
}

pub struct WalletHarness {
    pub connector: WalletConnector,
    pub errors: ErrorLog,
}

impl WalletHarness {
    pub fn new(kind: WalletKind) -> Self {
        Self::with_config(kind, ConnectorConfig::default())
    }

    pub fn with_config(kind: WalletKind, config: ConnectorConfig) -> Self {
        let errors = ErrorLog::default();
        let connector = wallet_connector(
            kind,
            config,
            Arc::new(ConnectorStore::new()),
            Some(errors.hook()),
        );
        Self { connector, errors }
    }

    /// In-memory wallet behind the connector's transport.
    pub fn wallet(&self) -> Arc<DeterministicWallet> {
        Arc::clone(
            self.connector
                .locator()
                .provider()
                .transport()
                .deterministic_wallet()
                .expect("deterministic transport"),
        )
    }

    pub fn calls(&self) -> Vec<String> {
        self.wallet().calls().expect("wallet calls")
    }
}
