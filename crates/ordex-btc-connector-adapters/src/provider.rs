use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use ordex_btc_connector_core::{
    BtcAddress, ChainId, ConnectorError, EagerPolicy, EventBridge, ProviderEvent, PsbtPayload,
    SignedPsbt, WalletKind, WalletProvider,
};

use crate::config::ConnectorConfig;
use crate::session::{AuthOptions, UserSession};
use crate::transport::{EventListener, WalletTransport};
use crate::wallets::{
    unsecured_token, AccountsCall, NetworkSource, SignCall, WalletVariant, HIRO_ALLOWED_SIGHASH,
};

/// A browser-injected Bitcoin wallet driven through its [`WalletVariant`] call table.
#[derive(Debug)]
pub struct InjectedProvider {
    variant: WalletVariant,
    config: ConnectorConfig,
    transport: WalletTransport,
    session: UserSession,
    connected: Arc<AtomicBool>,
}

impl InjectedProvider {
    pub fn new(variant: WalletVariant, config: ConnectorConfig) -> Self {
        let transport = WalletTransport::with_config(variant.kind, variant.global, &config);
        Self::with_transport(variant, config, transport)
    }

    pub fn with_transport(
        variant: WalletVariant,
        config: ConnectorConfig,
        transport: WalletTransport,
    ) -> Self {
        Self {
            variant,
            config,
            transport,
            session: UserSession::default(),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn variant(&self) -> &WalletVariant {
        &self.variant
    }

    pub fn transport(&self) -> &WalletTransport {
        &self.transport
    }

    pub fn session(&self) -> &UserSession {
        &self.session
    }

    async fn session_accounts(&self) -> Result<Vec<BtcAddress>, ConnectorError> {
        let user_data = if self.session.is_user_signed_in() {
            self.session.load_user_data()?
        } else {
            let options = AuthOptions::from_config(&self.config);
            self.session.authenticate(&self.transport, &options).await?
        };
        Ok(vec![user_data.ordinal_address()?])
    }

    fn address_request(&self) -> Value {
        json!({
            "purposes": self.config.address_purposes,
            "message": self.config.address_message,
            "network": { "type": self.config.xverse_network_type },
        })
    }

    fn sign_request(&self, psbt: &PsbtPayload) -> Value {
        json!({
            "network": { "type": self.config.xverse_network_type },
            "message": "Sign Transaction",
            "psbtBase64": psbt.to_base64(),
            "broadcast": false,
            "inputsToSign": [],
        })
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl WalletProvider for InjectedProvider {
    fn wallet(&self) -> WalletKind {
        self.variant.kind
    }

    fn eager_policy(&self) -> EagerPolicy {
        self.variant.eager
    }

    fn is_connected(&self) -> bool {
        match self.variant.accounts {
            AccountsCall::Session => self.session.is_user_signed_in(),
            _ => self.connected.load(Ordering::Acquire),
        }
    }

    fn can_sign(&self) -> bool {
        self.variant.accounts != AccountsCall::Session || self.session.is_user_signed_in()
    }

    async fn request_accounts(&self) -> Result<Vec<BtcAddress>, ConnectorError> {
        let accounts = match self.variant.accounts {
            AccountsCall::Request(method) => {
                let result = self.transport.call(method, json!([])).await?;
                parse_address_list(&result, method)?
            }
            AccountsCall::AddressToken(method) => {
                let token = unsecured_token(&self.address_request())?;
                let result = self.transport.call(method, json!([token])).await?;
                let entries = result.get("addresses").ok_or_else(|| {
                    ConnectorError::Transport(format!("{method} response is missing addresses"))
                })?;
                entries
                    .as_array()
                    .into_iter()
                    .flatten()
                    .map(|entry| {
                        let raw = entry.get("address").and_then(Value::as_str).ok_or_else(|| {
                            ConnectorError::Transport(format!("{method} entry has no address"))
                        })?;
                        BtcAddress::new(raw)
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
            AccountsCall::Session => self.session_accounts().await?,
        };
        if !accounts.is_empty() {
            self.connected.store(true, Ordering::Release);
        }
        Ok(accounts)
    }

    async fn get_network(&self) -> Result<String, ConnectorError> {
        match self.variant.network {
            NetworkSource::Rpc(method) => {
                let result = self.transport.call(method, json!([])).await?;
                result.as_str().map(str::to_owned).ok_or_else(|| {
                    ConnectorError::Transport(format!("{method} must return a string"))
                })
            }
            NetworkSource::Configured => Ok(self.config.network_label.clone()),
        }
    }

    async fn sign_psbt(&self, psbt: &PsbtPayload) -> Result<SignedPsbt, ConnectorError> {
        match self.variant.sign {
            SignCall::Hex(method) => {
                let result = self.transport.call(method, json!([psbt.to_hex()])).await?;
                let raw = result.as_str().ok_or_else(|| {
                    ConnectorError::Transport(format!("{method} must return a hex string"))
                })?;
                Ok(SignedPsbt {
                    psbt: PsbtPayload::from_hex(raw)?,
                    txid: None,
                })
            }
            SignCall::Token(method) => {
                let token = unsecured_token(&self.sign_request(psbt))?;
                let result = self.transport.call(method, json!([token])).await?;
                let raw = result.get("psbtBase64").and_then(Value::as_str).ok_or_else(|| {
                    ConnectorError::Transport(format!("{method} response is missing psbtBase64"))
                })?;
                Ok(SignedPsbt {
                    psbt: PsbtPayload::from_base64(raw)?,
                    txid: result.get("txId").and_then(Value::as_str).map(str::to_owned),
                })
            }
            SignCall::Session(method) => {
                if !self.session.is_user_signed_in() {
                    return Err(ConnectorError::ProviderNotFound(self.variant.kind));
                }
                let request = json!({
                    "hex": psbt.to_hex(),
                    "network": self.config.network_label,
                    "allowedSighash": HIRO_ALLOWED_SIGHASH,
                });
                let result = self.transport.call(method, json!([request])).await?;
                let raw = result.get("hex").and_then(Value::as_str).ok_or_else(|| {
                    ConnectorError::Transport(format!("{method} response is missing hex"))
                })?;
                Ok(SignedPsbt {
                    psbt: PsbtPayload::from_hex(raw)?,
                    txid: None,
                })
            }
        }
    }

    async fn switch_network(&self, chain_id: ChainId) -> Result<bool, ConnectorError> {
        let (Some(method), Some(label)) = (self.variant.switch_network, chain_id.network_label())
        else {
            return Ok(false);
        };
        self.transport.call(method, json!([label])).await?;
        Ok(true)
    }

    async fn restore_session(&self) -> Result<Option<Vec<BtcAddress>>, ConnectorError> {
        if self.variant.accounts != AccountsCall::Session {
            return Ok(None);
        }
        let user_data = if self.session.is_user_signed_in() {
            self.session.load_user_data()?
        } else if self.session.is_sign_in_pending() {
            self.session.handle_pending_sign_in(&self.transport).await?
        } else {
            return Ok(None);
        };
        Ok(Some(vec![user_data.ordinal_address()?]))
    }

    fn subscribe(&self, bridge: EventBridge) -> Result<bool, ConnectorError> {
        if !self.variant.emits_events {
            return Ok(false);
        }
        let connected = Arc::clone(&self.connected);
        let listener: EventListener = Arc::new(move |event: ProviderEvent| {
            match &event {
                ProviderEvent::Disconnect(_) => connected.store(false, Ordering::Release),
                ProviderEvent::AccountsChanged(accounts) if accounts.is_empty() => {
                    connected.store(false, Ordering::Release)
                }
                _ => {}
            }
            bridge.handle(event);
        });
        self.transport.listen(listener)
    }

    fn teardown(&self) {
        debug!(wallet = %self.variant.kind, "tearing down provider");
        self.transport.unlisten();
        self.connected.store(false, Ordering::Release);
        if self.variant.accounts == AccountsCall::Session {
            self.session.sign_user_out();
        }
    }
}

fn parse_address_list(value: &Value, method: &str) -> Result<Vec<BtcAddress>, ConnectorError> {
    let items = value
        .as_array()
        .ok_or_else(|| ConnectorError::Transport(format!("{method} result must be an array")))?;
    items
        .iter()
        .map(|item| {
            let raw = item.as_str().ok_or_else(|| {
                ConnectorError::Transport(format!("{method} item must be a string"))
            })?;
            BtcAddress::new(raw)
        })
        .collect()
}
