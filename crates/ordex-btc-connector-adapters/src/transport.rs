use std::fmt;
#[cfg(target_arch = "wasm32")]
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{json, Value};
use tracing::debug;

use ordex_btc_connector_core::{BtcAddress, ConnectorError, ProviderEvent, WalletKind};

use crate::config::ConnectorConfig;
use crate::wallets::{decode_unsecured_token, event_from_payload};

pub type EventListener = Arc<dyn Fn(ProviderEvent) + Send + Sync>;

/// Taproot address used by the deterministic wallet (BIP-86 account 0, index 0).
pub const DETERMINISTIC_ADDRESS: &str =
    "bc1p5cyxnuxmeuwuvkwfem96lqzszd02n6xdcjrs20cac6yqjjwudpxqkedrcr";

/// Route from the connector to an injected wallet object.
///
/// In a browser build calls go straight to `window[global]`. Native builds either forward
/// them as JSON-RPC to a wallet proxy or answer from an in-memory deterministic wallet.
#[derive(Debug, Clone)]
pub struct WalletTransport {
    wallet: WalletKind,
    global: &'static str,
    mode: TransportMode,
    #[cfg(target_arch = "wasm32")]
    listen_generation: Arc<AtomicU64>,
}

#[derive(Debug, Clone)]
enum TransportMode {
    Disabled(String),
    Deterministic(Arc<DeterministicWallet>),
    #[cfg(not(target_arch = "wasm32"))]
    Proxy(ProxyRuntime),
    #[cfg(target_arch = "wasm32")]
    Browser,
}

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
struct ProxyRuntime {
    base_url: String,
    client: reqwest::Client,
    next_id: Arc<std::sync::atomic::AtomicU64>,
}

impl WalletTransport {
    pub fn with_config(wallet: WalletKind, global: &'static str, config: &ConnectorConfig) -> Self {
        // the extension may inject itself after startup, so the browser route is always taken
        #[cfg(target_arch = "wasm32")]
        let mode = {
            let _ = config;
            TransportMode::Browser
        };

        #[cfg(not(target_arch = "wasm32"))]
        let mode = if let Some(ref base_url) = config.wallet_proxy_url {
            let mut builder = reqwest::Client::builder();
            if let Some(ms) = config.proxy_timeout_ms {
                builder = builder.timeout(std::time::Duration::from_millis(ms));
            }
            match builder.build() {
                Ok(client) => TransportMode::Proxy(ProxyRuntime {
                    base_url: base_url.clone(),
                    client,
                    next_id: Arc::new(std::sync::atomic::AtomicU64::new(1)),
                }),
                Err(e) => {
                    if config.strict_runtime_required() {
                        TransportMode::Disabled(format!(
                            "failed to initialize wallet proxy client in production profile: {e}"
                        ))
                    } else {
                        TransportMode::Deterministic(Arc::default())
                    }
                }
            }
        } else if config.strict_runtime_required() {
            TransportMode::Disabled(format!(
                "{wallet} proxy URL not configured in production runtime profile"
            ))
        } else {
            TransportMode::Deterministic(Arc::default())
        };

        Self::from_mode(wallet, global, mode)
    }

    /// Transport backed by the given in-memory wallet regardless of configuration.
    pub fn deterministic(
        wallet: WalletKind,
        global: &'static str,
        backend: Arc<DeterministicWallet>,
    ) -> Self {
        Self::from_mode(wallet, global, TransportMode::Deterministic(backend))
    }

    fn from_mode(wallet: WalletKind, global: &'static str, mode: TransportMode) -> Self {
        debug!(%wallet, global, mode = mode.label(), "wallet transport selected");
        Self {
            wallet,
            global,
            mode,
            #[cfg(target_arch = "wasm32")]
            listen_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn wallet(&self) -> WalletKind {
        self.wallet
    }

    /// Name of the injected global, also used to address the wallet through a proxy.
    pub fn global(&self) -> &'static str {
        self.global
    }

    pub fn deterministic_wallet(&self) -> Option<&Arc<DeterministicWallet>> {
        match &self.mode {
            TransportMode::Deterministic(wallet) => Some(wallet),
            _ => None,
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self.mode, TransportMode::Disabled(_))
    }

    /// Whether the wallet object is currently present. Never cached.
    pub async fn probe(&self) -> Result<bool, ConnectorError> {
        match &self.mode {
            TransportMode::Disabled(reason) => Err(ConnectorError::Policy(reason.clone())),
            TransportMode::Deterministic(wallet) => wallet.installed(),
            #[cfg(not(target_arch = "wasm32"))]
            TransportMode::Proxy(proxy) => {
                let detected = self.proxy_call(proxy, "wallet_detect", json!([])).await?;
                detected.as_bool().ok_or_else(|| {
                    ConnectorError::Transport("wallet_detect must return a boolean".to_owned())
                })
            }
            #[cfg(target_arch = "wasm32")]
            TransportMode::Browser => Ok(crate::browser::injected(self.global)),
        }
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ConnectorError> {
        match &self.mode {
            TransportMode::Disabled(reason) => Err(ConnectorError::Policy(reason.clone())),
            TransportMode::Deterministic(wallet) => wallet.handle(method, &params),
            #[cfg(not(target_arch = "wasm32"))]
            TransportMode::Proxy(proxy) => self.proxy_call(proxy, method, params).await,
            #[cfg(target_arch = "wasm32")]
            TransportMode::Browser => crate::browser::call(self.global, method, &params).await,
        }
    }

    /// Registers `listener` for the wallet's lifecycle events. `Ok(false)` when this route
    /// cannot deliver pushed events.
    pub fn listen(&self, listener: EventListener) -> Result<bool, ConnectorError> {
        match &self.mode {
            TransportMode::Disabled(reason) => Err(ConnectorError::Policy(reason.clone())),
            TransportMode::Deterministic(wallet) => wallet.add_listener(listener).map(|()| true),
            #[cfg(not(target_arch = "wasm32"))]
            TransportMode::Proxy(_) => Ok(false),
            #[cfg(target_arch = "wasm32")]
            TransportMode::Browser => {
                crate::browser::listen(self.global, listener, &self.listen_generation)
            }
        }
    }

    pub fn unlisten(&self) {
        match &self.mode {
            TransportMode::Deterministic(wallet) => wallet.clear_listeners(),
            #[cfg(target_arch = "wasm32")]
            TransportMode::Browser => {
                self.listen_generation
                    .fetch_add(1, std::sync::atomic::Ordering::AcqRel);
            }
            _ => {}
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    async fn proxy_call(
        &self,
        proxy: &ProxyRuntime,
        method: &str,
        params: Value,
    ) -> Result<Value, ConnectorError> {
        let id = proxy
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "wallet": self.wallet,
            "method": method,
            "params": params,
        });
        let response = proxy
            .client
            .post(&proxy.base_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ConnectorError::Transport(format!("wallet proxy request failed: {e}")))?;
        let status = response.status();
        let body: Value = response.json().await.map_err(|e| {
            ConnectorError::Transport(format!("wallet proxy json decode failed: {e}"))
        })?;
        if !status.is_success() {
            return Err(ConnectorError::Transport(format!(
                "wallet proxy status {status}: {body}"
            )));
        }
        if let Some(err) = body.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| err.to_string());
            return Err(ConnectorError::Transport(format!(
                "{} {method} failed: {message}",
                self.wallet
            )));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| ConnectorError::Transport("wallet proxy missing result".to_owned()))
    }
}

impl TransportMode {
    fn label(&self) -> &'static str {
        match self {
            Self::Disabled(_) => "disabled",
            Self::Deterministic(_) => "deterministic",
            #[cfg(not(target_arch = "wasm32"))]
            Self::Proxy(_) => "proxy",
            #[cfg(target_arch = "wasm32")]
            Self::Browser => "browser",
        }
    }
}

/// In-memory wallet answering the same calls as the injected objects.
///
/// Used when no runtime is configured outside production, and by tests through the
/// `debug_*` hooks.
#[derive(Default)]
pub struct DeterministicWallet {
    state: Mutex<DeterministicState>,
    listeners: Mutex<Vec<EventListener>>,
}

#[derive(Debug, Clone)]
struct DeterministicState {
    installed: bool,
    accounts: Vec<String>,
    network: String,
    user_data: Option<Value>,
    pending_user_data: Option<Value>,
    failures: Vec<(String, ConnectorError)>,
    calls: Vec<String>,
}

impl Default for DeterministicState {
    fn default() -> Self {
        Self {
            installed: true,
            accounts: vec![DETERMINISTIC_ADDRESS.to_owned()],
            network: "livenet".to_owned(),
            user_data: Some(deterministic_user_data(DETERMINISTIC_ADDRESS)),
            pending_user_data: None,
            failures: Vec::new(),
            calls: Vec::new(),
        }
    }
}

impl fmt::Debug for DeterministicWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.lock().map(|l| l.len()).unwrap_or_default();
        f.debug_struct("DeterministicWallet")
            .field("state", &self.state)
            .field("listeners", &listeners)
            .finish()
    }
}

/// Session payload shaped like the one Hiro hands back after `authenticate`.
pub fn deterministic_user_data(ordinal_address: &str) -> Value {
    json!({
        "appPrivateKey": "0000000000000000000000000000000000000000000000000000000000000001",
        "profile": {
            "btcAddress": {
                "p2tr": {
                    "mainnet": ordinal_address,
                    "testnet": "tb1p5cyxnuxmeuwuvkwfem96lqzszd02n6xdcjrs20cac6yqjjwudpxqp3mvzv"
                }
            }
        }
    })
}

impl DeterministicWallet {
    fn state(&self) -> Result<MutexGuard<'_, DeterministicState>, ConnectorError> {
        self.state
            .lock()
            .map_err(|e| {
                ConnectorError::Transport(format!("deterministic wallet lock poisoned: {e}"))
            })
    }

    fn installed(&self) -> Result<bool, ConnectorError> {
        Ok(self.state()?.installed)
    }

    fn add_listener(&self, listener: EventListener) -> Result<(), ConnectorError> {
        self.listeners
            .lock()
            .map_err(|e| ConnectorError::Transport(format!("listener lock poisoned: {e}")))?
            .push(listener);
        Ok(())
    }

    fn clear_listeners(&self) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.clear();
        }
    }

    fn emit(&self, event: ProviderEvent) -> Result<(), ConnectorError> {
        // listeners run without the lock held; they may call back into the store
        let listeners = self
            .listeners
            .lock()
            .map_err(|e| ConnectorError::Transport(format!("listener lock poisoned: {e}")))?
            .clone();
        for listener in listeners {
            listener(event.clone());
        }
        Ok(())
    }

    fn handle(&self, method: &str, params: &Value) -> Result<Value, ConnectorError> {
        let mut g = self.state()?;
        g.calls.push(method.to_owned());
        if let Some(pos) = g.failures.iter().position(|(m, _)| m == method) {
            let (_, err) = g.failures.remove(pos);
            return Err(err);
        }

        let first = params.get(0);
        match method {
            "requestAccounts" => Ok(json!(g.accounts)),
            "getNetwork" => Ok(json!(g.network)),
            "switchNetwork" => {
                let label = first.and_then(Value::as_str).ok_or_else(|| {
                    ConnectorError::Validation("switchNetwork expects a network label".to_owned())
                })?;
                g.network = label.to_owned();
                drop(g);
                self.emit(ProviderEvent::NetworkChanged(label.to_owned()))?;
                Ok(json!(label))
            }
            "connect" => {
                let request = decode_unsecured_token(token_param(first, method)?)?;
                let purposes = request
                    .get("purposes")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let addresses: Vec<Value> = g
                    .accounts
                    .first()
                    .map(|address| {
                        purposes
                            .iter()
                            .map(|purpose| json!({ "address": address, "purpose": purpose }))
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(json!({ "addresses": addresses }))
            }
            "signPsbt" => match first {
                Some(Value::String(hex)) => Ok(json!(hex)),
                Some(request) => {
                    let hex = request.get("hex").and_then(Value::as_str).ok_or_else(|| {
                        ConnectorError::Validation("signPsbt request is missing hex".to_owned())
                    })?;
                    Ok(json!({ "hex": hex }))
                }
                None => Err(ConnectorError::Validation(
                    "signPsbt expects a psbt".to_owned(),
                )),
            },
            "signTransaction" => {
                let request = decode_unsecured_token(token_param(first, method)?)?;
                let psbt = request
                    .get("psbtBase64")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        ConnectorError::Validation(
                            "signTransaction is missing psbtBase64".to_owned(),
                        )
                    })?;
                Ok(json!({ "psbtBase64": psbt, "txId": null }))
            }
            "authenticate" => Ok(match g.user_data.clone() {
                Some(user_data) => json!({ "userData": user_data }),
                None => json!({ "cancelled": true }),
            }),
            "handlePendingSignIn" => match g.pending_user_data.take() {
                Some(user_data) => Ok(json!({ "userData": user_data })),
                None => Err(ConnectorError::Session("no pending sign-in".to_owned())),
            },
            _ => Err(ConnectorError::Transport(format!(
                "deterministic wallet does not support {method}"
            ))),
        }
    }

    pub fn calls(&self) -> Result<Vec<String>, ConnectorError> {
        Ok(self.state()?.calls.clone())
    }

    pub fn listener_count(&self) -> Result<usize, ConnectorError> {
        self.listeners
            .lock()
            .map(|l| l.len())
            .map_err(|e| ConnectorError::Transport(format!("listener lock poisoned: {e}")))
    }

    pub fn debug_set_installed(&self, installed: bool) -> Result<(), ConnectorError> {
        self.state()?.installed = installed;
        Ok(())
    }

    pub fn debug_set_accounts(&self, accounts: Vec<String>) -> Result<(), ConnectorError> {
        self.state()?.accounts = accounts;
        Ok(())
    }

    pub fn debug_set_network(&self, network: &str) -> Result<(), ConnectorError> {
        self.state()?.network = network.to_owned();
        Ok(())
    }

    /// `None` makes the next `authenticate` behave as if the user closed the popup.
    pub fn debug_set_user_data(&self, user_data: Option<Value>) -> Result<(), ConnectorError> {
        self.state()?.user_data = user_data;
        Ok(())
    }

    pub fn debug_set_pending_sign_in(
        &self,
        user_data: Option<Value>,
    ) -> Result<(), ConnectorError> {
        self.state()?.pending_user_data = user_data;
        Ok(())
    }

    pub fn debug_fail_next(&self, method: &str, err: ConnectorError) -> Result<(), ConnectorError> {
        self.state()?.failures.push((method.to_owned(), err));
        Ok(())
    }

    pub fn debug_inject_accounts_changed(
        &self,
        accounts: Vec<String>,
    ) -> Result<(), ConnectorError> {
        let parsed = accounts
            .iter()
            .map(|a| BtcAddress::new(a.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        self.state()?.accounts = accounts;
        self.emit(ProviderEvent::AccountsChanged(parsed))
    }

    pub fn debug_inject_network_changed(&self, network: &str) -> Result<(), ConnectorError> {
        self.state()?.network = network.to_owned();
        self.emit(ProviderEvent::NetworkChanged(network.to_owned()))
    }

    /// Emits `name` with a payload exactly as a wallet would hand it to its listeners.
    pub fn debug_inject_raw_event(&self, name: &str, payload: Value) -> Result<(), ConnectorError> {
        match event_from_payload(name, &payload) {
            Some(event) => self.emit(event),
            None => Ok(()),
        }
    }

    pub fn debug_inject_disconnect(&self, reason: Option<&str>) -> Result<(), ConnectorError> {
        let error = reason.map(|r| ConnectorError::Disconnected(r.to_owned()));
        self.emit(ProviderEvent::Disconnect(error))
    }
}

fn token_param<'a>(param: Option<&'a Value>, method: &str) -> Result<&'a str, ConnectorError> {
    param
        .and_then(Value::as_str)
        .ok_or_else(|| ConnectorError::Validation(format!("{method} expects a request token")))
}
