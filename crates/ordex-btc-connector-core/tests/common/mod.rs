#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;

use ordex_btc_connector_core::{
    ActivationHandle, ActivationStore, BtcAddress, ChainId, Connector, ConnectorError,
    ConnectorStore, EagerPolicy, ErrorHook, EventBridge, ProviderEvent, ProviderLocator,
    PsbtPayload, SignedPsbt, StateSink, StateUpdate, StoreState, WalletKind, WalletProvider,
};

pub fn addr(raw: &str) -> BtcAddress {
    BtcAddress::new(raw).expect("valid address")
}

pub fn sample_psbt() -> PsbtPayload {
    PsbtPayload::from_hex("70736274ff01000a").expect("valid psbt")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Start,
    Update(StateUpdate),
    Reset,
}

/// Store that records every call before forwarding to the real one.
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: ConnectorStore,
    calls: Mutex<Vec<StoreCall>>,
}

impl RecordingStore {
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn updates(&self) -> Vec<StateUpdate> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::Update(u) => Some(u),
                _ => None,
            })
            .collect()
    }
}

impl StateSink for RecordingStore {
    fn update(&self, update: StateUpdate) {
        self.calls
            .lock()
            .expect("calls lock")
            .push(StoreCall::Update(update.clone()));
        self.inner.update(update);
    }

    fn reset_state(&self) {
        self.calls.lock().expect("calls lock").push(StoreCall::Reset);
        self.inner.reset_state();
    }

    fn snapshot(&self) -> StoreState {
        self.inner.snapshot()
    }
}

impl ActivationStore for RecordingStore {
    type Token = ActivationHandle;

    fn start_activation(&self) -> ActivationHandle {
        self.calls.lock().expect("calls lock").push(StoreCall::Start);
        self.inner.start_activation()
    }
}

/// Scripted provider. `get_network` can be parked on a gate to interleave events.
pub struct FakeProvider {
    pub policy: EagerPolicy,
    pub accounts: Mutex<Result<Vec<BtcAddress>, ConnectorError>>,
    pub network: Mutex<String>,
    pub session: Mutex<Option<Vec<BtcAddress>>>,
    pub switchable: bool,
    pub emits_events: bool,
    pub connected: AtomicBool,
    pub can_sign: AtomicBool,
    pub calls: Mutex<Vec<&'static str>>,
    pub bridge: Mutex<Option<EventBridge>>,
    pub event_during_accounts: Mutex<Option<ProviderEvent>>,
    pub network_gate: Mutex<Option<(oneshot::Sender<()>, oneshot::Receiver<()>)>>,
    pub teardowns: AtomicUsize,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self {
            policy: EagerPolicy::RequestAccounts,
            accounts: Mutex::new(Ok(vec![addr("addr1")])),
            network: Mutex::new("livenet".to_owned()),
            session: Mutex::new(None),
            switchable: false,
            emits_events: true,
            connected: AtomicBool::new(false),
            can_sign: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
            bridge: Mutex::new(None),
            event_during_accounts: Mutex::new(None),
            network_gate: Mutex::new(None),
            teardowns: AtomicUsize::new(0),
        }
    }
}

impl FakeProvider {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn push_call(&self, name: &'static str) {
        self.calls.lock().expect("calls lock").push(name);
    }

    pub fn set_accounts(&self, accounts: Result<Vec<BtcAddress>, ConnectorError>) {
        *self.accounts.lock().expect("accounts lock") = accounts;
    }

    pub fn set_network(&self, network: &str) {
        *self.network.lock().expect("network lock") = network.to_owned();
    }

    /// Parks the next `get_network` call. The returned receiver fires once the call is
    /// parked; the sender releases it.
    pub fn park_network(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.network_gate.lock().expect("gate lock") = Some((entered_tx, release_rx));
        (entered_rx, release_tx)
    }

    pub fn emit(&self, event: ProviderEvent) {
        let bridge = self.bridge.lock().expect("bridge lock").clone();
        bridge.expect("provider subscribed").handle(event);
    }
}

#[async_trait]
impl WalletProvider for FakeProvider {
    fn wallet(&self) -> WalletKind {
        WalletKind::Unisat
    }

    fn eager_policy(&self) -> EagerPolicy {
        self.policy
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn can_sign(&self) -> bool {
        self.can_sign.load(Ordering::SeqCst)
    }

    async fn request_accounts(&self) -> Result<Vec<BtcAddress>, ConnectorError> {
        self.push_call("request_accounts");
        let event = self.event_during_accounts.lock().expect("event lock").take();
        if let Some(event) = event {
            self.emit(event);
        }
        let accounts = self.accounts.lock().expect("accounts lock").clone();
        if matches!(&accounts, Ok(a) if !a.is_empty()) {
            self.connected.store(true, Ordering::SeqCst);
        }
        accounts
    }

    async fn get_network(&self) -> Result<String, ConnectorError> {
        self.push_call("get_network");
        let gate = self.network_gate.lock().expect("gate lock").take();
        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.await;
        }
        Ok(self.network.lock().expect("network lock").clone())
    }

    async fn sign_psbt(&self, psbt: &PsbtPayload) -> Result<SignedPsbt, ConnectorError> {
        self.push_call("sign_psbt");
        Ok(SignedPsbt {
            psbt: psbt.clone(),
            txid: None,
        })
    }

    async fn switch_network(&self, chain_id: ChainId) -> Result<bool, ConnectorError> {
        self.push_call("switch_network");
        if !self.switchable {
            return Ok(false);
        }
        if let Some(label) = chain_id.network_label() {
            self.set_network(label);
        }
        Ok(true)
    }

    async fn restore_session(&self) -> Result<Option<Vec<BtcAddress>>, ConnectorError> {
        self.push_call("restore_session");
        Ok(self.session.lock().expect("session lock").clone())
    }

    fn subscribe(&self, bridge: EventBridge) -> Result<bool, ConnectorError> {
        if !self.emits_events {
            return Ok(false);
        }
        *self.bridge.lock().expect("bridge lock") = Some(bridge);
        Ok(true)
    }

    fn teardown(&self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.bridge.lock().expect("bridge lock").take();
    }
}

pub struct FakeLocator {
    pub provider: Arc<FakeProvider>,
    pub installed: AtomicBool,
    pub probe_error: Mutex<Option<ConnectorError>>,
    pub probes: AtomicUsize,
}

impl FakeLocator {
    pub fn new(provider: Arc<FakeProvider>) -> Self {
        Self {
            provider,
            installed: AtomicBool::new(true),
            probe_error: Mutex::new(None),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderLocator for FakeLocator {
    type Provider = FakeProvider;

    fn wallet(&self) -> WalletKind {
        WalletKind::Unisat
    }

    async fn locate(&self) -> Result<Arc<FakeProvider>, ConnectorError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.probe_error.lock().expect("probe lock").clone() {
            return Err(err);
        }
        if !self.installed.load(Ordering::SeqCst) {
            return Err(ConnectorError::ProviderNotFound(WalletKind::Unisat));
        }
        Ok(Arc::clone(&self.provider))
    }
}

pub type TestConnector = Connector<FakeLocator, RecordingStore>;

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

pub struct Harness {
    pub connector: TestConnector,
    pub provider: Arc<FakeProvider>,
    pub errors: ErrorLog,
}

impl Harness {
    pub fn new(provider: FakeProvider) -> Self {
        let provider = Arc::new(provider);
        let errors = ErrorLog::default();
        let connector = Connector::new(
            FakeLocator::new(Arc::clone(&provider)),
            Arc::new(RecordingStore::default()),
            Some(errors.hook()),
        );
        Self {
            connector,
            provider,
            errors,
        }
    }

    pub fn store(&self) -> &RecordingStore {
        self.connector.store()
    }

    pub fn locator(&self) -> &FakeLocator {
        self.connector.locator()
    }
}
