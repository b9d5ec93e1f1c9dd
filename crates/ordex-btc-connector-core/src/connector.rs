use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::chain::resolve_chain_id;
use crate::domain::{
    ActivationStatus, BtcAddress, ChainId, ConnectorState, EagerPolicy, PsbtPayload, SignedPsbt,
    StateUpdate, WalletKind,
};
use crate::events::EventBridge;
use crate::ports::{
    ActivationStore, ActivationToken, ConnectorError, ErrorHook, ProviderLocator, StateSink,
    WalletProvider,
};
use crate::state_machine::{activation_transition, derive_status, ActivationAction};

/// Shared reference to a detected provider. The host owns its lifecycle.
#[derive(Debug)]
pub struct ProviderHandle<P>(Arc<P>);

impl<P> ProviderHandle<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self(provider)
    }

    pub fn shared(&self) -> Arc<P> {
        Arc::clone(&self.0)
    }
}

impl<P> Clone for ProviderHandle<P> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<P> Deref for ProviderHandle<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.0
    }
}

type InitCell<P> = Arc<OnceCell<ProviderHandle<P>>>;

/// Generic activation engine shared by every wallet.
///
/// One instance drives one wallet against one store. Calls suspend only at provider
/// boundaries; provider events may land at any point and always win over a superseded attempt.
pub struct Connector<L, S>
where
    L: ProviderLocator,
    S: ActivationStore + 'static,
{
    locator: L,
    store: Arc<S>,
    on_error: Option<ErrorHook>,
    init: Mutex<InitCell<L::Provider>>,
    provider: Mutex<Option<ProviderHandle<L::Provider>>>,
    last_error: Mutex<Option<ConnectorError>>,
    in_flight: AtomicBool,
}

struct AttemptGuard<'a>(&'a AtomicBool);

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<L, S> Connector<L, S>
where
    L: ProviderLocator,
    S: ActivationStore + 'static,
{
    pub fn new(locator: L, store: Arc<S>, on_error: Option<ErrorHook>) -> Self {
        Self {
            locator,
            store,
            on_error,
            init: Mutex::new(Arc::new(OnceCell::new())),
            provider: Mutex::new(None),
            last_error: Mutex::new(None),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn wallet(&self) -> WalletKind {
        self.locator.wallet()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn locator(&self) -> &L {
        &self.locator
    }

    /// Currently detected provider, if initialization has completed.
    pub fn provider(&self) -> Option<ProviderHandle<L::Provider>> {
        lock(&self.provider).clone()
    }

    pub fn status(&self) -> ActivationStatus {
        derive_status(&self.store.snapshot(), lock(&self.last_error).as_ref())
    }

    pub fn state(&self) -> ConnectorState {
        let snapshot = self.store.snapshot();
        let status = derive_status(&snapshot, lock(&self.last_error).as_ref());
        ConnectorState {
            status,
            chain_id: snapshot.chain_id,
            accounts: snapshot.accounts,
        }
    }

    /// Silent reconnection on page load. Never surfaces an error to the caller.
    pub async fn connect_eagerly(&self) {
        let wallet = self.wallet();
        let Some(_attempt) = self.begin_attempt() else {
            debug!(%wallet, "eager connection skipped: activation in flight");
            return;
        };

        let from = self.status();
        let token = self.store.start_activation();
        self.record(from, ActivationAction::Start);

        match self.eager_update().await {
            Ok(Some(update)) => {
                self.publish(Some(&token), update);
            }
            Ok(None) => {
                debug!(%wallet, "no existing session to restore");
                token.cancel();
                self.record(ActivationStatus::Activating, ActivationAction::Cancel);
            }
            Err(err) => {
                debug!(%wallet, error = %err, "could not connect eagerly");
                // provider events may already have touched the store, so cancelling is not enough
                self.store.reset_state();
                self.reset_initialization();
                self.record(ActivationStatus::Activating, ActivationAction::Reset);
            }
        }
    }

    /// User-initiated connection. Rolls back and reports through the error hook before failing.
    pub async fn activate(&self, desired_chain_id: Option<ChainId>) -> Result<(), ConnectorError> {
        let wallet = self.wallet();
        let _attempt = self
            .begin_attempt()
            .ok_or(ConnectorError::ActivationPending)?;

        let already_connected = self.is_connected();
        let token = if already_connected {
            debug!(%wallet, "already connected; refreshing without activation phase");
            None
        } else {
            let from = self.status();
            let token = self.store.start_activation();
            self.record(from, ActivationAction::Start);
            Some(token)
        };

        match self.activation_update(desired_chain_id).await {
            Ok(update) => {
                self.publish(token.as_ref(), update);
                *lock(&self.last_error) = None;
                Ok(())
            }
            Err(err) => {
                let from = self.status();
                if let Some(token) = token {
                    let superseded = token.is_superseded();
                    token.cancel();
                    if !superseded && self.store.snapshot().activating {
                        // an intermediate provider update blocked the rollback
                        self.store.reset_state();
                    }
                }
                if !already_connected {
                    self.reset_initialization();
                }
                *lock(&self.last_error) = Some(err.clone());
                self.record(from, ActivationAction::Fail);
                self.report(&err);
                Err(err)
            }
        }
    }

    /// Clears the store and forgets the provider so the next activation probes again.
    pub fn deactivate(&self) {
        let from = self.status();
        self.store.reset_state();
        self.reset_initialization();
        *lock(&self.last_error) = None;
        self.record(from, ActivationAction::Reset);
    }

    /// Fails with `ProviderNotFound` before delegating when no provider or session exists.
    pub async fn sign_transaction(&self, psbt: &PsbtPayload) -> Result<SignedPsbt, ConnectorError> {
        let provider = self
            .provider()
            .filter(|p| p.can_sign())
            .ok_or(ConnectorError::ProviderNotFound(self.wallet()))?;
        provider.sign_psbt(psbt).await
    }

    fn is_connected(&self) -> bool {
        self.provider().is_some_and(|p| p.is_connected())
    }

    fn begin_attempt(&self) -> Option<AttemptGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| AttemptGuard(&self.in_flight))
    }

    async fn eager_update(&self) -> Result<Option<StateUpdate>, ConnectorError> {
        let provider = self.initialize().await?;
        let accounts = match provider.eager_policy() {
            EagerPolicy::ExistingSessionOnly => match provider.restore_session().await? {
                Some(accounts) => accounts,
                None => return Ok(None),
            },
            EagerPolicy::RequestAccounts => provider.request_accounts().await?,
        };
        self.finalize(&provider, accounts, None).await.map(Some)
    }

    async fn activation_update(
        &self,
        desired_chain_id: Option<ChainId>,
    ) -> Result<StateUpdate, ConnectorError> {
        let provider = self.initialize().await?;
        let accounts = provider.request_accounts().await?;
        self.finalize(&provider, accounts, desired_chain_id).await
    }

    // Accounts are always requested before the network; the two calls never overlap.
    async fn finalize(
        &self,
        provider: &ProviderHandle<L::Provider>,
        accounts: Vec<BtcAddress>,
        desired_chain_id: Option<ChainId>,
    ) -> Result<StateUpdate, ConnectorError> {
        if accounts.is_empty() {
            return Err(ConnectorError::NoAccountsReturned);
        }

        let mut network = provider.get_network().await?;
        let mut chain_id = resolve_chain_id(&network);

        if let Some(desired) = desired_chain_id.filter(|d| d.is_known() && *d != chain_id) {
            if provider.switch_network(desired).await? {
                network = provider.get_network().await?;
                chain_id = resolve_chain_id(&network);
            } else {
                warn!(
                    wallet = %self.wallet(),
                    %desired,
                    current = %chain_id,
                    "wallet cannot switch networks; keeping reported network"
                );
            }
        }

        if chain_id == ChainId::Unknown {
            self.report(&ConnectorError::UnknownChain(network));
        }
        Ok(StateUpdate::full(chain_id, accounts))
    }

    async fn initialize(&self) -> Result<ProviderHandle<L::Provider>, ConnectorError> {
        let cell = Arc::clone(&*lock(&self.init));
        let handle = cell.get_or_try_init(|| self.probe()).await?.clone();

        // deactivate may have replaced the cell while the probe was in flight
        let current = Arc::clone(&*lock(&self.init));
        if Arc::ptr_eq(&cell, &current) {
            *lock(&self.provider) = Some(handle.clone());
        }
        Ok(handle)
    }

    async fn probe(&self) -> Result<ProviderHandle<L::Provider>, ConnectorError> {
        let wallet = self.wallet();
        let provider = self.locator.locate().await?;

        let sink: Arc<dyn StateSink> = self.store.clone();
        let bridge = EventBridge::new(sink, self.on_error.clone());
        match provider.subscribe(bridge) {
            Ok(true) => debug!(%wallet, "subscribed to provider events"),
            Ok(false) => debug!(%wallet, "provider emits no lifecycle events"),
            Err(err) => warn!(%wallet, error = %err, "provider event subscription failed"),
        }

        debug!(%wallet, "provider detected");
        Ok(ProviderHandle::new(provider))
    }

    fn reset_initialization(&self) {
        *lock(&self.init) = Arc::new(OnceCell::new());
        let taken = lock(&self.provider).take();
        if let Some(provider) = taken {
            provider.teardown();
        }
    }

    fn publish(&self, token: Option<&S::Token>, update: StateUpdate) {
        if token.is_some_and(|t| t.is_superseded()) {
            debug!(wallet = %self.wallet(), "activation superseded; dropping its result");
            return;
        }
        let from = self.status();
        self.store.update(update);
        self.record(from, ActivationAction::Succeed);
    }

    fn record(&self, from: ActivationStatus, action: ActivationAction) {
        let wallet = self.wallet();
        match activation_transition(from, action) {
            Ok((_, t)) => debug!(
                %wallet,
                from = ?t.from,
                to = ?t.to,
                reason = t.reason,
                "activation transition"
            ),
            Err(err) => debug!(%wallet, error = %err, "activation transition outside the table"),
        }
    }

    fn report(&self, error: &ConnectorError) {
        warn!(wallet = %self.wallet(), error = %error, kind = ?error.kind(), "connector error");
        if let Some(hook) = &self.on_error {
            hook(error);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
