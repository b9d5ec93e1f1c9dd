use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::chain::resolve_chain_id;
use crate::domain::{BtcAddress, ChainId, StateUpdate};
use crate::ports::{ConnectorError, ErrorHook, StateSink};
use crate::state_machine::{activation_transition, derive_status, ActivationAction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    Connect,
    Disconnect(Option<ConnectorError>),
    NetworkChanged(String),
    AccountsChanged(Vec<BtcAddress>),
}

/// Translates provider lifecycle events into store updates.
///
/// Providers receive a clone at subscription time and call [`EventBridge::handle`] from their
/// listeners. Every update is partial; a disconnect or an empty account list resets the store.
#[derive(Clone)]
pub struct EventBridge {
    sink: Arc<dyn StateSink>,
    on_error: Option<ErrorHook>,
}

impl fmt::Debug for EventBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBridge")
            .field("on_error", &self.on_error.is_some())
            .finish_non_exhaustive()
    }
}

impl EventBridge {
    pub fn new(sink: Arc<dyn StateSink>, on_error: Option<ErrorHook>) -> Self {
        Self { sink, on_error }
    }

    pub fn handle(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::Connect => {
                debug!("provider emitted connect");
            }
            ProviderEvent::Disconnect(error) => {
                let from = derive_status(&self.sink.snapshot(), None);
                match activation_transition(from, ActivationAction::Disconnect) {
                    Ok((_, t)) => {
                        debug!(from = ?t.from, reason = t.reason, "provider disconnected")
                    }
                    Err(_) => debug!("provider disconnected while idle"),
                }
                self.sink.reset_state();
                if let Some(error) = error {
                    self.report(&error);
                }
            }
            ProviderEvent::NetworkChanged(network) => {
                let chain_id = resolve_chain_id(&network);
                debug!(%network, %chain_id, "provider network changed");
                if chain_id == ChainId::Unknown {
                    self.report(&ConnectorError::UnknownChain(network));
                }
                self.sink.update(StateUpdate::chain(chain_id));
            }
            ProviderEvent::AccountsChanged(accounts) => {
                debug!(count = accounts.len(), "provider accounts changed");
                if accounts.is_empty() {
                    // zero accounts is not actionable, treat it as a disconnect
                    self.sink.reset_state();
                } else {
                    self.sink.update(StateUpdate::accounts(accounts));
                }
            }
        }
    }

    pub(crate) fn report(&self, error: &ConnectorError) {
        warn!(error = %error, kind = ?error.kind(), "connector error");
        if let Some(hook) = &self.on_error {
            hook(error);
        }
    }
}
