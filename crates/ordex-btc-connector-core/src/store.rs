use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::{StateUpdate, StoreState};
use crate::ports::{ActivationStore, ActivationToken, StateSink};

/// In-process application store shared by a connector and its UI.
///
/// Every published change is visible through [`ConnectorStore::subscribe`].
#[derive(Debug, Clone)]
pub struct ConnectorStore {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    state: watch::Sender<StoreState>,
    // bumped on every published change
    revision: AtomicU64,
    // bumped on start_activation and reset_state only
    generation: AtomicU64,
}

impl Default for ConnectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectorStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(StoreState::default());
        Self {
            shared: Arc::new(Shared {
                state,
                revision: AtomicU64::new(0),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.shared.state.subscribe()
    }

    pub fn revision(&self) -> u64 {
        self.shared.revision.load(Ordering::SeqCst)
    }
}

impl StateSink for ConnectorStore {
    fn update(&self, update: StateUpdate) {
        if update.is_empty() {
            return;
        }
        let shared = &self.shared;
        shared.state.send_modify(|state| {
            if let Some(chain_id) = update.chain_id {
                state.chain_id = Some(chain_id);
            }
            if let Some(accounts) = update.accounts {
                state.accounts = accounts;
            }
            if state.activating && state.has_connection() {
                state.activating = false;
            }
            shared.revision.fetch_add(1, Ordering::SeqCst);
        });
    }

    fn reset_state(&self) {
        let shared = &self.shared;
        shared.state.send_modify(|state| {
            *state = StoreState::default();
            shared.revision.fetch_add(1, Ordering::SeqCst);
            shared.generation.fetch_add(1, Ordering::SeqCst);
        });
    }

    fn snapshot(&self) -> StoreState {
        self.shared.state.borrow().clone()
    }
}

impl ActivationStore for ConnectorStore {
    type Token = ActivationHandle;

    fn start_activation(&self) -> ActivationHandle {
        let shared = &self.shared;
        let mut issued = (0, 0);
        shared.state.send_modify(|state| {
            *state = StoreState {
                activating: true,
                ..StoreState::default()
            };
            let revision = shared.revision.fetch_add(1, Ordering::SeqCst) + 1;
            let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
            issued = (revision, generation);
        });
        ActivationHandle {
            shared: Arc::clone(&self.shared),
            revision: issued.0,
            generation: issued.1,
        }
    }
}

/// Cancellation token for one activation attempt.
#[derive(Debug)]
pub struct ActivationHandle {
    shared: Arc<Shared>,
    revision: u64,
    generation: u64,
}

impl ActivationToken for ActivationHandle {
    fn cancel(self) {
        let shared = &self.shared;
        shared.state.send_if_modified(|state| {
            // an intermediate update means rollback is no longer safe
            if shared.revision.load(Ordering::SeqCst) != self.revision || !state.activating {
                return false;
            }
            *state = StoreState::default();
            shared.revision.fetch_add(1, Ordering::SeqCst);
            true
        });
    }

    fn is_superseded(&self) -> bool {
        self.shared.generation.load(Ordering::SeqCst) != self.generation
    }
}
