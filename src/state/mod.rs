pub mod counters;

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::seed_store::SeedStore,
    error::{ProtocolError, ServiceError},
};

use self::counters::{CounterStore, Seeds, Snapshot};

pub type SharedState = Arc<AppState>;

#[derive(Clone)]
/// Handle used to push messages to a connected seed client.
pub struct ClientConnection {
    /// Connection id, also the registry key.
    pub id: Uuid,
    /// Outbound queue drained by the socket's writer task.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Central application state shared by the socket handlers and the background loops.
pub struct AppState {
    config: Arc<AppConfig>,
    seed_store: RwLock<Option<Arc<dyn SeedStore>>>,
    counters: RwLock<CounterStore>,
    flush_lock: Mutex<()>,
    clients: DashMap<Uuid, ClientConnection>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a seed store is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config: Arc::new(config),
            seed_store: RwLock::new(None),
            counters: RwLock::new(CounterStore::new()),
            flush_lock: Mutex::new(()),
            clients: DashMap::new(),
            degraded: degraded_tx,
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Obtain a handle to the current seed store, if one is installed.
    pub async fn seed_store(&self) -> Option<Arc<dyn SeedStore>> {
        let guard = self.seed_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current seed store, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_seed_store(&self) -> Result<Arc<dyn SeedStore>, ServiceError> {
        self.seed_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new seed store implementation and leave degraded mode.
    pub async fn set_seed_store(&self, store: Arc<dyn SeedStore>) {
        {
            let mut guard = self.seed_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current seed store and enter degraded mode.
    pub async fn clear_seed_store(&self) {
        {
            let mut guard = self.seed_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update the degraded flag, notifying watchers only when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Registry of active client sockets keyed by connection id.
    pub fn clients(&self) -> &DashMap<Uuid, ClientConnection> {
        &self.clients
    }

    /// Counter vectors with their dirty and staleness tracking.
    pub fn counters(&self) -> &RwLock<CounterStore> {
        &self.counters
    }

    /// Guard held for the whole of one flush cycle.
    pub fn flush_lock(&self) -> &Mutex<()> {
        &self.flush_lock
    }

    /// Snapshot both counter vectors.
    pub async fn snapshot(&self) -> Snapshot {
        self.counters.read().await.get()
    }

    /// Apply a validated increment, returning how many entries changed.
    pub async fn apply_increment(
        &self,
        matt: &Seeds,
        hail: &Seeds,
    ) -> Result<usize, ProtocolError> {
        let mut counters = self.counters.write().await;
        counters.apply_increment(matt, hail).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::seed_store::memory::InMemorySeedStore;

    #[tokio::test]
    async fn starts_degraded_until_store_installed() {
        let state = AppState::new(AppConfig::default());
        assert!(state.is_degraded());
        assert!(matches!(
            state.require_seed_store().await,
            Err(ServiceError::Degraded)
        ));

        state.set_seed_store(Arc::new(InMemorySeedStore::new())).await;
        assert!(!state.is_degraded());
        assert!(state.require_seed_store().await.is_ok());

        state.clear_seed_store().await;
        assert!(state.is_degraded());
    }

    #[tokio::test]
    async fn increment_goes_through_counter_store() {
        let state = AppState::new(AppConfig::default());
        let mut matt = [0; counters::SEED_COUNT];
        matt[3] = 2;

        let changed = state
            .apply_increment(&matt, &[0; counters::SEED_COUNT])
            .await
            .unwrap();

        assert_eq!(changed, 1);
        assert_eq!(state.snapshot().await.matt[3], 2);
    }
}
