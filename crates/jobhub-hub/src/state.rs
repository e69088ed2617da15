//! Application state.

use std::sync::Arc;

use jobhub_store::{JobQueueManager, NotificationBus, StatsCollector, Store, WorkerRegistry};

use crate::config::HubConfig;
use crate::connections::ConnectionManager;

/// Shared application state. Cheap to clone — everything inside is either
/// `Arc`'d or itself cheap to clone (`Store`, the `jobhub-store` services).
#[derive(Clone)]
pub struct HubState {
    pub config: HubConfig,
    pub store: Store,
    pub queue: JobQueueManager,
    pub registry: WorkerRegistry,
    pub notify: NotificationBus,
    pub stats: StatsCollector,
    pub connections: Arc<ConnectionManager>,
}

impl HubState {
    /// Build state from a already-loaded config, opening the Redis connection
    /// and wiring up the store-backed services.
    pub async fn new(config: HubConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store = Store::from_env()?;
        store.init().await?;

        let notify = NotificationBus::new(store.clone());
        let queue = JobQueueManager::new(store.clone(), notify.clone());
        let registry = WorkerRegistry::new(store.clone());
        let stats = StatsCollector::new(store.clone());

        Ok(Self {
            config,
            store,
            queue,
            registry,
            notify,
            stats,
            connections: Arc::new(ConnectionManager::new()),
        })
    }
}
