//! Live WebSocket session tracking: one connection per client/worker id,
//! job subscriptions, stats subscriptions, and job-notification membership.
//!
//! Grounded on `original_source/docker/redis/core/connections.py::ConnectionManager`.
//! All maps are hub-local and discarded on restart (SPEC_FULL §3).

use std::collections::{HashMap, HashSet};

use axum::extract::ws::Message;
use jobhub_models::{Worker, WorkerStatus, WsMessage};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

type Outbox = mpsc::Sender<Message>;

#[derive(Default)]
struct ConnectionState {
    clients: HashMap<String, Outbox>,
    workers: HashMap<String, Outbox>,
    job_subscriptions: HashMap<String, String>,
    stats_subscriptions: HashSet<String>,
    job_notification_subscriptions: HashSet<String>,
    worker_status_local: HashMap<String, WorkerStatus>,
}

/// Tracks live sockets and their subscriptions. Cheap to clone — every
/// instance shares the same inner state via `Arc` (held by the caller).
#[derive(Default)]
pub struct ConnectionManager {
    state: RwLock<ConnectionState>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client socket's outbox, replacing any prior connection for
    /// the same id (the old socket is simply no longer written to; axum closes
    /// it once its task notices the receiver side is gone).
    pub async fn connect_client(&self, client_id: &str, tx: Outbox) {
        let mut state = self.state.write().await;
        if state.clients.insert(client_id.to_string(), tx).is_some() {
            warn!(client_id, "client reconnected, replacing previous connection");
        } else {
            info!(client_id, "client connected");
        }
    }

    pub async fn connect_worker(&self, worker_id: &str, tx: Outbox) {
        let mut state = self.state.write().await;
        if state.workers.insert(worker_id.to_string(), tx).is_some() {
            warn!(worker_id, "worker reconnected, replacing previous connection");
        } else {
            info!(worker_id, "worker connected");
        }
        state.worker_status_local.insert(worker_id.to_string(), WorkerStatus::Idle);
    }

    pub async fn disconnect_client(&self, client_id: &str) {
        let mut state = self.state.write().await;
        state.clients.remove(client_id);
        state.stats_subscriptions.remove(client_id);
        state.job_subscriptions.retain(|_, subscriber| subscriber != client_id);
        info!(client_id, "client disconnected");
    }

    pub async fn disconnect_worker(&self, worker_id: &str) {
        let mut state = self.state.write().await;
        state.workers.remove(worker_id);
        state.job_notification_subscriptions.remove(worker_id);
        state.worker_status_local.remove(worker_id);
        info!(worker_id, "worker disconnected");
    }

    pub async fn subscribe_to_job(&self, job_id: &str, client_id: &str) {
        let mut state = self.state.write().await;
        if let Some(prev) = state.job_subscriptions.insert(job_id.to_string(), client_id.to_string()) {
            if prev != client_id {
                debug!(job_id, prev, new = client_id, "job subscription replaced");
            }
        }
    }

    pub async fn subscribe_to_stats(&self, client_id: &str) {
        self.state.write().await.stats_subscriptions.insert(client_id.to_string());
    }

    pub async fn unsubscribe_from_stats(&self, client_id: &str) {
        self.state.write().await.stats_subscriptions.remove(client_id);
    }

    pub async fn has_stats_subscribers(&self) -> bool {
        !self.state.read().await.stats_subscriptions.is_empty()
    }

    pub async fn subscribe_worker_to_job_notifications(&self, worker_id: &str, enabled: bool) {
        let mut state = self.state.write().await;
        if enabled {
            state.job_notification_subscriptions.insert(worker_id.to_string());
        } else {
            state.job_notification_subscriptions.remove(worker_id);
        }
    }

    pub async fn set_worker_status_local(&self, worker_id: &str, status: WorkerStatus) {
        self.state.write().await.worker_status_local.insert(worker_id.to_string(), status);
    }

    /// Send a message to a specific client. Returns `false` (and evicts the
    /// connection) if the client is unknown or its outbox has closed.
    pub async fn send_to_client(&self, client_id: &str, message: &WsMessage) -> bool {
        let tx = { self.state.read().await.clients.get(client_id).cloned() };
        let Some(tx) = tx else {
            warn!(client_id, "cannot send: client not connected");
            return false;
        };
        self.deliver(&tx, message).await || {
            self.disconnect_client(client_id).await;
            false
        }
    }

    pub async fn send_to_worker(&self, worker_id: &str, message: &WsMessage) -> bool {
        let tx = { self.state.read().await.workers.get(worker_id).cloned() };
        let Some(tx) = tx else {
            warn!(worker_id, "cannot send: worker not connected");
            return false;
        };
        self.deliver(&tx, message).await || {
            self.disconnect_worker(worker_id).await;
            false
        }
    }

    async fn deliver(&self, tx: &Outbox, message: &WsMessage) -> bool {
        let Ok(json) = serde_json::to_string(message) else {
            return false;
        };
        tx.send(Message::Text(json)).await.is_ok()
    }

    /// Forward a job update to its subscriber, if any.
    pub async fn send_job_update(&self, job_id: &str, message: &WsMessage) -> bool {
        let client_id = { self.state.read().await.job_subscriptions.get(job_id).cloned() };
        match client_id {
            Some(client_id) => self.send_to_client(&client_id, message).await,
            None => {
                debug!(job_id, "no subscriber for job update");
                false
            }
        }
    }

    pub async fn broadcast_stats(&self, message: &WsMessage) -> usize {
        let subscribers: Vec<String> = { self.state.read().await.stats_subscriptions.iter().cloned().collect() };
        let mut sent = 0;
        for client_id in subscribers {
            if self.send_to_client(&client_id, message).await {
                sent += 1;
            }
        }
        sent
    }

    /// Notify every idle, job-notification-subscribed worker of newly
    /// available work. Mirrors `ConnectionManager.notify_idle_workers`.
    pub async fn notify_idle_workers(
        &self,
        job_id: &str,
        job_type: &str,
        priority: i64,
        params_summary: Option<serde_json::Value>,
    ) -> usize {
        let idle_workers: Vec<String> = {
            let state = self.state.read().await;
            state
                .job_notification_subscriptions
                .iter()
                .filter(|id| state.worker_status_local.get(*id) == Some(&WorkerStatus::Idle))
                .cloned()
                .collect()
        };

        let mut sent = 0;
        for worker_id in idle_workers {
            let message = WsMessage::JobAvailable {
                job_id: job_id.to_string(),
                job_type: job_type.to_string(),
                priority,
                params_summary: params_summary.clone(),
                timestamp: None,
            };
            if self.send_to_worker(&worker_id, &message).await {
                sent += 1;
            }
        }
        sent
    }

    pub async fn worker_snapshot(&self, worker: &Worker) {
        self.set_worker_status_local(&worker.worker_id, worker.status).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws_message() -> WsMessage {
        WsMessage::NoJob { timestamp: None }
    }

    #[tokio::test]
    async fn send_to_unknown_client_returns_false() {
        let mgr = ConnectionManager::new();
        assert!(!mgr.send_to_client("nobody", &ws_message()).await);
    }

    #[tokio::test]
    async fn send_evicts_connection_on_closed_channel() {
        let mgr = ConnectionManager::new();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        mgr.connect_client("c1", tx).await;

        assert!(!mgr.send_to_client("c1", &ws_message()).await);
        // eviction removed the stats subscription entry too
        mgr.subscribe_to_stats("c1").await;
        assert!(mgr.has_stats_subscribers().await);
        assert!(!mgr.send_to_client("c1", &ws_message()).await);
    }

    #[tokio::test]
    async fn job_subscription_routes_update_to_subscriber() {
        let mgr = ConnectionManager::new();
        let (tx, mut rx) = mpsc::channel(4);
        mgr.connect_client("c1", tx).await;
        mgr.subscribe_to_job("job-1", "c1").await;

        assert!(mgr.send_job_update("job-1", &ws_message()).await);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn unsubscribed_job_update_is_a_noop() {
        let mgr = ConnectionManager::new();
        assert!(!mgr.send_job_update("job-404", &ws_message()).await);
    }

    #[tokio::test]
    async fn disconnect_removes_job_subscription() {
        let mgr = ConnectionManager::new();
        let (tx, _rx) = mpsc::channel(4);
        mgr.connect_client("c1", tx).await;
        mgr.subscribe_to_job("job-1", "c1").await;
        mgr.disconnect_client("c1").await;

        assert!(!mgr.send_job_update("job-1", &ws_message()).await);
    }

    #[tokio::test]
    async fn notify_idle_workers_skips_busy_and_unsubscribed() {
        let mgr = ConnectionManager::new();
        let (idle_tx, mut idle_rx) = mpsc::channel(4);
        let (busy_tx, mut busy_rx) = mpsc::channel(4);

        mgr.connect_worker("idle-1", idle_tx).await;
        mgr.connect_worker("busy-1", busy_tx).await;
        mgr.set_worker_status_local("busy-1", WorkerStatus::Busy).await;

        mgr.subscribe_worker_to_job_notifications("idle-1", true).await;
        mgr.subscribe_worker_to_job_notifications("busy-1", true).await;

        let sent = mgr.notify_idle_workers("job-1", "render", 0, None).await;
        assert_eq!(sent, 1);
        assert!(idle_rx.recv().await.is_some());
        assert!(busy_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn connect_worker_defaults_to_idle() {
        let mgr = ConnectionManager::new();
        let (tx, _rx) = mpsc::channel(4);
        mgr.connect_worker("w1", tx).await;
        mgr.subscribe_worker_to_job_notifications("w1", true).await;

        assert_eq!(mgr.notify_idle_workers("job-1", "render", 0, None).await, 1);
    }
}
