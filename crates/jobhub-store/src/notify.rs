//! Pub/sub notification bus: job status/progress events and idle-worker
//! job-available announcements.
//!
//! Grounded on `redis_service.py::{publish_job_update,notify_idle_workers_of_job}`
//! and `routes.py::{start_redis_listener,handle_job_update,handle_job_notification}`.
//! `vclip-queue/src/progress.rs`'s pub/sub-as-stream pattern is the template for
//! turning a Redis channel into a `Stream`.

use std::pin::Pin;

use chrono::Utc;
use futures_util::{Stream, StreamExt};
use jobhub_models::Job;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::client::{
    job_updates_channel, worker_key, Store, JOB_NOTIFICATIONS_CHANNEL, JOB_UPDATES_CHANNEL,
    WORKERS_ALL,
};
use crate::error::StoreResult;

/// Event published on `job_updates` / `job_updates:{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobUpdateEvent {
    pub job_id: String,
    pub status: String,
    pub timestamp: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobUpdateEvent {
    fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            status: job.status.as_str().to_string(),
            timestamp: Utc::now().timestamp() as f64,
            progress: Some(job.progress),
            worker_id: job.worker_id.clone(),
            message: job.message.clone(),
            result: job.result.clone(),
            error: job.error.clone(),
        }
    }
}

/// Event published on `job_notifications`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAvailableEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub job_id: String,
    pub job_type: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Clone)]
pub struct NotificationBus {
    store: Store,
}

impl NotificationBus {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Publish a job's current state to both its dedicated channel and the
    /// global `job_updates` channel.
    pub async fn publish_job_update(&self, job: &Job) -> StoreResult<()> {
        let event = JobUpdateEvent::from_job(job);
        let payload = serde_json::to_string(&event)?;

        let mut conn = self.store.connection().await?;
        redis::pipe()
            .publish(job_updates_channel(job.id.as_str()), &payload)
            .ignore()
            .publish(JOB_UPDATES_CHANNEL, &payload)
            .ignore()
            .exec_async(&mut conn)
            .await?;

        debug!(job_id = %job.id, status = %job.status, "published job update");
        Ok(())
    }

    /// Find idle, freshly-heartbeating workers and announce a newly queued
    /// job to `job_notifications`. Does not implement the source's
    /// unused `broadcast_job_notification` (send-to-all-workers) path.
    pub async fn notify_idle_workers(
        &self,
        job_id: &str,
        job_type: &str,
        priority: i64,
        params: &Value,
    ) -> StoreResult<Vec<String>> {
        let worker_ids = self.store.scan_keys("worker:").await?;
        let freshness = self.store.config().worker_freshness_secs;

        let mut idle = Vec::new();
        for key in worker_ids {
            let map = self.store.hgetall(&key).await?;
            let Some(worker_id) = map.get("id").cloned().or_else(|| {
                key.strip_prefix("worker:").map(|s| s.to_string())
            }) else {
                continue;
            };
            let status = map.get("status").map(String::as_str).unwrap_or("");
            let last_heartbeat: f64 = map
                .get("last_heartbeat")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.0);
            let age = Utc::now().timestamp() as f64 - last_heartbeat;
            if status == "idle" && age < freshness as f64 {
                idle.push(worker_id);
            }
        }

        let event = JobAvailableEvent {
            event_type: "job_available".to_string(),
            job_id: job_id.to_string(),
            job_type: job_type.to_string(),
            priority,
            params: if params.is_null() { None } else { Some(params.clone()) },
        };
        let payload = serde_json::to_string(&event)?;
        let mut conn = self.store.connection().await?;
        let _: () = redis::AsyncCommands::publish(&mut conn, JOB_NOTIFICATIONS_CHANNEL, payload).await?;

        info!(job_id, notified = idle.len(), "notified idle workers of new job");
        Ok(idle)
    }

    /// Subscribe to every job update (used by clients subscribed to a
    /// specific job, and by the stats broadcaster's change-detection).
    pub async fn subscribe_job_updates(
        &self,
        job_id: &str,
    ) -> StoreResult<Pin<Box<dyn Stream<Item = JobUpdateEvent> + Send>>> {
        let mut pubsub = self.store.pubsub().await?;
        pubsub.subscribe(job_updates_channel(job_id)).await?;
        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move {
                let payload: String = msg.get_payload().ok()?;
                serde_json::from_str(&payload).ok()
            });
        Ok(Box::pin(stream))
    }

    /// Subscribe to the global `job_updates` channel — every job's updates,
    /// not just one. Used by the hub process to fan updates out to whichever
    /// client socket is locally subscribed to each job.
    pub async fn subscribe_all_job_updates(
        &self,
    ) -> StoreResult<Pin<Box<dyn Stream<Item = JobUpdateEvent> + Send>>> {
        let mut pubsub = self.store.pubsub().await?;
        pubsub.subscribe(JOB_UPDATES_CHANNEL).await?;
        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move {
                let payload: String = msg.get_payload().ok()?;
                serde_json::from_str(&payload).ok()
            });
        Ok(Box::pin(stream))
    }

    /// Subscribe to `job_notifications`, used by workers that want a push
    /// instead of polling `get_next_job`.
    pub async fn subscribe_job_notifications(
        &self,
    ) -> StoreResult<Pin<Box<dyn Stream<Item = JobAvailableEvent> + Send>>> {
        let mut pubsub = self.store.pubsub().await?;
        pubsub.subscribe(JOB_NOTIFICATIONS_CHANNEL).await?;
        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move {
                let payload: String = msg.get_payload().ok()?;
                serde_json::from_str(&payload).ok()
            });
        Ok(Box::pin(stream))
    }

    pub(crate) fn worker_key_of(worker_id: &str) -> String {
        worker_key(worker_id)
    }

    pub(crate) fn workers_all_set() -> &'static str {
        WORKERS_ALL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_update_event_serializes_with_optional_fields_omitted() {
        let job = jobhub_models::Job::new("render", 0, serde_json::Value::Null, None);
        let event = JobUpdateEvent::from_job(&job);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"status\":\"pending\""));
        assert!(!json.contains("\"worker_id\""));
    }
}
