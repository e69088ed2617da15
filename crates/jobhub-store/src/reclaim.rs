//! Background sweepers that reclaim work abandoned by dead workers.
//!
//! Three independent loops, grounded on `redis_service.py::{cleanup_stale_claims,
//! mark_stale_workers_out_of_service,cleanup_stale_jobs}`:
//! - stale-claim sweep: jobs claimed but never progressed past their claim timeout
//!   go back to `pending`.
//! - stale-worker sweep: workers whose heartbeat has gone quiet are marked
//!   `out_of_service` so they stop receiving notifications.
//! - deep sweep: workers silent for much longer are marked `disconnected` and
//!   any job they were processing is reclaimed to `pending`.

use chrono::Utc;
use jobhub_models::{JobStatus, WorkerStatus};
use metrics::counter;
use redis::AsyncCommands;
use tokio::time::interval;
use tracing::{info, warn};

use crate::client::{Store, JOB_QUEUE, PRIORITY_QUEUE, WORKERS_IDLE};
use crate::notify::NotificationBus;
use crate::queue_manager::JobQueueManager;
use crate::registry::WorkerRegistry;

#[derive(Clone)]
pub struct ReclamationService {
    store: Store,
    queue: JobQueueManager,
    registry: WorkerRegistry,
    notify: NotificationBus,
}

impl ReclamationService {
    pub fn new(store: Store, queue: JobQueueManager, registry: WorkerRegistry, notify: NotificationBus) -> Self {
        Self { store, queue, registry, notify }
    }

    /// Spawn all three sweepers. Callers keep the returned handles only to
    /// observe a crashed sweeper; dropping them does not stop the loops.
    pub fn spawn_all(&self) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            self.clone().spawn_stale_claim_sweep(),
            self.clone().spawn_stale_worker_sweep(),
            self.clone().spawn_deep_sweep(),
        ]
    }

    fn spawn_stale_claim_sweep(self) -> tokio::task::JoinHandle<()> {
        let period = self.store.config().stale_claim_sweep_interval_secs;
        tokio::spawn(async move {
            let mut ticker = interval(std::time::Duration::from_secs(period));
            loop {
                ticker.tick().await;
                if let Err(err) = self.sweep_stale_claims().await {
                    warn!(error = %err, "stale-claim sweep failed");
                }
            }
        })
    }

    fn spawn_stale_worker_sweep(self) -> tokio::task::JoinHandle<()> {
        let period = self.store.config().stale_worker_sweep_interval_secs;
        tokio::spawn(async move {
            let mut ticker = interval(std::time::Duration::from_secs(period));
            loop {
                ticker.tick().await;
                if let Err(err) = self.sweep_stale_workers().await {
                    warn!(error = %err, "stale-worker sweep failed");
                }
            }
        })
    }

    fn spawn_deep_sweep(self) -> tokio::task::JoinHandle<()> {
        let period = self.store.config().deep_sweep_interval_secs;
        tokio::spawn(async move {
            let mut ticker = interval(std::time::Duration::from_secs(period));
            loop {
                ticker.tick().await;
                if let Err(err) = self.deep_sweep().await {
                    warn!(error = %err, "deep sweep failed");
                }
            }
        })
    }

    async fn sweep_stale_claims(&self) -> crate::error::StoreResult<()> {
        let fallback_max_age = self.store.config().stale_claim_max_age_secs;
        let now = Utc::now().timestamp();

        for key in self.store.scan_keys("job:").await? {
            let map = self.store.hgetall(&key).await?;
            let Some(status) = map.get("status") else { continue };
            if status != "claimed" {
                continue;
            }
            let Some(job_id) = map.get("id").cloned() else { continue };
            let claimed_at: i64 = map.get("claimed_at").and_then(|s| s.parse().ok()).unwrap_or(0);
            let claim_timeout: i64 = map
                .get("claim_timeout")
                .and_then(|s| s.parse().ok())
                .unwrap_or(fallback_max_age);

            if now - claimed_at <= claim_timeout {
                continue;
            }

            info!(job_id, claimed_at, claim_timeout, "reclaiming stale claim");
            if let Some(job) = self.queue.get_job(&job_id).await? {
                let job = job.revert_to_pending();
                self.queue.rewrite(&job).await?;
                let mut conn = self.store.connection().await?;
                if job.is_priority() {
                    let _: () = conn.zadd(PRIORITY_QUEUE, job.id.as_str(), job.priority).await?;
                } else {
                    let _: () = conn.lpush(JOB_QUEUE, job.id.as_str()).await?;
                }
                self.notify.publish_job_update(&job).await?;
                counter!("jobhub_jobs_reclaimed_total", "reason" => "stale_claim").increment(1);
            }
        }
        Ok(())
    }

    async fn sweep_stale_workers(&self) -> crate::error::StoreResult<()> {
        let threshold = self.store.config().worker_out_of_service_age_secs;
        let now = Utc::now().timestamp();

        for key in self.store.scan_keys("worker:").await? {
            let map = self.store.hgetall(&key).await?;
            let Some(worker_id) = map.get("id").cloned() else { continue };
            let status = map.get("status").map(String::as_str).unwrap_or("");
            if status == "disconnected" || status == "out_of_service" {
                continue;
            }
            let last_heartbeat: i64 = map.get("last_heartbeat").and_then(|s| s.parse().ok()).unwrap_or(0);
            if now - last_heartbeat <= threshold {
                continue;
            }

            info!(worker_id, "marking worker out of service, heartbeat stale");
            self.registry.set_status(&worker_id, WorkerStatus::OutOfService).await?;
        }
        Ok(())
    }

    async fn deep_sweep(&self) -> crate::error::StoreResult<()> {
        let threshold = self.store.config().max_worker_heartbeat_age_secs;
        let now = Utc::now().timestamp();

        for key in self.store.scan_keys("worker:").await? {
            let map = self.store.hgetall(&key).await?;
            let Some(worker_id) = map.get("id").cloned() else { continue };
            let status = map.get("status").map(String::as_str).unwrap_or("");
            if status == "disconnected" {
                continue;
            }
            let last_heartbeat: i64 = map.get("last_heartbeat").and_then(|s| s.parse().ok()).unwrap_or(0);
            if now - last_heartbeat <= threshold {
                continue;
            }

            warn!(worker_id, "worker heartbeat very stale, marking disconnected");
            self.registry.set_status(&worker_id, WorkerStatus::Disconnected).await?;

            let mut conn = self.store.connection().await?;
            let _: () = conn.srem(WORKERS_IDLE, &worker_id).await?;

            if let Some(job_id) = map.get("current_job") {
                if let Some(job) = self.queue.get_job(job_id).await? {
                    if job.status == JobStatus::Processing || job.status == JobStatus::Claimed {
                        let job = job.revert_to_pending();
                        self.queue.rewrite(&job).await?;
                        if job.is_priority() {
                            let _: () = conn.zadd(PRIORITY_QUEUE, job.id.as_str(), job.priority).await?;
                        } else {
                            let _: () = conn.lpush(JOB_QUEUE, job.id.as_str()).await?;
                        }
                        self.notify.publish_job_update(&job).await?;
                        info!(job_id = %job.id, worker_id, "reclaimed job from disconnected worker");
                        counter!("jobhub_jobs_reclaimed_total", "reason" => "worker_disconnected").increment(1);
                    }
                }
            }
        }
        Ok(())
    }
}
