//! Job lifecycle operations: enqueue, the legacy pull path, the preferred
//! claim/push path, progress updates, and terminal completion/failure.
//!
//! Grounded on `redis_service.py::{add_job,get_next_job,claim_job,
//! update_job_progress,complete_job,fail_job,get_job_status}`.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use jobhub_models::{Job, JobId, JobStatus};
use redis::AsyncCommands;
use serde_json::Value;
use tracing::info;

use crate::client::{job_key, Store, JOB_QUEUE, PRIORITY_QUEUE};
use crate::error::{StoreError, StoreResult};
use crate::notify::NotificationBus;

fn epoch_secs(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn parse_epoch(s: &str) -> Option<DateTime<Utc>> {
    s.parse::<f64>().ok().and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
}

/// Serialize a `Job` into the hash fields stored at `job:{id}`.
fn job_to_fields(job: &Job) -> Vec<(String, String)> {
    let mut fields = vec![
        ("id".to_string(), job.id.to_string()),
        ("type".to_string(), job.job_type.clone()),
        ("priority".to_string(), job.priority.to_string()),
        ("params".to_string(), job.params.to_string()),
        ("status".to_string(), job.status.as_str().to_string()),
        ("created_at".to_string(), epoch_secs(job.created_at).to_string()),
        ("progress".to_string(), job.progress.to_string()),
    ];
    if let Some(c) = &job.client_id {
        fields.push(("client_id".to_string(), c.clone()));
    }
    if let Some(w) = &job.worker_id {
        fields.push(("worker".to_string(), w.clone()));
    }
    if let Some(t) = job.started_at {
        fields.push(("started_at".to_string(), epoch_secs(t).to_string()));
    }
    if let Some(t) = job.claimed_at {
        fields.push(("claimed_at".to_string(), epoch_secs(t).to_string()));
    }
    if let Some(ct) = job.claim_timeout {
        fields.push(("claim_timeout".to_string(), ct.to_string()));
    }
    if let Some(t) = job.completed_at {
        fields.push(("completed_at".to_string(), epoch_secs(t).to_string()));
    }
    if let Some(m) = &job.message {
        fields.push(("message".to_string(), m.clone()));
    }
    if let Some(r) = &job.result {
        fields.push(("result".to_string(), r.to_string()));
    }
    if let Some(e) = &job.error {
        fields.push(("error".to_string(), e.clone()));
    }
    fields
}

/// Reconstruct a `Job` from its Redis hash. Returns `None` if the hash is
/// empty (the id does not exist).
fn job_from_hash(job_id: &str, map: &HashMap<String, String>) -> Option<Job> {
    if map.is_empty() {
        return None;
    }
    let status = map
        .get("status")
        .and_then(|s| JobStatus::from_str_lossy(s))
        .unwrap_or_default();
    let params: Value = map
        .get("params")
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or(Value::Null);
    let result: Option<Value> = map.get("result").and_then(|s| serde_json::from_str(s).ok());
    let created_at = map
        .get("created_at")
        .and_then(|s| parse_epoch(s))
        .unwrap_or_else(Utc::now);

    Some(Job {
        id: JobId::from_string(job_id),
        job_type: map.get("type").cloned().unwrap_or_default(),
        priority: map.get("priority").and_then(|s| s.parse().ok()).unwrap_or(0),
        params,
        client_id: map.get("client_id").cloned(),
        status,
        created_at,
        started_at: map.get("started_at").and_then(|s| parse_epoch(s)),
        claimed_at: map.get("claimed_at").and_then(|s| parse_epoch(s)),
        claim_timeout: map.get("claim_timeout").and_then(|s| s.parse().ok()),
        completed_at: map.get("completed_at").and_then(|s| parse_epoch(s)),
        worker_id: map.get("worker").cloned(),
        progress: map.get("progress").and_then(|s| s.parse().ok()).unwrap_or(0),
        message: map.get("message").cloned(),
        result,
        error: map.get("error").cloned(),
    })
}

/// Position of a pending job within its queue (0-based, matches
/// `redis_service.py`'s `zrank`/`llen - lpos` calculation).
pub struct QueuePosition(pub i64);

#[derive(Clone)]
pub struct JobQueueManager {
    store: Store,
    notify: NotificationBus,
}

impl JobQueueManager {
    pub fn new(store: Store, notify: NotificationBus) -> Self {
        Self { store, notify }
    }

    /// Create and enqueue a new job, then notify idle workers it's available.
    pub async fn enqueue(
        &self,
        job_type: impl Into<String>,
        priority: i64,
        payload: Value,
        client_id: Option<String>,
    ) -> StoreResult<(Job, Option<QueuePosition>, usize)> {
        let job = Job::new(job_type, priority, payload, client_id);
        let key = job_key(job.id.as_str());
        let mut conn = self.store.connection().await?;

        let fields = job_to_fields(&job);
        let _: () = conn.hset_multiple(&key, &fields).await?;

        if job.is_priority() {
            let _: () = conn.zadd(PRIORITY_QUEUE, job.id.as_str(), job.priority).await?;
        } else {
            let _: () = conn.lpush(JOB_QUEUE, job.id.as_str()).await?;
        }

        let position = self.queue_position(&job).await?;

        info!(job_id = %job.id, job_type = %job.job_type, priority = job.priority, "enqueued job");

        let notified = self
            .notify
            .notify_idle_workers(job.id.as_str(), &job.job_type, job.priority, &job.params)
            .await?;

        Ok((job, position, notified.len()))
    }

    async fn queue_position(&self, job: &Job) -> StoreResult<Option<QueuePosition>> {
        if job.status != JobStatus::Pending {
            return Ok(None);
        }
        let mut conn = self.store.connection().await?;
        if job.is_priority() {
            let rank: Option<i64> = conn.zrank(PRIORITY_QUEUE, job.id.as_str()).await?;
            Ok(Some(QueuePosition(rank.unwrap_or(-1))))
        } else {
            let len: i64 = conn.llen(JOB_QUEUE).await?;
            let pos: Option<i64> = conn.lpos(JOB_QUEUE, job.id.as_str(), Default::default()).await?;
            Ok(Some(QueuePosition(pos.map(|p| len - p).unwrap_or(-1))))
        }
    }

    /// Legacy pull path: pop whatever is next (priority queue first) and
    /// assign it directly to `processing`.
    pub async fn get_next_job(&self, worker_id: &str) -> StoreResult<Option<Job>> {
        let mut conn = self.store.connection().await?;

        let top: Vec<String> = conn.zrevrange(PRIORITY_QUEUE, 0, 0).await?;
        let job_id = if let Some(id) = top.into_iter().next() {
            let _: () = conn.zrem(PRIORITY_QUEUE, &id).await?;
            Some(id)
        } else {
            conn.rpop(JOB_QUEUE, None).await?
        };

        let Some(job_id) = job_id else {
            return Ok(None);
        };

        let key = job_key(&job_id);
        let map = self.store.hgetall(&key).await?;
        let Some(job) = job_from_hash(&job_id, &map) else {
            return Ok(None);
        };

        let job = job.dequeued_by(worker_id);
        let fields = job_to_fields(&job);
        let _: () = conn.hset_multiple(&key, &fields).await?;

        self.notify.publish_job_update(&job).await?;
        info!(job_id = %job.id, worker_id, "dequeued job (pull path)");
        Ok(Some(job))
    }

    /// Preferred push path: atomically reserve a specific job for a worker.
    pub async fn claim_job(
        &self,
        job_id: &str,
        worker_id: &str,
        claim_timeout_secs: i64,
    ) -> StoreResult<Option<Job>> {
        let claimed = self.store.try_claim_job(job_id, worker_id, claim_timeout_secs).await?;
        if !claimed {
            return Ok(None);
        }

        // Remove from whichever queue it was waiting in — it may be in either
        // depending on priority, so try both; at most one will find it.
        let mut conn = self.store.connection().await?;
        let _: () = conn.zrem(PRIORITY_QUEUE, job_id).await?;
        let _: () = conn.lrem(JOB_QUEUE, 0, job_id).await?;

        let map = self.store.hgetall(&job_key(job_id)).await?;
        let job = job_from_hash(job_id, &map).ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;

        info!(job_id, worker_id, "claimed job (push path)");
        Ok(Some(job))
    }

    pub async fn update_job_progress(
        &self,
        job_id: &str,
        worker_id: &str,
        progress: u8,
        message: Option<String>,
    ) -> StoreResult<Job> {
        let key = job_key(job_id);
        let map = self.store.hgetall(&key).await?;
        let job = job_from_hash(job_id, &map).ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;

        // A completed/failed job is done; a late progress frame from a worker
        // that hasn't noticed yet must not resurrect or re-publish it.
        if job.status.is_terminal() {
            return Ok(job);
        }

        let job = job.with_progress(progress, message);
        let job = Job {
            worker_id: Some(worker_id.to_string()),
            ..job
        };

        let mut conn = self.store.connection().await?;
        let fields = job_to_fields(&job);
        let _: () = conn.hset_multiple(&key, &fields).await?;

        self.notify.publish_job_update(&job).await?;
        Ok(job)
    }

    pub async fn complete_job(
        &self,
        job_id: &str,
        _worker_id: &str,
        result: Option<Value>,
    ) -> StoreResult<Job> {
        let key = job_key(job_id);
        let map = self.store.hgetall(&key).await?;
        let job = job_from_hash(job_id, &map).ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;

        // Duplicate completion (e.g. a retried frame) must not overwrite the
        // stored result or re-publish the already-delivered update.
        if job.status.is_terminal() {
            return Ok(job);
        }

        let job = job.complete(result);
        let mut conn = self.store.connection().await?;
        let fields = job_to_fields(&job);
        let _: () = conn.hset_multiple(&key, &fields).await?;

        self.notify.publish_job_update(&job).await?;
        Ok(job)
    }

    pub async fn fail_job(
        &self,
        job_id: &str,
        _worker_id: &str,
        error: Option<String>,
    ) -> StoreResult<Job> {
        let key = job_key(job_id);
        let map = self.store.hgetall(&key).await?;
        let job = job_from_hash(job_id, &map).ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;

        // Same idempotence guard as `complete_job`: a terminal job stays as-is.
        if job.status.is_terminal() {
            return Ok(job);
        }

        let job = job.fail(error);
        let mut conn = self.store.connection().await?;
        let fields = job_to_fields(&job);
        let _: () = conn.hset_multiple(&key, &fields).await?;

        self.notify.publish_job_update(&job).await?;
        Ok(job)
    }

    pub async fn get_job(&self, job_id: &str) -> StoreResult<Option<Job>> {
        let map = self.store.hgetall(&job_key(job_id)).await?;
        Ok(job_from_hash(job_id, &map))
    }

    /// Persist a `Job` value verbatim, without any state-transition logic.
    /// Used by the reclamation sweepers, which compute the new state
    /// themselves (`revert_to_pending`) before writing it back.
    pub async fn rewrite(&self, job: &Job) -> StoreResult<()> {
        let mut conn = self.store.connection().await?;
        let fields = job_to_fields(job);
        let _: () = conn.hset_multiple(job_key(job.id.as_str()), &fields).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_round_trips_through_hash_fields() {
        let job = Job::new("render", 5, serde_json::json!({"n": 1}), Some("c1".into()));
        let fields = job_to_fields(&job);
        let map: HashMap<String, String> = fields.into_iter().collect();
        let back = job_from_hash(job.id.as_str(), &map).unwrap();
        assert_eq!(back.job_type, "render");
        assert_eq!(back.priority, 5);
        assert_eq!(back.client_id.as_deref(), Some("c1"));
        assert_eq!(back.status, JobStatus::Pending);
    }

    #[test]
    fn missing_hash_yields_none() {
        let map = HashMap::new();
        assert!(job_from_hash("job-1", &map).is_none());
    }
}
