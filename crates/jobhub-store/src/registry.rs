//! Worker registration, heartbeat tracking and status transitions.
//!
//! Grounded on `redis_service.py::{register_worker,update_worker_heartbeat,
//! worker_exists,update_worker_status,get_worker_info}`.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use jobhub_models::{Worker, WorkerStatus};
use redis::AsyncCommands;
use tracing::info;

use crate::client::{worker_key, Store, WORKERS_ALL, WORKERS_IDLE};
use crate::error::{StoreError, StoreResult};

fn epoch_secs(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn parse_epoch(s: &str) -> Option<DateTime<Utc>> {
    s.parse::<f64>().ok().and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
}

fn worker_to_fields(worker: &Worker) -> Vec<(String, String)> {
    let mut fields = vec![
        ("id".to_string(), worker.worker_id.clone()),
        ("machine_id".to_string(), worker.machine_id.clone()),
        ("gpu_id".to_string(), worker.gpu_id.clone()),
        ("status".to_string(), worker.status.as_str().to_string()),
        ("registered_at".to_string(), epoch_secs(worker.registered_at).to_string()),
        ("last_heartbeat".to_string(), epoch_secs(worker.last_heartbeat).to_string()),
    ];
    if let Some(job) = &worker.current_job {
        fields.push(("current_job".to_string(), job.clone()));
    }
    fields
}

fn worker_from_hash(map: &HashMap<String, String>) -> Option<Worker> {
    if map.is_empty() {
        return None;
    }
    let status = map
        .get("status")
        .and_then(|s| WorkerStatus::from_str_lossy(s))
        .unwrap_or_default();
    Some(Worker {
        worker_id: map.get("id").cloned()?,
        machine_id: map.get("machine_id").cloned().unwrap_or_default(),
        gpu_id: map.get("gpu_id").cloned().unwrap_or_default(),
        status,
        registered_at: map
            .get("registered_at")
            .and_then(|s| parse_epoch(s))
            .unwrap_or_else(Utc::now),
        last_heartbeat: map
            .get("last_heartbeat")
            .and_then(|s| parse_epoch(s))
            .unwrap_or_else(Utc::now),
        current_job: map.get("current_job").cloned(),
    })
}

#[derive(Clone)]
pub struct WorkerRegistry {
    store: Store,
}

impl WorkerRegistry {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn register(&self, machine_id: &str, gpu_id: &str) -> StoreResult<Worker> {
        let worker_id = Worker::derive_worker_id(machine_id, gpu_id);
        let worker = Worker::register(worker_id.clone(), machine_id, gpu_id);

        let mut conn = self.store.connection().await?;
        let fields = worker_to_fields(&worker);
        let _: () = conn.hset_multiple(worker_key(&worker_id), &fields).await?;
        let _: () = conn.sadd(WORKERS_ALL, &worker_id).await?;
        let _: () = conn.sadd(WORKERS_IDLE, &worker_id).await?;

        info!(worker_id, machine_id, gpu_id, "registered worker");
        Ok(worker)
    }

    pub async fn exists(&self, worker_id: &str) -> StoreResult<bool> {
        self.store.exists(&worker_key(worker_id)).await
    }

    pub async fn get(&self, worker_id: &str) -> StoreResult<Option<Worker>> {
        let map = self.store.hgetall(&worker_key(worker_id)).await?;
        Ok(worker_from_hash(&map))
    }

    /// Refresh a worker's heartbeat. If the worker is unknown, auto-registers
    /// it first — a worker that reconnects after the hub restarted shouldn't
    /// have to call `register` again before it can heartbeat.
    pub async fn heartbeat(
        &self,
        worker_id: &str,
        machine_id: &str,
        gpu_id: &str,
        status: Option<WorkerStatus>,
    ) -> StoreResult<Worker> {
        if !self.exists(worker_id).await? {
            self.register(machine_id, gpu_id).await?;
        }

        let key = worker_key(worker_id);
        let map = self.store.hgetall(&key).await?;
        let mut worker = worker_from_hash(&map).ok_or_else(|| StoreError::WorkerNotFound(worker_id.to_string()))?;
        worker.touch_heartbeat();
        if let Some(status) = status {
            worker.status = status;
        }

        let mut conn = self.store.connection().await?;
        let fields = worker_to_fields(&worker);
        let _: () = conn.hset_multiple(&key, &fields).await?;
        self.sync_idle_set(&mut conn, worker_id, worker.status).await?;

        Ok(worker)
    }

    pub async fn set_status(&self, worker_id: &str, status: WorkerStatus) -> StoreResult<Worker> {
        let key = worker_key(worker_id);
        let map = self.store.hgetall(&key).await?;
        let mut worker = worker_from_hash(&map).ok_or_else(|| StoreError::WorkerNotFound(worker_id.to_string()))?;
        worker.status = status;

        let mut conn = self.store.connection().await?;
        let fields = worker_to_fields(&worker);
        let _: () = conn.hset_multiple(&key, &fields).await?;
        self.sync_idle_set(&mut conn, worker_id, status).await?;
        Ok(worker)
    }

    pub async fn assign_job(&self, worker_id: &str, job_id: &str) -> StoreResult<Worker> {
        let key = worker_key(worker_id);
        let map = self.store.hgetall(&key).await?;
        let mut worker = worker_from_hash(&map).ok_or_else(|| StoreError::WorkerNotFound(worker_id.to_string()))?;
        worker.status = WorkerStatus::Busy;
        worker.current_job = Some(job_id.to_string());

        let mut conn = self.store.connection().await?;
        let fields = worker_to_fields(&worker);
        let _: () = conn.hset_multiple(&key, &fields).await?;
        let _: () = conn.srem(WORKERS_IDLE, worker_id).await?;
        Ok(worker)
    }

    pub async fn release_job(&self, worker_id: &str) -> StoreResult<Worker> {
        let key = worker_key(worker_id);
        let map = self.store.hgetall(&key).await?;
        let mut worker = worker_from_hash(&map).ok_or_else(|| StoreError::WorkerNotFound(worker_id.to_string()))?;
        worker.status = WorkerStatus::Idle;
        worker.current_job = None;

        let mut conn = self.store.connection().await?;
        let _: () = conn.hset_multiple(&key, &worker_to_fields(&worker)).await?;
        let _: () = conn.hdel(&key, "current_job").await?;
        let _: () = conn.sadd(WORKERS_IDLE, worker_id).await?;
        Ok(worker)
    }

    async fn sync_idle_set(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        worker_id: &str,
        status: WorkerStatus,
    ) -> StoreResult<()> {
        if status == WorkerStatus::Idle {
            let _: () = conn.sadd(WORKERS_IDLE, worker_id).await?;
        } else {
            let _: () = conn.srem(WORKERS_IDLE, worker_id).await?;
        }
        Ok(())
    }

    pub async fn all_worker_ids(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.store.connection().await?;
        Ok(conn.smembers(WORKERS_ALL).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_round_trips_through_hash_fields() {
        let worker = Worker::register("m1:0", "m1", "0");
        let fields = worker_to_fields(&worker);
        let map: HashMap<String, String> = fields.into_iter().collect();
        let back = worker_from_hash(&map).unwrap();
        assert_eq!(back.worker_id, "m1:0");
        assert_eq!(back.status, WorkerStatus::Idle);
        assert!(back.current_job.is_none());
    }

    #[test]
    fn missing_hash_yields_none() {
        assert!(worker_from_hash(&HashMap::new()).is_none());
    }
}
