//! Redis connection handling and key layout for the dispatch hub.
//!
//! Key layout (matches the source hub so operators can inspect state with
//! `redis-cli` using the same names):
//! - `job:{id}` — hash of job fields
//! - `worker:{id}` — hash of worker fields
//! - `job_queue` — list, standard-priority FIFO (`lpush` / `rpop`)
//! - `priority_queue` — sorted set, score = priority (`zadd` / `zrevrange`)
//! - `workers:all`, `workers:idle` — sets of worker ids
//! - `job_updates`, `job_updates:{id}` — pub/sub channels for status events
//! - `job_notifications` — pub/sub channel announcing newly queued jobs

use std::collections::HashMap;

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::warn;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

pub const JOB_QUEUE: &str = "job_queue";
pub const PRIORITY_QUEUE: &str = "priority_queue";
pub const WORKERS_ALL: &str = "workers:all";
pub const WORKERS_IDLE: &str = "workers:idle";
pub const JOB_UPDATES_CHANNEL: &str = "job_updates";
pub const JOB_NOTIFICATIONS_CHANNEL: &str = "job_notifications";

pub fn job_key(job_id: &str) -> String {
    format!("job:{job_id}")
}

pub fn worker_key(worker_id: &str) -> String {
    format!("worker:{worker_id}")
}

pub fn job_updates_channel(job_id: &str) -> String {
    format!("job_updates:{job_id}")
}

/// Thin wrapper around a `redis::Client`. Cheap to clone — every call opens
/// its own multiplexed connection.
#[derive(Clone)]
pub struct Store {
    client: redis::Client,
    config: StoreConfig,
}

impl Store {
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| StoreError::connection_failed(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> StoreResult<Self> {
        Self::new(StoreConfig::from_env())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub async fn connection(&self) -> StoreResult<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    pub async fn pubsub(&self) -> StoreResult<redis::aio::PubSub> {
        Ok(self.client.get_async_pubsub().await?)
    }

    /// Initialize the structures the hub depends on existing, same approach
    /// as the source hub's boot-time `init_redis`: touch each key once so a
    /// brand-new Redis instance has the right types before anything reads them.
    pub async fn init(&self) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        for set_key in [WORKERS_ALL, WORKERS_IDLE] {
            let _: () = conn.sadd(set_key, "__init__").await?;
            let _: () = conn.srem(set_key, "__init__").await?;
        }
        let exists: bool = conn.exists(JOB_QUEUE).await?;
        if !exists {
            let _: () = conn.rpush(JOB_QUEUE, "__init__").await?;
            let _: () = conn.lpop(JOB_QUEUE, None).await?;
        }
        Ok(())
    }

    pub async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.connection().await?;
        Ok(conn.hgetall(key).await?)
    }

    pub async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        Ok(conn.exists(key).await?)
    }

    /// Atomically move a job from `pending` to `claimed` with a `WATCH`/`MULTI`/`EXEC`
    /// transaction: the watch on `job:{id}` fails the transaction if another worker's
    /// claim or the reclamation sweeper touched the job first, so exactly one caller wins.
    pub async fn try_claim_job(
        &self,
        job_id: &str,
        worker_id: &str,
        claim_timeout_secs: i64,
    ) -> StoreResult<bool> {
        let key = job_key(job_id);
        let mut conn = self.connection().await?;

        redis::cmd("WATCH").arg(&key).query_async::<()>(&mut conn).await?;

        let status: Option<String> = conn.hget(&key, "status").await?;
        if status.as_deref() != Some("pending") {
            redis::cmd("UNWATCH").query_async::<()>(&mut conn).await?;
            if status.is_none() {
                return Err(StoreError::JobNotFound(job_id.to_string()));
            }
            return Ok(false);
        }

        let now = chrono::Utc::now().timestamp();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset(&key, "status", "claimed")
            .ignore()
            .hset(&key, "worker", worker_id)
            .ignore()
            .hset(&key, "claimed_at", now)
            .ignore()
            .hset(&key, "claim_timeout", claim_timeout_secs)
            .ignore();

        let result: Option<()> = pipe.query_async(&mut conn).await?;
        match result {
            Some(()) => Ok(true),
            // EXEC returned nil: a concurrent writer invalidated the WATCH.
            None => {
                warn!(job_id, worker_id, "claim lost the race, job changed under WATCH");
                Ok(false)
            }
        }
    }

    /// `SCAN`-based iteration over every key matching `prefix*`. Used by stats
    /// and the sweepers instead of `KEYS`, which blocks the server on a large keyspace.
    pub async fn scan_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.connection().await?;
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(500)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_the_source_hub_layout() {
        assert_eq!(job_key("job-1"), "job:job-1");
        assert_eq!(worker_key("m1:0"), "worker:m1:0");
        assert_eq!(job_updates_channel("job-1"), "job_updates:job-1");
    }
}
