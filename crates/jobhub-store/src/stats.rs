//! Aggregate counts across every job and worker, computed by a full `SCAN`
//! pass. Grounded on `redis_service.py::get_queue_stats`.

use crate::client::Store;
use crate::error::StoreResult;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSnapshot {
    pub total_jobs: u64,
    pub pending_jobs: u64,
    pub claimed_jobs: u64,
    pub processing_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub total_workers: u64,
    pub idle_workers: u64,
    pub busy_workers: u64,
}

#[derive(Clone)]
pub struct StatsCollector {
    store: Store,
}

impl StatsCollector {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn snapshot(&self) -> StoreResult<StatsSnapshot> {
        let mut snapshot = StatsSnapshot::default();

        for key in self.store.scan_keys("job:").await? {
            let map = self.store.hgetall(&key).await?;
            let Some(status) = map.get("status") else { continue };
            snapshot.total_jobs += 1;
            match status.as_str() {
                "pending" => snapshot.pending_jobs += 1,
                "claimed" => snapshot.claimed_jobs += 1,
                "processing" => snapshot.processing_jobs += 1,
                "completed" => snapshot.completed_jobs += 1,
                "failed" => snapshot.failed_jobs += 1,
                _ => {}
            }
        }

        for key in self.store.scan_keys("worker:").await? {
            let map = self.store.hgetall(&key).await?;
            let Some(status) = map.get("status") else { continue };
            snapshot.total_workers += 1;
            match status.as_str() {
                "idle" => snapshot.idle_workers += 1,
                "busy" => snapshot.busy_workers += 1,
                _ => {}
            }
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_defaults_to_all_zero() {
        let snapshot = StatsSnapshot::default();
        assert_eq!(snapshot.total_jobs, 0);
        assert_eq!(snapshot.total_workers, 0);
    }
}
