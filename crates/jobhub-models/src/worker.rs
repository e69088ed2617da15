//! Worker registration and liveness tracking (§3, §4.2).

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Worker lifecycle state. `Idle`/`Busy` come from the worker's own reports,
/// `Disconnected`/`OutOfService` are assigned by the reclamation sweepers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    #[default]
    Idle,
    Busy,
    Disconnected,
    OutOfService,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Idle => "idle",
            WorkerStatus::Busy => "busy",
            WorkerStatus::Disconnected => "disconnected",
            WorkerStatus::OutOfService => "out_of_service",
        }
    }

    /// Accepts `"active"` as a synonym for `"busy"` — workers report either.
    pub fn from_str_lossy(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(WorkerStatus::Idle),
            "busy" | "active" => Some(WorkerStatus::Busy),
            "disconnected" => Some(WorkerStatus::Disconnected),
            "out_of_service" => Some(WorkerStatus::OutOfService),
            _ => None,
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered worker (§3). Identity is derived from `machine_id`/`gpu_id`, not
/// assigned by the hub.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Worker {
    pub worker_id: String,
    pub machine_id: String,
    pub gpu_id: String,
    #[serde(default)]
    pub status: WorkerStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_job: Option<String>,
}

impl Worker {
    pub fn register(
        worker_id: impl Into<String>,
        machine_id: impl Into<String>,
        gpu_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            worker_id: worker_id.into(),
            machine_id: machine_id.into(),
            gpu_id: gpu_id.into(),
            status: WorkerStatus::Idle,
            registered_at: now,
            last_heartbeat: now,
            current_job: None,
        }
    }

    /// `worker_id` is always `{machine_id}:{gpu_id}`, matching the source hub's convention.
    pub fn derive_worker_id(machine_id: &str, gpu_id: &str) -> String {
        format!("{machine_id}:{gpu_id}")
    }

    pub fn touch_heartbeat(&mut self) {
        self.last_heartbeat = Utc::now();
    }

    pub fn is_idle_and_fresh(&self, freshness_secs: i64) -> bool {
        self.status == WorkerStatus::Idle
            && (Utc::now() - self.last_heartbeat).num_seconds() <= freshness_secs
    }

    pub fn is_heartbeat_stale(&self, threshold_secs: i64) -> bool {
        (Utc::now() - self.last_heartbeat).num_seconds() > threshold_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_starts_idle_with_no_job() {
        let w = Worker::register("m1:0", "m1", "0");
        assert_eq!(w.status, WorkerStatus::Idle);
        assert!(w.current_job.is_none());
    }

    #[test]
    fn derive_worker_id_matches_source_convention() {
        assert_eq!(Worker::derive_worker_id("m1", "0"), "m1:0");
    }

    #[test]
    fn stale_heartbeat_detection() {
        let mut w = Worker::register("m1:0", "m1", "0");
        assert!(w.is_idle_and_fresh(30));
        w.last_heartbeat = Utc::now() - chrono::Duration::seconds(200);
        assert!(!w.is_idle_and_fresh(30));
        assert!(w.is_heartbeat_stale(120));
    }

    #[test]
    fn status_from_str_accepts_active_as_busy() {
        assert_eq!(WorkerStatus::from_str_lossy("active"), Some(WorkerStatus::Busy));
    }
}
