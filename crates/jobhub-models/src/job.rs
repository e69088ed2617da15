//! Job definitions for the dispatch hub.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job id in the `job-{uuid}` shape used by the source hub.
    pub fn new() -> Self {
        Self(format!("job-{}", Uuid::new_v4()))
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job status in the lifecycle (§4.8): `pending -> claimed -> processing -> completed|failed`,
/// with reclamation edges `claimed -> pending` and `processing -> pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in a queue, unclaimed.
    #[default]
    Pending,
    /// Reserved by a worker via `claim_job`, not yet executing.
    Claimed,
    /// A worker is actively executing the job.
    Processing,
    /// Terminal: finished successfully.
    Completed,
    /// Terminal: finished with an error.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Claimed => "claimed",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn from_str_lossy(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "claimed" => Some(JobStatus::Claimed),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A job tracked by the hub (§3).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub id: JobId,

    /// Caller-supplied job type, opaque to the hub.
    #[serde(rename = "type")]
    pub job_type: String,

    /// 0 = standard (FIFO list); > 0 routes to the priority ordered set.
    #[serde(default)]
    pub priority: i64,

    /// Opaque payload handed to the worker unchanged.
    #[serde(default)]
    pub params: Value,

    /// The submitting client, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default)]
    pub status: JobStatus,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,

    /// Seconds the claim is valid for before the reclamation sweeper reverts it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_timeout: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,

    #[serde(default)]
    pub progress: u8,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    /// The only constructor; every other field is set by the transition methods below as
    /// the job moves through its lifecycle.
    pub fn new(job_type: impl Into<String>, priority: i64, params: Value, client_id: Option<String>) -> Self {
        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            priority,
            params,
            client_id,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            claimed_at: None,
            claim_timeout: None,
            completed_at: None,
            worker_id: None,
            progress: 0,
            message: None,
            result: None,
            error: None,
        }
    }

    /// Standard-priority jobs (priority = 0) always route to the FIFO list.
    pub fn is_priority(&self) -> bool {
        self.priority > 0
    }

    /// Legacy pull-path dequeue: assign directly to `processing`.
    pub fn dequeued_by(mut self, worker_id: impl Into<String>) -> Self {
        self.status = JobStatus::Processing;
        self.worker_id = Some(worker_id.into());
        self.started_at = Some(Utc::now());
        self
    }

    /// Push-path claim: reserve the job without starting execution yet.
    pub fn claimed_by(mut self, worker_id: impl Into<String>, claim_timeout_secs: i64) -> Self {
        self.status = JobStatus::Claimed;
        self.worker_id = Some(worker_id.into());
        self.claimed_at = Some(Utc::now());
        self.claim_timeout = Some(claim_timeout_secs);
        self
    }

    pub fn with_progress(mut self, progress: u8, message: Option<String>) -> Self {
        self.progress = progress.min(100);
        if message.is_some() {
            self.message = message;
        }
        if self.status == JobStatus::Claimed {
            self.status = JobStatus::Processing;
            self.started_at.get_or_insert(Utc::now());
        }
        self
    }

    pub fn complete(mut self, result: Option<Value>) -> Self {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.progress = 100;
        self.result = result;
        self
    }

    pub fn fail(mut self, error: Option<String>) -> Self {
        self.status = JobStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = error;
        self
    }

    /// Reclamation edge: `claimed -> pending` (claim-timeout) or `processing -> pending`
    /// (worker heartbeat timeout). Clears the assignment, preserves priority and params.
    pub fn revert_to_pending(mut self) -> Self {
        self.status = JobStatus::Pending;
        self.worker_id = None;
        self.claimed_at = None;
        self.claim_timeout = None;
        self.started_at = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_pending_with_no_worker() {
        let job = Job::new("test", 0, serde_json::json!({"n": 1}), Some("c1".into()));
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.worker_id.is_none());
        assert!(!job.is_priority());
    }

    #[test]
    fn claim_then_progress_transitions_to_processing() {
        let job = Job::new("test", 5, Value::Null, None);
        assert!(job.is_priority());
        let claimed = job.claimed_by("m:0", 30);
        assert_eq!(claimed.status, JobStatus::Claimed);
        let processing = claimed.with_progress(50, Some("halfway".into()));
        assert_eq!(processing.status, JobStatus::Processing);
        assert_eq!(processing.progress, 50);
    }

    #[test]
    fn progress_clamps_to_100() {
        let job = Job::new("test", 0, Value::Null, None).claimed_by("m:0", 30);
        let done = job.with_progress(255, None);
        assert_eq!(done.progress, 100);
    }

    #[test]
    fn complete_sets_terminal_state() {
        let job = Job::new("test", 0, Value::Null, None)
            .claimed_by("m:0", 30)
            .complete(Some(serde_json::json!({"ok": true})));
        assert!(job.status.is_terminal());
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn revert_clears_assignment_but_keeps_priority() {
        let job = Job::new("test", 7, Value::Null, None).claimed_by("m:0", 30);
        let reverted = job.revert_to_pending();
        assert_eq!(reverted.status, JobStatus::Pending);
        assert!(reverted.worker_id.is_none());
        assert_eq!(reverted.priority, 7);
    }
}
