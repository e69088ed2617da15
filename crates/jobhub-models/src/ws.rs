//! WebSocket protocol messages exchanged on the two hub endpoints (§6):
//! client-facing `ClientInbound`/outbound `WsMessage`, and worker-facing
//! `WorkerInbound`/the same outbound `WsMessage` enum.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_priority() -> i64 {
    0
}

fn default_claim_timeout() -> i64 {
    30
}

fn default_true() -> bool {
    true
}

/// Frames a connected client may send. Every variant accepts an optional
/// `timestamp` (seconds since epoch) that the hub ignores on input.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientInbound {
    SubmitJob {
        #[serde(rename = "job_type")]
        job_type: String,
        #[serde(default = "default_priority")]
        priority: i64,
        #[serde(default)]
        payload: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
    GetJobStatus {
        job_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
    SubscribeJob {
        job_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
    SubscribeStats {
        #[serde(default = "default_true")]
        enabled: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
    GetStats {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
}

/// Frames a connected worker may send. Every variant accepts an optional
/// `timestamp` (seconds since epoch) that the hub ignores on input.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerInbound {
    RegisterWorker {
        machine_id: String,
        gpu_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
    WorkerHeartbeat {
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<String>,
        #[serde(default)]
        load: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
    SubscribeJobNotifications {
        #[serde(default = "default_true")]
        enabled: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
    GetNextJob {
        machine_id: String,
        gpu_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
    ClaimJob {
        worker_id: String,
        job_id: String,
        #[serde(default = "default_claim_timeout")]
        claim_timeout: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
    UpdateJobProgress {
        job_id: String,
        machine_id: String,
        gpu_id: String,
        progress: u8,
        #[serde(default = "default_processing_status")]
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
    CompleteJob {
        job_id: String,
        machine_id: String,
        gpu_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
    /// Not present in the original message set; authored by analogy to
    /// `CompleteJob` so a worker has a way to report terminal failure.
    FailJob {
        job_id: String,
        machine_id: String,
        gpu_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
}

fn default_processing_status() -> String {
    "processing".to_string()
}

/// Every outbound frame the hub sends, to either a client or a worker socket.
/// Every variant carries an optional `timestamp` (seconds since epoch).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    ConnectionEstablished {
        #[serde(skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    JobAccepted {
        job_id: String,
        #[serde(default = "default_pending_status")]
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        estimated_start: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        notified_workers: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    JobStatus {
        job_id: String,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        progress: Option<u8>,
        #[serde(skip_serializing_if = "Option::is_none")]
        worker_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        started_at: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        completed_at: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    /// Unsolicited push to a subscribed client as a job's state changes.
    JobUpdate {
        job_id: String,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        priority: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        progress: Option<u8>,
        #[serde(skip_serializing_if = "Option::is_none")]
        eta: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    JobCompleted {
        job_id: String,
        #[serde(default = "default_completed_status")]
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        priority: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    StatsResponse {
        total_jobs: u64,
        pending_jobs: u64,
        claimed_jobs: u64,
        processing_jobs: u64,
        completed_jobs: u64,
        failed_jobs: u64,
        total_workers: u64,
        idle_workers: u64,
        busy_workers: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    WorkerRegistered {
        worker_id: String,
        #[serde(default = "default_active_status")]
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    /// Push-path assignment of a specific claimed job to its worker.
    JobAssigned {
        job_id: String,
        #[serde(rename = "job_type")]
        job_type: String,
        priority: i64,
        params: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    NoJob {
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    JobClaimed {
        job_id: String,
        worker_id: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        job_data: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    /// Broadcast to idle, subscribed workers when a new job is enqueued.
    JobAvailable {
        job_id: String,
        #[serde(rename = "job_type")]
        job_type: String,
        #[serde(default = "default_priority")]
        priority: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        params_summary: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
}

fn default_pending_status() -> String {
    "pending".to_string()
}

fn default_completed_status() -> String {
    "completed".to_string()
}

fn default_active_status() -> String {
    "active".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_job_deserializes_with_default_priority() {
        let raw = r#"{"type":"submit_job","job_type":"render","payload":{"n":1}}"#;
        let msg: ClientInbound = serde_json::from_str(raw).unwrap();
        match msg {
            ClientInbound::SubmitJob { job_type, priority, payload, timestamp } => {
                assert_eq!(job_type, "render");
                assert_eq!(priority, 0);
                assert_eq!(payload, serde_json::json!({"n": 1}));
                assert!(timestamp.is_none());
            }
            _ => panic!("expected SubmitJob"),
        }
    }

    #[test]
    fn claim_job_defaults_timeout_to_30() {
        let raw = r#"{"type":"claim_job","worker_id":"m:0","job_id":"job-1"}"#;
        let msg: WorkerInbound = serde_json::from_str(raw).unwrap();
        match msg {
            WorkerInbound::ClaimJob { claim_timeout, .. } => assert_eq!(claim_timeout, 30),
            _ => panic!("expected ClaimJob"),
        }
    }

    #[test]
    fn fail_job_round_trips() {
        let msg = WorkerInbound::FailJob {
            job_id: "job-1".into(),
            machine_id: "m1".into(),
            gpu_id: "0".into(),
            error: Some("boom".into()),
            timestamp: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"fail_job\""));
        let back: WorkerInbound = serde_json::from_str(&json).unwrap();
        matches!(back, WorkerInbound::FailJob { .. });
    }

    #[test]
    fn job_accepted_defaults_status_to_pending() {
        let msg = WsMessage::JobAccepted {
            job_id: "job-1".into(),
            status: default_pending_status(),
            position: Some(3),
            estimated_start: None,
            notified_workers: Some(2),
            timestamp: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"status\":\"pending\""));
        assert!(json.contains("\"position\":3"));
        assert!(!json.contains("estimated_start"));
    }

    #[test]
    fn no_job_serializes_without_timestamp_when_absent() {
        let json = serde_json::to_string(&WsMessage::NoJob { timestamp: None }).unwrap();
        assert_eq!(json, r#"{"type":"no_job"}"#);
    }
}
