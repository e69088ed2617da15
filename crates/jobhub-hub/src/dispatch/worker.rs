//! Handlers for every `WorkerInbound` frame (§6, worker endpoint).
//!
//! Grounded on `original_source/docker/redis/core/routes.py`'s worker message
//! handlers and `redis_service.py`'s job/worker operations they call into.

use jobhub_models::{Worker, WorkerInbound, WorkerStatus, WsMessage};
use tracing::warn;

use super::error_message;
use crate::metrics;
use crate::state::HubState;

/// Route one inbound worker frame to its handler. `worker_id` is the id the
/// socket was opened under (`{machine_id}:{gpu_id}`, derived at upgrade time).
/// Returns `None` when the protocol calls for no direct reply — terminal-state
/// and progress frames propagate to subscribed clients via the notification
/// bus instead of echoing back to the worker that sent them.
pub async fn handle(state: &HubState, worker_id: &str, message: WorkerInbound) -> Option<WsMessage> {
    match message {
        WorkerInbound::RegisterWorker { machine_id, gpu_id, .. } => {
            Some(register_worker(state, &machine_id, &gpu_id).await)
        }
        WorkerInbound::WorkerHeartbeat { status, .. } => {
            heartbeat(state, worker_id, status).await;
            None
        }
        WorkerInbound::SubscribeJobNotifications { enabled, .. } => {
            state.connections.subscribe_worker_to_job_notifications(worker_id, enabled).await;
            None
        }
        WorkerInbound::GetNextJob { machine_id, gpu_id, .. } => {
            Some(get_next_job(state, &machine_id, &gpu_id).await)
        }
        WorkerInbound::ClaimJob { worker_id: claimant, job_id, claim_timeout, .. } => {
            Some(claim_job(state, &claimant, &job_id, claim_timeout).await)
        }
        WorkerInbound::UpdateJobProgress { job_id, machine_id, gpu_id, progress, message: msg, .. } => {
            update_progress(state, &job_id, &machine_id, &gpu_id, progress, msg).await;
            None
        }
        WorkerInbound::CompleteJob { job_id, machine_id, gpu_id, result, .. } => {
            complete_job(state, &job_id, &machine_id, &gpu_id, result).await;
            None
        }
        WorkerInbound::FailJob { job_id, machine_id, gpu_id, error, .. } => {
            fail_job(state, &job_id, &machine_id, &gpu_id, error).await;
            None
        }
    }
}

async fn register_worker(state: &HubState, machine_id: &str, gpu_id: &str) -> WsMessage {
    match state.registry.register(machine_id, gpu_id).await {
        Ok(worker) => {
            state.connections.worker_snapshot(&worker).await;
            WsMessage::WorkerRegistered {
                worker_id: worker.worker_id,
                status: worker.status.as_str().to_string(),
                timestamp: None,
            }
        }
        Err(e) => {
            warn!(machine_id, gpu_id, error = %e, "register_worker failed");
            error_message(format!("failed to register worker: {e}"))
        }
    }
}

async fn heartbeat(state: &HubState, worker_id: &str, status: Option<String>) {
    let (machine_id, gpu_id) = split_worker_id(worker_id);
    let status = status.as_deref().and_then(WorkerStatus::from_str_lossy);
    match state.registry.heartbeat(worker_id, machine_id, gpu_id, status).await {
        Ok(worker) => state.connections.worker_snapshot(&worker).await,
        Err(e) => warn!(worker_id, error = %e, "heartbeat failed"),
    }
}

async fn get_next_job(state: &HubState, machine_id: &str, gpu_id: &str) -> WsMessage {
    let worker_id = Worker::derive_worker_id(machine_id, gpu_id);
    match state.queue.get_next_job(&worker_id).await {
        Ok(Some(job)) => {
            if let Err(e) = state.registry.assign_job(&worker_id, job.id.as_str()).await {
                warn!(worker_id, error = %e, "failed to mark worker busy after dequeue");
            } else {
                state.connections.set_worker_status_local(&worker_id, WorkerStatus::Busy).await;
            }
            WsMessage::JobAssigned {
                job_id: job.id.to_string(),
                job_type: job.job_type,
                priority: job.priority,
                params: job.params,
                timestamp: None,
            }
        }
        Ok(None) => WsMessage::NoJob { timestamp: None },
        Err(e) => {
            warn!(worker_id, error = %e, "get_next_job failed");
            error_message(format!("failed to fetch next job: {e}"))
        }
    }
}

async fn claim_job(state: &HubState, worker_id: &str, job_id: &str, claim_timeout: i64) -> WsMessage {
    match state.queue.claim_job(job_id, worker_id, claim_timeout).await {
        Ok(Some(job)) => {
            metrics::record_claim_attempt("claimed");
            if let Err(e) = state.registry.assign_job(worker_id, job_id).await {
                warn!(worker_id, job_id, error = %e, "failed to mark worker busy after claim");
            } else {
                state.connections.set_worker_status_local(worker_id, WorkerStatus::Busy).await;
            }
            WsMessage::JobClaimed {
                job_id: job.id.to_string(),
                worker_id: worker_id.to_string(),
                success: true,
                job_data: serde_json::to_value(&job).ok(),
                message: None,
                timestamp: None,
            }
        }
        Ok(None) => {
            metrics::record_claim_attempt("already_claimed");
            WsMessage::JobClaimed {
                job_id: job_id.to_string(),
                worker_id: worker_id.to_string(),
                success: false,
                job_data: None,
                message: Some("job already claimed or no longer pending".to_string()),
                timestamp: None,
            }
        }
        Err(e) => {
            metrics::record_claim_attempt("error");
            warn!(worker_id, job_id, error = %e, "claim_job failed");
            error_message(format!("failed to claim job: {e}"))
        }
    }
}

async fn update_progress(
    state: &HubState,
    job_id: &str,
    machine_id: &str,
    gpu_id: &str,
    progress: u8,
    message: Option<String>,
) {
    let worker_id = Worker::derive_worker_id(machine_id, gpu_id);
    if let Err(e) = state.queue.update_job_progress(job_id, &worker_id, progress, message).await {
        warn!(worker_id, job_id, error = %e, "update_job_progress failed");
    }
}

async fn complete_job(
    state: &HubState,
    job_id: &str,
    machine_id: &str,
    gpu_id: &str,
    result: Option<serde_json::Value>,
) {
    let worker_id = Worker::derive_worker_id(machine_id, gpu_id);
    let job = match state.queue.complete_job(job_id, &worker_id, result).await {
        Ok(job) => job,
        Err(e) => {
            warn!(worker_id, job_id, error = %e, "complete_job failed");
            return;
        }
    };
    metrics::record_job_completed(&job.job_type);
    if let Err(e) = state.registry.release_job(&worker_id).await {
        warn!(worker_id, error = %e, "failed to release worker after job completion");
    } else {
        state.connections.set_worker_status_local(&worker_id, WorkerStatus::Idle).await;
    }
}

async fn fail_job(state: &HubState, job_id: &str, machine_id: &str, gpu_id: &str, error: Option<String>) {
    let worker_id = Worker::derive_worker_id(machine_id, gpu_id);
    let job = match state.queue.fail_job(job_id, &worker_id, error).await {
        Ok(job) => job,
        Err(e) => {
            warn!(worker_id, job_id, error = %e, "fail_job failed");
            return;
        }
    };
    metrics::record_job_failed(&job.job_type);
    if let Err(e) = state.registry.release_job(&worker_id).await {
        warn!(worker_id, error = %e, "failed to release worker after job failure");
    } else {
        state.connections.set_worker_status_local(&worker_id, WorkerStatus::Idle).await;
    }
}

fn split_worker_id(worker_id: &str) -> (&str, &str) {
    worker_id.split_once(':').unwrap_or((worker_id, ""))
}
