//! Handlers for every `ClientInbound` frame (§6, client endpoint).
//!
//! Grounded on `original_source/docker/redis/core/routes.py`'s client message
//! handlers and `redis_service.py`'s job operations they call into.

use jobhub_models::{ClientInbound, WsMessage};
use tracing::warn;

use super::error_message;
use crate::metrics;
use crate::state::HubState;

/// Route one inbound client frame to its handler and produce the reply to
/// send back on the same socket (subscriptions also register side effects
/// on `state.connections` that later deliveries use).
pub async fn handle(state: &HubState, client_id: &str, message: ClientInbound) -> WsMessage {
    match message {
        ClientInbound::SubmitJob { job_type, priority, payload, .. } => {
            submit_job(state, client_id, job_type, priority, payload).await
        }
        ClientInbound::GetJobStatus { job_id, .. } => get_job_status(state, client_id, &job_id).await,
        ClientInbound::SubscribeJob { job_id, .. } => subscribe_job(state, client_id, &job_id).await,
        ClientInbound::SubscribeStats { enabled, .. } => subscribe_stats(state, client_id, enabled).await,
        ClientInbound::GetStats { .. } => get_stats(state).await,
    }
}

async fn submit_job(
    state: &HubState,
    client_id: &str,
    job_type: String,
    priority: i64,
    payload: serde_json::Value,
) -> WsMessage {
    match state.queue.enqueue(job_type.clone(), priority, payload, Some(client_id.to_string())).await {
        Ok((job, position, notified)) => {
            metrics::record_job_enqueued(&job_type);
            WsMessage::JobAccepted {
                job_id: job.id.to_string(),
                status: job.status.as_str().to_string(),
                position: position.map(|p| p.0.max(0) as u64),
                estimated_start: None,
                notified_workers: Some(notified as u32),
                timestamp: None,
            }
        }
        Err(e) => {
            warn!(client_id, error = %e, "submit_job failed");
            error_message(format!("failed to submit job: {e}"))
        }
    }
}

async fn get_job_status(state: &HubState, client_id: &str, job_id: &str) -> WsMessage {
    match state.queue.get_job(job_id).await {
        Ok(Some(job)) => {
            state.connections.subscribe_to_job(job_id, client_id).await;
            job_status_message(&job)
        }
        Ok(None) => error_message(format!("job not found: {job_id}")),
        Err(e) => error_message(format!("failed to look up job: {e}")),
    }
}

async fn subscribe_job(state: &HubState, client_id: &str, job_id: &str) -> WsMessage {
    match state.queue.get_job(job_id).await {
        Ok(Some(job)) => {
            state.connections.subscribe_to_job(job_id, client_id).await;
            job_status_message(&job)
        }
        Ok(None) => error_message(format!("job not found: {job_id}")),
        Err(e) => error_message(format!("failed to subscribe to job: {e}")),
    }
}

async fn subscribe_stats(state: &HubState, client_id: &str, enabled: bool) -> WsMessage {
    if enabled {
        state.connections.subscribe_to_stats(client_id).await;
    } else {
        state.connections.unsubscribe_from_stats(client_id).await;
    }
    get_stats(state).await
}

async fn get_stats(state: &HubState) -> WsMessage {
    match state.stats.snapshot().await {
        Ok(s) => WsMessage::StatsResponse {
            total_jobs: s.total_jobs,
            pending_jobs: s.pending_jobs,
            claimed_jobs: s.claimed_jobs,
            processing_jobs: s.processing_jobs,
            completed_jobs: s.completed_jobs,
            failed_jobs: s.failed_jobs,
            total_workers: s.total_workers,
            idle_workers: s.idle_workers,
            busy_workers: s.busy_workers,
            timestamp: None,
        },
        Err(e) => error_message(format!("failed to compute stats: {e}")),
    }
}

fn job_status_message(job: &jobhub_models::Job) -> WsMessage {
    WsMessage::JobStatus {
        job_id: job.id.to_string(),
        status: job.status.as_str().to_string(),
        progress: Some(job.progress),
        worker_id: job.worker_id.clone(),
        started_at: job.started_at.map(|t| t.to_rfc3339()),
        completed_at: job.completed_at.map(|t| t.to_rfc3339()),
        result: job.result.clone(),
        message: job.message.clone(),
        timestamp: None,
    }
}
