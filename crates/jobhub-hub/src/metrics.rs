//! Prometheus metrics for the dispatch hub.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics (health/ready/metrics surface only — there's no REST API here)
    pub const HTTP_REQUESTS_TOTAL: &str = "jobhub_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "jobhub_http_request_duration_seconds";

    // WebSocket metrics
    pub const WS_CONNECTIONS_TOTAL: &str = "jobhub_ws_connections_total";
    pub const WS_CONNECTIONS_ACTIVE: &str = "jobhub_ws_connections_active";

    // Queue / worker metrics
    pub const QUEUE_DEPTH: &str = "jobhub_queue_depth";
    pub const WORKERS_ACTIVE: &str = "jobhub_workers_active";
    pub const JOBS_ENQUEUED_TOTAL: &str = "jobhub_jobs_enqueued_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "jobhub_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "jobhub_jobs_failed_total";
    /// Emitted directly from `jobhub_store::ReclamationService`, not through
    /// this module — the sweepers run independently of the hub's own state.
    pub const JOBS_RECLAIMED_TOTAL: &str = "jobhub_jobs_reclaimed_total";

    // Claim outcomes
    pub const CLAIM_ATTEMPTS_TOTAL: &str = "jobhub_claim_attempts_total";
}

/// Record an HTTP request against the health/ready/metrics surface.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_ws_connected(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::WS_CONNECTIONS_TOTAL, &labels).increment(1);
    gauge!(names::WS_CONNECTIONS_ACTIVE, &labels).increment(1.0);
}

pub fn record_ws_disconnected(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    gauge!(names::WS_CONNECTIONS_ACTIVE, &labels).decrement(1.0);
}

pub fn set_queue_depth(queue: &str, depth: u64) {
    let labels = [("queue", queue.to_string())];
    gauge!(names::QUEUE_DEPTH, &labels).set(depth as f64);
}

pub fn set_workers_active(count: u64) {
    gauge!(names::WORKERS_ACTIVE).set(count as f64);
}

pub fn record_job_enqueued(job_type: &str) {
    let labels = [("type", job_type.to_string())];
    counter!(names::JOBS_ENQUEUED_TOTAL, &labels).increment(1);
}

pub fn record_job_completed(job_type: &str) {
    let labels = [("type", job_type.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
}

pub fn record_job_failed(job_type: &str) {
    let labels = [("type", job_type.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_claim_attempt(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::CLAIM_ATTEMPTS_TOTAL, &labels).increment(1);
}

/// Collapse per-connection ids out of WS upgrade paths so they group into one
/// metrics series instead of one per client/worker.
fn sanitize_path(path: &str) -> String {
    if path.starts_with("/ws/client/") {
        return "/ws/client/:id".to_string();
    }
    if path.starts_with("/ws/worker/") {
        return "/ws/worker/:id".to_string();
    }
    path.to_string()
}

/// Metrics middleware for the plain HTTP surface (health/ready/metrics).
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();
    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_path_collapses_ws_ids() {
        assert_eq!(sanitize_path("/ws/client/abc-123"), "/ws/client/:id");
        assert_eq!(sanitize_path("/ws/worker/m1:0"), "/ws/worker/:id");
        assert_eq!(sanitize_path("/ready"), "/ready");
    }
}
