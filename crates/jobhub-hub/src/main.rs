//! Dispatch hub binary.

use std::net::SocketAddr;

use futures_util::StreamExt;
use jobhub_models::WsMessage;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jobhub_hub::{create_router, metrics, HubConfig, HubState};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT").map(|v| v.to_lowercase() == "json").unwrap_or(false);
    let env_filter = EnvFilter::from_default_env().add_directive("jobhub=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry().with(fmt::layer().json()).with(env_filter).init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true).with_thread_ids(false).with_file(false).with_line_number(false))
            .with(env_filter)
            .init();
    }

    info!("Starting jobhub-hub");

    let config = HubConfig::from_env();
    info!(host = %config.host, port = config.port, "hub config loaded");

    let state = match HubState::new(config.clone()).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create application state: {}", e);
            std::process::exit(1);
        }
    };

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics())
    } else {
        None
    };

    spawn_job_update_listener(state.clone());
    spawn_job_notification_listener(state.clone());
    // Dropping these handles doesn't stop the sweepers — they run detached.
    let _sweepers = jobhub_store::ReclamationService::new(
        state.store.clone(),
        state.queue.clone(),
        state.registry.clone(),
        state.notify.clone(),
    )
    .spawn_all();
    spawn_stats_broadcaster(state.clone());

    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse().expect("invalid bind address");
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await.unwrap();

    info!("Server shutdown complete");
}

/// Forward every job update published on the store's pub/sub channel to
/// whichever client socket is locally subscribed to that job.
fn spawn_job_update_listener(state: HubState) {
    tokio::spawn(async move {
        loop {
            match state.notify.subscribe_all_job_updates().await {
                Ok(mut stream) => {
                    while let Some(event) = stream.next().await {
                        let message = if event.status == "completed" || event.status == "failed" {
                            WsMessage::JobCompleted {
                                job_id: event.job_id.clone(),
                                status: event.status,
                                priority: None,
                                position: None,
                                result: event.result,
                                timestamp: Some(event.timestamp),
                            }
                        } else {
                            WsMessage::JobUpdate {
                                job_id: event.job_id.clone(),
                                status: event.status,
                                priority: None,
                                position: None,
                                progress: event.progress,
                                eta: None,
                                message: event.message,
                                timestamp: Some(event.timestamp),
                            }
                        };
                        state.connections.send_job_update(&event.job_id, &message).await;
                    }
                    warn!("job update subscription stream ended, resubscribing");
                }
                Err(e) => {
                    warn!(error = %e, "failed to subscribe to job updates, retrying");
                }
            }
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        }
    });
}

/// Forward newly queued jobs to locally connected, idle, subscribed workers.
fn spawn_job_notification_listener(state: HubState) {
    tokio::spawn(async move {
        loop {
            match state.notify.subscribe_job_notifications().await {
                Ok(mut stream) => {
                    while let Some(event) = stream.next().await {
                        state
                            .connections
                            .notify_idle_workers(&event.job_id, &event.job_type, event.priority, event.params)
                            .await;
                    }
                    warn!("job notification subscription stream ended, resubscribing");
                }
                Err(e) => {
                    warn!(error = %e, "failed to subscribe to job notifications, retrying");
                }
            }
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        }
    });
}

/// Periodically push a stats snapshot to every subscribed client. Backs off
/// to a slower cadence when nobody is listening.
fn spawn_stats_broadcaster(state: HubState) {
    tokio::spawn(async move {
        loop {
            let interval = if state.connections.has_stats_subscribers().await {
                state.config.stats_broadcast_interval
            } else {
                state.config.stats_broadcast_idle_interval
            };
            tokio::time::sleep(interval).await;

            if !state.connections.has_stats_subscribers().await {
                continue;
            }

            match state.stats.snapshot().await {
                Ok(s) => {
                    metrics::set_workers_active(s.total_workers);
                    metrics::set_queue_depth("pending", s.pending_jobs);
                    metrics::set_queue_depth("claimed", s.claimed_jobs);
                    metrics::set_queue_depth("processing", s.processing_jobs);
                    let message = WsMessage::StatsResponse {
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
                    };
                    state.connections.broadcast_stats(&message).await;
                }
                Err(e) => warn!(error = %e, "failed to compute stats snapshot"),
            }
        }
    });
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install CTRL+C handler");
    info!("Received shutdown signal");
}
