//! WebSocket handlers with backpressure support.
//!
//! Splits each socket, runs a bounded-channel send task so a slow reader
//! can't block the dispatcher, and drives the receive side with
//! `tokio::select!`. The business logic itself comes from [`crate::dispatch`].

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use jobhub_models::{ClientInbound, WorkerInbound, WsMessage};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{info, warn};

use crate::dispatch::{client as client_dispatch, worker as worker_dispatch, error_message};
use crate::metrics;
use crate::state::HubState;

const WS_SEND_BUFFER_SIZE: usize = 32;
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Send a reply, logging (never propagating) a failure. Mirrors the source
/// hub's fire-and-forget `websocket.send_text` error handling.
async fn respond_or_log(tx: &mpsc::Sender<Message>, id: &str, message: &WsMessage) {
    let Ok(json) = serde_json::to_string(message) else {
        warn!(id, "failed to serialize outbound message");
        return;
    };
    match tx.try_send(Message::Text(json.clone())) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            if tx.send(Message::Text(json)).await.is_err() {
                warn!(id, "send buffer full and channel closed, dropping message");
            }
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            warn!(id, "cannot respond: connection already closed");
        }
    }
}

pub async fn ws_client(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<HubState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_client_socket(socket, state, client_id))
}

pub async fn ws_worker(
    ws: WebSocketUpgrade,
    Path(worker_id): Path<String>,
    State(state): State<HubState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_worker_socket(socket, state, worker_id))
}

async fn handle_client_socket(socket: WebSocket, state: HubState, client_id: String) {
    let (ws_sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);

    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    state.connections.connect_client(&client_id, tx.clone()).await;
    metrics::record_ws_connected("client");
    respond_or_log(
        &tx,
        &client_id,
        &WsMessage::ConnectionEstablished { client_id: Some(client_id.clone()), timestamp: None },
    )
    .await;

    let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientInbound>(&text) {
                            Ok(parsed) => {
                                let reply = client_dispatch::handle(&state, &client_id, parsed).await;
                                respond_or_log(&tx, &client_id, &reply).await;
                            }
                            Err(e) => {
                                respond_or_log(&tx, &client_id, &error_message(format!("invalid message: {e}"))).await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(client_id, error = %e, "client socket error");
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if tx.send(Message::Ping(vec![])).await.is_err() {
                    break;
                }
            }
        }
    }

    drop(tx);
    let _ = send_task.await;
    state.connections.disconnect_client(&client_id).await;
    metrics::record_ws_disconnected("client");
    info!(client_id, "client websocket closed");
}

async fn handle_worker_socket(socket: WebSocket, state: HubState, worker_id: String) {
    let (ws_sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);

    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    state.connections.connect_worker(&worker_id, tx.clone()).await;
    metrics::record_ws_connected("worker");
    respond_or_log(
        &tx,
        &worker_id,
        &WsMessage::ConnectionEstablished { client_id: Some(worker_id.clone()), timestamp: None },
    )
    .await;

    let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WorkerInbound>(&text) {
                            Ok(parsed) => {
                                if let Some(reply) = worker_dispatch::handle(&state, &worker_id, parsed).await {
                                    respond_or_log(&tx, &worker_id, &reply).await;
                                }
                            }
                            Err(e) => {
                                respond_or_log(&tx, &worker_id, &error_message(format!("invalid message: {e}"))).await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(worker_id, error = %e, "worker socket error");
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if tx.send(Message::Ping(vec![])).await.is_err() {
                    break;
                }
            }
        }
    }

    drop(tx);
    let _ = send_task.await;
    state.connections.disconnect_worker(&worker_id).await;
    metrics::record_ws_disconnected("worker");
    info!(worker_id, "worker websocket closed");
}
