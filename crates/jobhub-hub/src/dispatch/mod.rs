//! Protocol dispatch: turn a parsed inbound frame into store operations and
//! an outbound reply. Grounded on `original_source/docker/redis/core/routes.py`'s
//! `handle_*` functions — the hub here, too, never lets a handler's `Result`
//! reach the socket directly (see [`crate::ws`]'s `respond_or_log`).

pub mod client;
pub mod worker;

pub(crate) fn error_message(msg: impl Into<String>) -> jobhub_models::WsMessage {
    jobhub_models::WsMessage::Error {
        error: msg.into(),
        details: None,
        timestamp: None,
    }
}
