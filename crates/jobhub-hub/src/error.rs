//! Hub error types. Only used on the HTTP-facing health/ready surface —
//! WebSocket handlers never propagate a `Result` across the socket boundary,
//! they turn errors into `error` frames instead (see `dispatch`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type HubResult<T> = Result<T, HubError>;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("store error: {0}")]
    Store(#[from] jobhub_store::StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = match &self {
            HubError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            HubError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorResponse { detail: self.to_string() })).into_response()
    }
}
