//! GPU job dispatch hub.
//!
//! This crate provides:
//! - Two long-lived WebSocket endpoints, one for submitting clients and one
//!   for polling/claiming workers ([`ws`], [`dispatch`])
//! - In-process connection and subscription bookkeeping ([`connections`])
//! - Liveness/readiness probes and Prometheus metrics for the HTTP surface
//! - No REST API and no outer gateway concerns (auth, rate limiting, TLS) —
//!   those live in front of this hub, not in it

pub mod config;
pub mod connections;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::HubConfig;
pub use connections::ConnectionManager;
pub use error::{HubError, HubResult};
pub use routes::create_router;
pub use state::HubState;
