//! Shared data models for the job dispatch hub.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs and their lifecycle state (job.rs)
//! - Worker registration and liveness (worker.rs)
//! - The WebSocket wire protocol used on both hub endpoints (ws.rs)

pub mod job;
pub mod worker;
pub mod ws;

pub use job::{Job, JobId, JobStatus};
pub use worker::{Worker, WorkerStatus};
pub use ws::{ClientInbound, WorkerInbound, WsMessage};
