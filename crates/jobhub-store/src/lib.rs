//! Redis-backed job queue, worker registry and notification bus for the
//! dispatch hub.
//!
//! This crate provides:
//! - Job lifecycle operations against a flat Redis-hash representation
//!   ([`queue_manager`])
//! - Worker registration and heartbeat tracking ([`registry`])
//! - Pub/sub notification of job status changes and newly queued work
//!   ([`notify`])
//! - Background reclamation of work abandoned by dead workers ([`reclaim`])
//! - Full-keyspace stats aggregation ([`stats`])

pub mod client;
pub mod config;
pub mod error;
pub mod notify;
pub mod queue_manager;
pub mod reclaim;
pub mod registry;
pub mod stats;

pub use client::Store;
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use notify::{JobAvailableEvent, JobUpdateEvent, NotificationBus};
pub use queue_manager::{JobQueueManager, QueuePosition};
pub use reclaim::ReclamationService;
pub use registry::WorkerRegistry;
pub use stats::{StatsCollector, StatsSnapshot};
