//! HTTP upload server for fieldsync.
//!
//! This crate provides:
//! - The multi-batch `POST /upload` endpoint and its ingest pipeline
//! - Session status, directory preflight, server status and health endpoints
//! - The completion signal and its collaborators (reconstruction watcher,
//!   broker status)
//! - Background eviction of idle sessions and stale hash index entries
//! - Prometheus metrics

pub mod completion;
pub mod error;
pub mod form;
pub mod handlers;
pub mod ingest;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod sweep;

pub use completion::{BrokerStatus, MarkerFileWatcher, ReconstructionWatcher, TcpProbeBroker};
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
