//! Shared state stores for fieldsync.
//!
//! This crate provides:
//! - The content hash index used for cross-session deduplication
//! - The upload session store tracking per-file outcomes across batches
//!
//! Both are traits so the server takes them as injected `Arc<dyn ..>`
//! values; the in-memory implementations use `DashMap`.

pub mod error;
pub mod memory;
pub mod repos;

pub use error::{MetadataError, MetadataResult};
pub use memory::{MemoryHashIndex, MemorySessionStore};
pub use repos::{HashIndex, SessionStore};
