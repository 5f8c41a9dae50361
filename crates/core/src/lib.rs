//! Core domain types for the fieldsync upload reconciliation engine.
//!
//! This crate defines the data model shared by the other crates:
//! - Content digests for deduplication
//! - Project / vehicle / track classification of photos
//! - Upload sessions and per-file outcomes
//! - The canonical image manifest
//! - Batch request and response types
//! - Configuration

pub mod config;
pub mod error;
pub mod hash;
pub mod hierarchy;
pub mod manifest;
pub mod naming;
pub mod session;
pub mod upload;

pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher};
pub use hierarchy::{Classification, FileMeta, Hierarchy, Placement, classify};
pub use manifest::{GroupedManifest, Manifest, ManifestEntry};
pub use session::{FileOutcome, FileStatus, SessionDefaults, SessionId, UploadSession};
pub use upload::{BatchHeader, ProjectDescription, UploadResponse};

/// First canonical index; indices 1 to 10 stay reserved.
pub const DEFAULT_CANONICAL_START_INDEX: u64 = 11;
