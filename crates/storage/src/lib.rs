//! Filesystem storage for fieldsync.
//!
//! This crate provides:
//! - The per-project directory layout with path-traversal protection
//! - Atomic file writes (temp file, fsync, rename)
//! - Named locks serializing writes to one project
//! - The canonicalization pass that numbers a project's unified image set

pub mod canonical;
pub mod error;
pub mod filesystem;
pub mod layout;
pub mod locks;

pub use canonical::{CanonicalOutcome, Canonicalizer};
pub use error::{StorageError, StorageResult};
pub use filesystem::{FileEntry, FilesystemBackend};
pub use layout::ProjectLayout;
pub use locks::ProjectLocks;

use fieldsync_core::config::StorageConfig;

/// Create the filesystem backend from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<FilesystemBackend> {
    if config.root.as_os_str().is_empty() {
        return Err(StorageError::Config("storage.root must not be empty".to_string()));
    }
    FilesystemBackend::new(&config.root).await
}
