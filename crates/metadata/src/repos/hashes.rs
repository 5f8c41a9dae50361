//! Content hash index repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use fieldsync_core::ContentHash;
use std::path::{Path, PathBuf};

/// Map from content digest to the first stored copy of those bytes.
#[async_trait]
pub trait HashIndex: Send + Sync {
    /// Path of the stored copy of `digest`, if any.
    async fn lookup(&self, digest: &ContentHash) -> MetadataResult<Option<PathBuf>>;

    /// Record `path` for `digest` unless an entry exists.
    ///
    /// Returns `true` when this call inserted the entry. Concurrent callers
    /// racing on the same digest see exactly one `true`.
    async fn record(&self, digest: ContentHash, path: PathBuf) -> MetadataResult<bool>;

    /// Remove the entry for `digest` if it still points at `path`.
    async fn forget(&self, digest: &ContentHash, path: &Path) -> MetadataResult<bool>;

    /// Remove every entry whose path lies under `dir`. Returns the count.
    async fn forget_under(&self, dir: &Path) -> MetadataResult<usize>;

    /// Snapshot of all entries.
    async fn entries(&self) -> MetadataResult<Vec<(ContentHash, PathBuf)>>;

    async fn len(&self) -> MetadataResult<usize>;
}
