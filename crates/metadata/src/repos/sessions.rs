//! Upload session repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use fieldsync_core::{FileStatus, SessionDefaults, SessionId, UploadSession};
use time::OffsetDateTime;

/// Store of upload sessions keyed by session id.
///
/// Every mutation is atomic per session; different sessions never contend.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Get a session, creating it from `defaults` when it does not exist.
    async fn get_or_create(
        &self,
        id: &SessionId,
        defaults: SessionDefaults,
    ) -> MetadataResult<UploadSession>;

    /// Get a session by id.
    async fn get(&self, id: &SessionId) -> MetadataResult<Option<UploadSession>>;

    /// Latest recorded outcome of `unique_id` in the session.
    async fn file_status(
        &self,
        id: &SessionId,
        unique_id: &str,
    ) -> MetadataResult<Option<FileStatus>>;

    /// Record the outcome of a file, overwriting any earlier outcome.
    async fn record_file_outcome(
        &self,
        id: &SessionId,
        unique_id: &str,
        status: FileStatus,
    ) -> MetadataResult<()>;

    /// Note that a batch arrived. With `restart` the per-file outcomes and
    /// seen batches are cleared first. Returns the updated session.
    async fn note_batch(
        &self,
        id: &SessionId,
        batch_number: u32,
        total_batches: u32,
        restart: bool,
    ) -> MetadataResult<UploadSession>;

    /// Refresh the last activity time.
    async fn touch(&self, id: &SessionId) -> MetadataResult<()>;

    /// Remove sessions idle since before `cutoff`. Returns the count.
    async fn evict_idle(&self, cutoff: OffsetDateTime) -> MetadataResult<usize>;

    async fn len(&self) -> MetadataResult<usize>;
}
