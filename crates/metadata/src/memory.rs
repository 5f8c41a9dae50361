//! In-memory stores backed by `DashMap`.
//!
//! State lives for the lifetime of the process. Per-key atomicity comes from
//! DashMap's entry API, which holds the shard lock for the duration of each
//! update.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{HashIndex, SessionStore};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fieldsync_core::{ContentHash, FileStatus, SessionDefaults, SessionId, UploadSession};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::debug;

/// Hash index held in memory.
#[derive(Default)]
pub struct MemoryHashIndex {
    entries: DashMap<ContentHash, PathBuf>,
}

impl MemoryHashIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HashIndex for MemoryHashIndex {
    async fn lookup(&self, digest: &ContentHash) -> MetadataResult<Option<PathBuf>> {
        Ok(self.entries.get(digest).map(|e| e.value().clone()))
    }

    async fn record(&self, digest: ContentHash, path: PathBuf) -> MetadataResult<bool> {
        match self.entries.entry(digest) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(path);
                Ok(true)
            }
        }
    }

    async fn forget(&self, digest: &ContentHash, path: &Path) -> MetadataResult<bool> {
        Ok(self
            .entries
            .remove_if(digest, |_, stored| stored == path)
            .is_some())
    }

    async fn forget_under(&self, dir: &Path) -> MetadataResult<usize> {
        let before = self.entries.len();
        self.entries.retain(|_, path| !path.starts_with(dir));
        let removed = before.saturating_sub(self.entries.len());
        debug!(dir = %dir.display(), removed, "forgot hash index entries");
        Ok(removed)
    }

    async fn entries(&self) -> MetadataResult<Vec<(ContentHash, PathBuf)>> {
        Ok(self
            .entries
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect())
    }

    async fn len(&self) -> MetadataResult<usize> {
        Ok(self.entries.len())
    }
}

/// Session store held in memory.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<SessionId, UploadSession>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn missing(id: &SessionId) -> MetadataError {
        MetadataError::NotFound(format!("session {id}"))
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get_or_create(
        &self,
        id: &SessionId,
        defaults: SessionDefaults,
    ) -> MetadataResult<UploadSession> {
        let session = self
            .sessions
            .entry(id.clone())
            .or_insert_with(|| UploadSession::new(id.clone(), defaults));
        Ok(session.value().clone())
    }

    async fn get(&self, id: &SessionId) -> MetadataResult<Option<UploadSession>> {
        Ok(self.sessions.get(id).map(|s| s.value().clone()))
    }

    async fn file_status(
        &self,
        id: &SessionId,
        unique_id: &str,
    ) -> MetadataResult<Option<FileStatus>> {
        Ok(self
            .sessions
            .get(id)
            .and_then(|s| s.files.get(unique_id).cloned()))
    }

    async fn record_file_outcome(
        &self,
        id: &SessionId,
        unique_id: &str,
        status: FileStatus,
    ) -> MetadataResult<()> {
        let mut session = self.sessions.get_mut(id).ok_or_else(|| Self::missing(id))?;
        session.record(unique_id, status);
        Ok(())
    }

    async fn note_batch(
        &self,
        id: &SessionId,
        batch_number: u32,
        total_batches: u32,
        restart: bool,
    ) -> MetadataResult<UploadSession> {
        let mut session = self.sessions.get_mut(id).ok_or_else(|| Self::missing(id))?;
        if restart {
            session.restart();
        }
        session.note_batch(batch_number, total_batches);
        Ok(session.value().clone())
    }

    async fn touch(&self, id: &SessionId) -> MetadataResult<()> {
        let mut session = self.sessions.get_mut(id).ok_or_else(|| Self::missing(id))?;
        session.touch();
        Ok(())
    }

    async fn evict_idle(&self, cutoff: OffsetDateTime) -> MetadataResult<usize> {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_idle_since(cutoff));
        Ok(before.saturating_sub(self.sessions.len()))
    }

    async fn len(&self) -> MetadataResult<usize> {
        Ok(self.sessions.len())
    }
}
