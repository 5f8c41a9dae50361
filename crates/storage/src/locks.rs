//! Named per-project locks.
//!
//! File writes and canonicalization for one project directory are
//! serialized; different projects proceed in parallel.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lock table keyed by project directory.
#[derive(Default)]
pub struct ProjectLocks {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock of `project_dir`, waiting for the current holder.
    pub async fn lock(&self, project_dir: &Path) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(project_dir.to_path_buf())
            .or_default()
            .value()
            .clone();
        mutex.lock_owned().await
    }

    /// Drop entries nobody holds or waits on. Returns the number removed.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before.saturating_sub(self.locks.len())
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
