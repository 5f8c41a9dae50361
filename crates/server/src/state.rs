//! Application state shared across handlers.

use crate::completion::{BrokerStatus, MarkerFileWatcher, ReconstructionWatcher, TcpProbeBroker};
use fieldsync_core::config::AppConfig;
use fieldsync_metadata::{HashIndex, MemoryHashIndex, MemorySessionStore, SessionStore};
use fieldsync_storage::{FilesystemBackend, ProjectLocks, StorageResult};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Upload tree backend.
    pub storage: Arc<FilesystemBackend>,
    /// Digest to stored path, for content deduplication.
    pub hash_index: Arc<dyn HashIndex>,
    /// Per-session file outcomes.
    pub sessions: Arc<dyn SessionStore>,
    /// Per-project write and canonicalization locks.
    pub locks: Arc<ProjectLocks>,
    /// Reconstruction hand-off for completed uploads.
    pub watcher: Arc<dyn ReconstructionWatcher>,
    /// Broker connectivity reported by `/status`.
    pub broker: Arc<dyn BrokerStatus>,
}

impl AppState {
    /// Create a new application state from its parts.
    pub fn new(
        config: AppConfig,
        storage: FilesystemBackend,
        hash_index: Arc<dyn HashIndex>,
        sessions: Arc<dyn SessionStore>,
        watcher: Arc<dyn ReconstructionWatcher>,
        broker: Arc<dyn BrokerStatus>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            storage: Arc::new(storage),
            hash_index,
            sessions,
            locks: Arc::new(ProjectLocks::new()),
            watcher,
            broker,
        }
    }

    /// State with in-memory stores, the marker-file watcher and the TCP
    /// broker probe.
    pub async fn with_defaults(config: AppConfig, storage: FilesystemBackend) -> StorageResult<Self> {
        let watcher = MarkerFileWatcher::new(&config.reconstruction, storage.root()).await?;
        let broker = TcpProbeBroker::new(&config.broker);
        Ok(Self::new(
            config,
            storage,
            Arc::new(MemoryHashIndex::new()),
            Arc::new(MemorySessionStore::new()),
            Arc::new(watcher),
            Arc::new(broker),
        ))
    }
}
