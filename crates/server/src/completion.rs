//! Collaborators notified when an upload completes.
//!
//! The reconstruction watcher picks up finished projects; the broker status
//! is only reported through `/status`. Both sit behind traits so tests and
//! deployments can swap them.

use async_trait::async_trait;
use fieldsync_core::config::{BrokerConfig, ReconstructionConfig};
use fieldsync_core::naming::parse_canonical_index;
use fieldsync_storage::{FilesystemBackend, StorageResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::net::TcpStream;
use tracing::{debug, info, instrument};

/// Hand-off point to the reconstruction pipeline.
#[async_trait]
pub trait ReconstructionWatcher: Send + Sync {
    /// Check `directory` for a reconstructable image set and begin processing.
    ///
    /// Returns whether anything was found.
    async fn check_and_process(
        &self,
        task_id: &str,
        project_name: &str,
        directory: &Path,
    ) -> StorageResult<bool>;
}

/// Task marker written for the reconstruction pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMarker {
    pub task_id: String,
    pub project_name: String,
    pub directory: String,
    pub image_count: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Watcher that drops a `<task_id>.json` marker into a watched directory.
pub struct MarkerFileWatcher {
    /// Backend rooted at the watch root; markers never leave it.
    markers: FilesystemBackend,
    /// Backend used to count images in the unified directory.
    uploads: FilesystemBackend,
}

impl MarkerFileWatcher {
    pub async fn new(
        config: &ReconstructionConfig,
        upload_root: impl AsRef<Path>,
    ) -> StorageResult<Self> {
        Ok(Self {
            markers: FilesystemBackend::new(&config.watch_root).await?,
            uploads: FilesystemBackend::new(upload_root).await?,
        })
    }

    pub fn watch_root(&self) -> &Path {
        self.markers.root()
    }
}

#[async_trait]
impl ReconstructionWatcher for MarkerFileWatcher {
    #[instrument(skip(self, directory), fields(directory = %directory.display()))]
    async fn check_and_process(
        &self,
        task_id: &str,
        project_name: &str,
        directory: &Path,
    ) -> StorageResult<bool> {
        let image_count = self
            .uploads
            .list_images(directory)
            .await?
            .iter()
            .filter(|f| parse_canonical_index(&f.name).is_some())
            .count();
        if image_count == 0 {
            debug!("no canonical images, nothing to reconstruct");
            return Ok(false);
        }

        let marker = TaskMarker {
            task_id: task_id.to_string(),
            project_name: project_name.to_string(),
            directory: directory.display().to_string(),
            image_count,
            created_at: OffsetDateTime::now_utc(),
        };
        let body = serde_json::to_vec_pretty(&marker)
            .map_err(|e| fieldsync_core::Error::Serialization(e.to_string()))?;
        let name = fieldsync_core::naming::sanitize_identifier(task_id);
        self.markers
            .write_atomic(&self.markers.root().join(format!("{name}.json")), &body)
            .await?;

        info!(image_count, "reconstruction task queued");
        Ok(true)
    }
}

/// Identity the server uses on the message broker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerIdentity {
    pub host: String,
    pub port: u16,
    pub client_id: String,
}

/// Connectivity of the message broker, as reported by `/status`.
#[async_trait]
pub trait BrokerStatus: Send + Sync {
    async fn is_connected(&self) -> bool;

    fn identity(&self) -> BrokerIdentity;
}

/// Broker status that probes TCP reachability of the configured endpoint.
pub struct TcpProbeBroker {
    identity: BrokerIdentity,
    timeout: Duration,
}

impl TcpProbeBroker {
    pub fn new(config: &BrokerConfig) -> Self {
        Self {
            identity: BrokerIdentity {
                host: config.host.clone(),
                port: config.port,
                client_id: config.client_id.clone(),
            },
            timeout: config.probe_timeout(),
        }
    }
}

#[async_trait]
impl BrokerStatus for TcpProbeBroker {
    async fn is_connected(&self) -> bool {
        let addr = (self.identity.host.as_str(), self.identity.port);
        match tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(error = %e, "broker probe failed");
                false
            }
            Err(_) => {
                debug!("broker probe timed out");
                false
            }
        }
    }

    fn identity(&self) -> BrokerIdentity {
        self.identity.clone()
    }
}
