//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum size of one batch request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Maximum number of file parts in one batch.
    #[serde(default = "default_max_files_per_batch")]
    pub max_files_per_batch: usize,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Fully decode every image before accepting it (default: true).
    /// When false only the extension and a non-empty body are checked.
    #[serde(default = "default_verify_image_decode")]
    pub verify_image_decode: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_body_bytes() -> usize {
    512 * 1024 * 1024
}

fn default_max_files_per_batch() -> usize {
    500
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_verify_image_decode() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
            max_files_per_batch: default_max_files_per_batch(),
            metrics_enabled: default_metrics_enabled(),
            verify_image_decode: default_verify_image_decode(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_body_bytes == 0 {
            return Err("server.max_body_bytes must be greater than 0".to_string());
        }
        if self.max_files_per_batch == 0 {
            return Err("server.max_files_per_batch must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Upload storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the `<type>/<value>/<project>` tree.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/uploads")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

/// Canonicalization configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CanonicalConfig {
    /// First canonical index. Indices below it are never assigned.
    #[serde(default = "default_start_index")]
    pub start_index: u64,
    /// Text manifest file name, written in the project directory.
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
    /// Grouped JSON manifest file name, written next to the text manifest.
    #[serde(default = "default_grouped_manifest_file")]
    pub grouped_manifest_file: String,
}

fn default_start_index() -> u64 {
    crate::DEFAULT_CANONICAL_START_INDEX
}

fn default_manifest_file() -> String {
    "image_list.txt".to_string()
}

fn default_grouped_manifest_file() -> String {
    "image_groups.json".to_string()
}

impl Default for CanonicalConfig {
    fn default() -> Self {
        Self {
            start_index: default_start_index(),
            manifest_file: default_manifest_file(),
            grouped_manifest_file: default_grouped_manifest_file(),
        }
    }
}

impl CanonicalConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (field, name) in [
            ("manifest_file", &self.manifest_file),
            ("grouped_manifest_file", &self.grouped_manifest_file),
        ] {
            crate::naming::validate_component(name)
                .map_err(|e| format!("canonical.{field}: {e}"))?;
            if crate::naming::is_accepted_image(name) {
                return Err(format!(
                    "canonical.{field} must not use an image extension: {name}"
                ));
            }
        }
        if self.manifest_file == self.grouped_manifest_file {
            return Err("canonical manifest file names must differ".to_string());
        }
        Ok(())
    }
}

/// Session retention configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle time after which a session is evicted, in seconds.
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,
    /// Interval between eviction sweeps, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_session_ttl_secs() -> u64 {
    86400 // 24 hours
}

fn default_sweep_interval_secs() -> u64 {
    600
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl SessionConfig {
    /// Session idle timeout as a Duration.
    pub fn ttl(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    /// Sweep interval, never zero.
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Reconstruction hand-off configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    /// Directory the reconstruction watcher polls for task markers.
    #[serde(default = "default_watch_root")]
    pub watch_root: PathBuf,
    /// Hand completed uploads to the watcher (default: true).
    #[serde(default = "default_reconstruction_enabled")]
    pub enabled: bool,
}

fn default_watch_root() -> PathBuf {
    PathBuf::from("./data/reconstruction")
}

fn default_reconstruction_enabled() -> bool {
    true
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            watch_root: default_watch_root(),
            enabled: default_reconstruction_enabled(),
        }
    }
}

/// Message broker whose connectivity is reported by `/status`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_host")]
    pub host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    #[serde(default = "default_broker_client_id")]
    pub client_id: String,
    /// Connect timeout of the reachability probe, in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_broker_host() -> String {
    "127.0.0.1".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_broker_client_id() -> String {
    "fieldsync-server".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    500
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            client_id: default_broker_client_id(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl BrokerConfig {
    pub fn probe_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Top-level application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub canonical: CanonicalConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub reconstruction: ReconstructionConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
}

impl AppConfig {
    /// Create a test configuration rooted under `root`.
    ///
    /// **For testing only.**
    pub fn for_testing(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            storage: StorageConfig {
                root: root.join("uploads"),
            },
            reconstruction: ReconstructionConfig {
                watch_root: root.join("reconstruction"),
                enabled: true,
            },
            ..Default::default()
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.canonical.validate()?;
        Ok(())
    }
}
