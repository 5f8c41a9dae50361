//! Server test utilities.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use fieldsync_core::config::AppConfig;
use fieldsync_metadata::{MemoryHashIndex, MemorySessionStore};
use fieldsync_server::completion::{BrokerIdentity, BrokerStatus, MarkerFileWatcher};
use fieldsync_server::{AppState, create_router};
use fieldsync_storage::FilesystemBackend;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Broker status with a fixed answer.
pub struct StaticBroker {
    pub connected: bool,
}

#[async_trait]
impl BrokerStatus for StaticBroker {
    async fn is_connected(&self) -> bool {
        self.connected
    }

    fn identity(&self) -> BrokerIdentity {
        BrokerIdentity {
            host: "broker.test".to_string(),
            port: 1883,
            client_id: "fieldsync-test".to_string(),
        }
    }
}

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server after adjusting the default test config.
    pub async fn with_config(modify: impl FnOnce(&mut AppConfig)) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let mut config = AppConfig::for_testing(temp_dir.path());
        modify(&mut config);

        fieldsync_server::metrics::register_metrics();

        let storage = FilesystemBackend::new(&config.storage.root)
            .await
            .expect("Failed to create storage backend");
        let watcher = MarkerFileWatcher::new(&config.reconstruction, storage.root())
            .await
            .expect("Failed to create reconstruction watcher");

        let state = AppState::new(
            config,
            storage,
            Arc::new(MemoryHashIndex::new()),
            Arc::new(MemorySessionStore::new()),
            Arc::new(watcher),
            Arc::new(StaticBroker { connected: true }),
        );
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Directory of the project `site/42/<project>`.
    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.state.storage.root().join("site").join("42").join(project)
    }

    /// Sorted file names in a directory (empty if missing).
    pub fn file_names(&self, dir: &std::path::Path) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Sorted file names in a project's `all_images/`.
    pub fn unified_names(&self, project: &str) -> Vec<String> {
        self.file_names(&self.project_dir(project).join("all_images"))
    }

    /// Reconstruction marker written for a task, if any.
    pub fn marker(&self, task_id: &str) -> Option<Value> {
        let path = self
            .state
            .config
            .reconstruction
            .watch_root
            .join(format!("{task_id}.json"));
        let raw = std::fs::read(path).ok()?;
        serde_json::from_slice(&raw).ok()
    }

    /// POST a multipart batch to `/upload`.
    pub async fn upload(&self, body: super::fixtures::MultipartBody) -> (StatusCode, Value) {
        let (content_type, bytes) = body.finish();
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header("Content-Type", content_type)
            .body(Body::from(bytes))
            .unwrap();
        send(&self.router, request).await
    }

    /// Send a JSON (or empty) request.
    pub async fn json(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(v) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::to_vec(&v).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        send(&self.router, request).await
    }

    /// GET a path and return status and raw body text.
    pub async fn get_text(&self, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }
}

async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    (status, json)
}
