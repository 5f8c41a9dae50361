use fieldsync_core::config::CanonicalConfig;
use fieldsync_core::hierarchy::Hierarchy;
use fieldsync_storage::{CanonicalOutcome, Canonicalizer, FilesystemBackend, ProjectLayout};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Generate deterministic test data using a seeded pseudo-random generator
/// Same seed produces same output (reproducible tests)
pub fn seeded_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG (Linear Congruential Generator)
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    data
}

/// A project directory in a fresh temporary root.
pub struct ProjectFixture {
    pub backend: FilesystemBackend,
    pub layout: ProjectLayout,
    pub config: CanonicalConfig,
    _temp_dir: TempDir,
}

impl ProjectFixture {
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
        let backend = FilesystemBackend::new(temp_dir.path().join("uploads"))
            .await
            .expect("failed to create backend");
        let layout = backend
            .project("site", "42", "bridge")
            .expect("valid layout");
        Self {
            backend,
            layout,
            config: CanonicalConfig::default(),
            _temp_dir: temp_dir,
        }
    }

    pub fn vehicle(id: &str) -> Hierarchy {
        Hierarchy::Vehicle {
            vehicle_id: id.to_string(),
        }
    }

    pub fn track(vehicle: &str, track: &str) -> Hierarchy {
        Hierarchy::Track {
            vehicle_id: vehicle.to_string(),
            track_id: track.to_string(),
        }
    }

    /// Store a photo at `level`, stamping its modification time `order`
    /// seconds after a fixed base so numbering order is deterministic.
    pub async fn put_photo(&self, level: &Hierarchy, name: &str, data: &[u8], order: u64) -> PathBuf {
        let path = self.layout.level_dir(level).join(name);
        self.backend
            .write_atomic(&path, data)
            .await
            .expect("failed to write photo");
        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + order);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .and_then(|f| f.set_modified(stamp))
            .expect("failed to set mtime");
        path
    }

    pub async fn canonicalize(&self) -> CanonicalOutcome {
        Canonicalizer::new(&self.backend, &self.config)
            .run(&self.layout)
            .await
            .expect("canonicalization failed")
    }

    /// Sorted file names in the unified directory.
    pub async fn unified_names(&self) -> Vec<String> {
        self.backend
            .list_files(&self.layout.unified_dir())
            .await
            .expect("failed to list unified dir")
            .into_iter()
            .map(|f| f.name)
            .collect()
    }

    pub async fn read_unified(&self, name: &str) -> Vec<u8> {
        tokio::fs::read(self.layout.unified_dir().join(name))
            .await
            .expect("failed to read unified file")
    }

    pub async fn manifest_text(&self) -> String {
        self.backend
            .read_to_string(&self.layout.manifest_path(&self.config.manifest_file))
            .await
            .expect("failed to read manifest")
            .unwrap_or_default()
    }
}
