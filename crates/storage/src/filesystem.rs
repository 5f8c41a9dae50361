//! Local filesystem backend for the upload tree.

use crate::error::{StorageError, StorageResult};
use crate::layout::ProjectLayout;
use fieldsync_core::naming::is_accepted_image;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Name of the file written and removed by [`FilesystemBackend::probe_writable`].
const WRITE_PROBE_FILE: &str = ".write_probe";

/// A regular file found while listing a directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub modified: SystemTime,
}

/// Filesystem backend rooted at the upload root.
///
/// Every path passed in must resolve inside the root; symlinks that escape
/// it are rejected.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the layout of a project under this root.
    pub fn project(
        &self,
        upload_type: &str,
        upload_value: &str,
        project_name: &str,
    ) -> StorageResult<ProjectLayout> {
        ProjectLayout::new(&self.root, upload_type, upload_value, project_name)
    }

    /// Validate `path` off the async runtime.
    async fn checked_path(&self, path: &Path) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::checked_path_sync(&root, &path))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Check that `path` lies inside `root`, following symlinks of the path
    /// itself or of its nearest existing ancestor.
    fn checked_path_sync(root: &Path, path: &Path) -> StorageResult<PathBuf> {
        let rel = path.strip_prefix(root).map_err(|_| {
            StorageError::InvalidPath(format!("outside storage root: {}", path.display()))
        })?;
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(format!(
                "contains unsafe path component: {}",
                rel.display()
            )));
        }

        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        // Walk from the path itself up to the nearest ancestor that exists.
        let mut candidate = Some(path);
        while let Some(current) = candidate {
            match std::fs::symlink_metadata(current) {
                Ok(meta) => {
                    let canonical = current.canonicalize().map_err(|e| {
                        if meta.file_type().is_symlink() {
                            StorageError::InvalidKey(format!(
                                "symlink target missing or invalid: {}",
                                rel.display()
                            ))
                        } else {
                            StorageError::Io(std::io::Error::new(
                                e.kind(),
                                format!("failed to canonicalize path: {e}"),
                            ))
                        }
                    })?;
                    if !canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "resolved path escapes storage root: {}",
                            rel.display()
                        )));
                    }
                    return Ok(path.to_path_buf());
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(StorageError::Io(std::io::Error::new(
                        err.kind(),
                        format!("failed to stat path: {err}"),
                    )));
                }
            }
            candidate = current.parent();
        }

        Ok(path.to_path_buf())
    }

    /// Ensure parent directory exists.
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Temp file next to `path` with a unique suffix.
    fn temp_path(path: &Path) -> PathBuf {
        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        )
    }

    /// Write `data` to `path` atomically: temp file, fsync, rename.
    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    pub async fn write_atomic(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        let path = self.checked_path(path).await?;
        self.ensure_parent(&path).await?;

        let temp_path = Self::temp_path(&path);
        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            fs::rename(&temp_path, &path).await
        }
        .await;
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    pub async fn exists(&self, path: &Path) -> StorageResult<bool> {
        let path = self.checked_path(path).await?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    /// Size of a regular file, or `None` if it does not exist.
    #[instrument(skip(self), fields(backend = "filesystem"))]
    pub async fn file_size(&self, path: &Path) -> StorageResult<Option<u64>> {
        let path = self.checked_path(path).await?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Read a UTF-8 file, or `None` if it does not exist.
    #[instrument(skip(self), fields(backend = "filesystem"))]
    pub async fn read_to_string(&self, path: &Path) -> StorageResult<Option<String>> {
        let path = self.checked_path(path).await?;
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Read a file's bytes, or `None` if it does not exist.
    #[instrument(skip(self), fields(backend = "filesystem"))]
    pub async fn read(&self, path: &Path) -> StorageResult<Option<Vec<u8>>> {
        let path = self.checked_path(path).await?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Whether both files exist and hold identical bytes.
    #[instrument(skip(self), fields(backend = "filesystem"))]
    pub async fn same_content(&self, a: &Path, b: &Path) -> StorageResult<bool> {
        if self.file_size(a).await? != self.file_size(b).await? {
            return Ok(false);
        }
        match (self.read(a).await?, self.read(b).await?) {
            (Some(left), Some(right)) => Ok(left == right),
            _ => Ok(false),
        }
    }

    /// Copy a file, replacing `to` atomically.
    #[instrument(skip(self), fields(backend = "filesystem"))]
    pub async fn copy(&self, from: &Path, to: &Path) -> StorageResult<u64> {
        let from_path = self.checked_path(from).await?;
        let to_path = self.checked_path(to).await?;
        self.ensure_parent(&to_path).await?;

        let temp_path = Self::temp_path(&to_path);
        let copied = match fs::copy(&from_path, &temp_path).await {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(StorageError::from_io(e, &from_path));
            }
        };
        if let Err(e) = fs::rename(&temp_path, &to_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }
        Ok(copied)
    }

    /// Rename a file, falling back to copy-then-delete when the rename fails.
    #[instrument(skip(self), fields(backend = "filesystem"))]
    pub async fn rename(&self, from: &Path, to: &Path) -> StorageResult<()> {
        let from_path = self.checked_path(from).await?;
        let to_path = self.checked_path(to).await?;
        self.ensure_parent(&to_path).await?;

        match fs::rename(&from_path, &to_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(from_path.display().to_string()))
            }
            Err(e) => {
                debug!(error = %e, "rename failed, falling back to copy");
                self.copy(&from_path, &to_path).await?;
                fs::remove_file(&from_path)
                    .await
                    .map_err(|e| StorageError::from_io(e, &from_path))?;
                Ok(())
            }
        }
    }

    /// Remove a file. Returns whether it existed.
    #[instrument(skip(self), fields(backend = "filesystem"))]
    pub async fn remove(&self, path: &Path) -> StorageResult<bool> {
        let path = self.checked_path(path).await?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    pub async fn create_dir_all(&self, dir: &Path) -> StorageResult<()> {
        let dir = self.checked_path(dir).await?;
        fs::create_dir_all(&dir).await?;
        Ok(())
    }

    /// Regular files directly inside `dir`, sorted by name.
    ///
    /// A missing directory lists as empty. Symlinks are ignored.
    #[instrument(skip(self), fields(backend = "filesystem"))]
    pub async fn list_files(&self, dir: &Path) -> StorageResult<Vec<FileEntry>> {
        let dir = self.checked_path(dir).await?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut results = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = %entry.path().display(), "skipping non-UTF-8 file name");
                continue;
            };
            let meta = entry.metadata().await?;
            results.push(FileEntry {
                path: entry.path(),
                name,
                size: meta.len(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    /// Accepted image files directly inside `dir`, skipping hidden files.
    pub async fn list_images(&self, dir: &Path) -> StorageResult<Vec<FileEntry>> {
        let mut files = self.list_files(dir).await?;
        files.retain(|f| !f.name.starts_with('.') && is_accepted_image(&f.name));
        Ok(files)
    }

    /// Names of subdirectories directly inside `dir`, sorted.
    #[instrument(skip(self), fields(backend = "filesystem"))]
    pub async fn list_dirs(&self, dir: &Path) -> StorageResult<Vec<String>> {
        let dir = self.checked_path(dir).await?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut results = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir()
                && let Some(name) = entry.file_name().to_str()
            {
                results.push(name.to_string());
            }
        }
        results.sort();
        Ok(results)
    }

    /// Every directory of a project that can hold photos: the project
    /// directory, each vehicle directory and each track directory.
    pub async fn level_dirs(&self, layout: &ProjectLayout) -> StorageResult<Vec<PathBuf>> {
        let mut dirs = vec![layout.dir().to_path_buf()];
        for vehicle in self.list_dirs(&layout.vehicles_dir()).await? {
            dirs.push(layout.vehicles_dir().join(&vehicle));
            for track in self.list_dirs(&layout.tracks_dir(&vehicle)).await? {
                dirs.push(layout.tracks_dir(&vehicle).join(track));
            }
        }
        Ok(dirs)
    }

    /// Delete every image of a project: all level directories and the
    /// unified directory. Returns the number of files removed.
    #[instrument(skip(self, layout), fields(backend = "filesystem", project = %layout.dir().display()))]
    pub async fn clear_images(&self, layout: &ProjectLayout) -> StorageResult<usize> {
        let mut dirs = self.level_dirs(layout).await?;
        dirs.push(layout.unified_dir());

        let mut removed = 0;
        for dir in dirs {
            for file in self.list_images(&dir).await? {
                if self.remove(&file.path).await? {
                    removed += 1;
                }
            }
        }
        debug!(removed, "cleared project images");
        Ok(removed)
    }

    /// Create `dir` and check that a file can be written and removed in it.
    #[instrument(skip(self), fields(backend = "filesystem"))]
    pub async fn probe_writable(&self, dir: &Path) -> StorageResult<()> {
        self.create_dir_all(dir).await?;
        let probe = dir.join(WRITE_PROBE_FILE);
        self.write_atomic(&probe, b"ok").await?;
        self.remove(&probe).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    pub async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}
