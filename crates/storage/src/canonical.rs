//! Canonicalization pass.
//!
//! Rebuilds a project's unified directory from the photos stored at each
//! hierarchy level. The pass is idempotent and runs after every batch under
//! the project lock:
//!
//! 1. Collect every image in the project, vehicle and track directories.
//! 2. Order them by modification time (then relative path) and keep the
//!    first file for each prefixed unified name.
//! 3. Number them contiguously from the configured start index.
//! 4. Bring `all_images/<index>.<ext>` up to date for each, through a
//!    prefixed copy that is then renamed.
//! 5. Replace the text and grouped manifests.
//! 6. Delete every other file in the unified directory.
//!
//! A file that cannot be copied or renamed is logged and left out; the
//! remaining files still number without gaps.

use crate::error::StorageResult;
use crate::filesystem::{FileEntry, FilesystemBackend};
use crate::layout::ProjectLayout;
use fieldsync_core::config::CanonicalConfig;
use fieldsync_core::hierarchy::Hierarchy;
use fieldsync_core::manifest::{GroupedManifest, Manifest, ManifestEntry};
use fieldsync_core::upload::CanonicalSummary;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// A photo found at one hierarchy level.
#[derive(Clone, Debug)]
struct SourceImage {
    hierarchy: Hierarchy,
    unified_name: String,
    rel_path: PathBuf,
    file: FileEntry,
}

/// Manifest produced by a pass together with its summary.
#[derive(Clone, Debug)]
pub struct CanonicalOutcome {
    pub manifest: Manifest,
    pub grouped: GroupedManifest,
    pub summary: CanonicalSummary,
}

/// Runs the canonicalization pass for projects under one backend.
pub struct Canonicalizer<'a> {
    backend: &'a FilesystemBackend,
    config: &'a CanonicalConfig,
}

impl<'a> Canonicalizer<'a> {
    pub fn new(backend: &'a FilesystemBackend, config: &'a CanonicalConfig) -> Self {
        Self { backend, config }
    }

    /// Run the pass. The caller must hold the project lock.
    #[instrument(skip(self, layout), fields(project = %layout.dir().display()))]
    pub async fn run(&self, layout: &ProjectLayout) -> StorageResult<CanonicalOutcome> {
        let unified_dir = layout.unified_dir();
        self.backend.create_dir_all(&unified_dir).await?;

        let sources = self.collect_sources(layout).await?;
        let previous = self.load_previous(layout).await;

        let mut entries: Vec<ManifestEntry> = Vec::with_capacity(sources.len());
        let mut levels: Vec<Hierarchy> = Vec::with_capacity(sources.len());
        let mut skipped = 0;

        for source in sources {
            let index = self.config.start_index + entries.len() as u64;
            match self.place(layout, &previous, index, &source).await {
                Ok(entry) => {
                    entries.push(entry);
                    levels.push(source.hierarchy);
                }
                Err(e) => {
                    skipped += 1;
                    warn!(
                        file = %source.rel_path.display(),
                        error = %e,
                        "skipping file in canonicalization"
                    );
                }
            }
        }

        let manifest = Manifest::new(entries)?;
        let grouped = GroupedManifest::from_entries(levels.iter().zip(manifest.entries.iter()));

        self.backend
            .write_atomic(
                &layout.manifest_path(&self.config.manifest_file),
                manifest.to_text().as_bytes(),
            )
            .await?;
        self.backend
            .write_atomic(
                &layout.manifest_path(&self.config.grouped_manifest_file),
                grouped.to_json()?.as_bytes(),
            )
            .await?;

        let removed = self.collect_garbage(layout, &manifest).await?;

        let summary = CanonicalSummary {
            image_count: manifest.len(),
            first_index: manifest.first_index(),
            last_index: manifest.last_index(),
            skipped,
        };
        info!(
            images = summary.image_count,
            skipped,
            removed,
            "canonicalization complete"
        );

        Ok(CanonicalOutcome {
            manifest,
            grouped,
            summary,
        })
    }

    /// Every image at every hierarchy level, deduplicated by unified name and
    /// in numbering order.
    async fn collect_sources(&self, layout: &ProjectLayout) -> StorageResult<Vec<SourceImage>> {
        let mut sources = Vec::new();
        for dir in self.backend.level_dirs(layout).await? {
            let Some(hierarchy) = dir
                .strip_prefix(layout.dir())
                .ok()
                .and_then(Hierarchy::from_relative_dir)
            else {
                continue;
            };
            for file in self.backend.list_images(&dir).await? {
                let rel_path = file
                    .path
                    .strip_prefix(layout.dir())
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|_| file.path.clone());
                sources.push(SourceImage {
                    unified_name: hierarchy.unified_name(&file.name),
                    hierarchy: hierarchy.clone(),
                    rel_path,
                    file,
                });
            }
        }

        sources.sort_by(|a, b| {
            a.file
                .modified
                .cmp(&b.file.modified)
                .then_with(|| a.rel_path.cmp(&b.rel_path))
        });

        let mut seen = HashSet::new();
        sources.retain(|s| {
            let first = seen.insert(s.unified_name.clone());
            if !first {
                debug!(name = %s.unified_name, "dropping duplicate unified name");
            }
            first
        });
        Ok(sources)
    }

    /// Manifest from the previous pass; unreadable manifests count as empty.
    async fn load_previous(&self, layout: &ProjectLayout) -> Manifest {
        let path = layout.manifest_path(&self.config.manifest_file);
        match self.backend.read_to_string(&path).await {
            Ok(Some(text)) => Manifest::parse_text(&text).unwrap_or_else(|e| {
                warn!(error = %e, "ignoring invalid previous manifest");
                Manifest::default()
            }),
            Ok(None) => Manifest::default(),
            Err(e) => {
                warn!(error = %e, "failed to read previous manifest");
                Manifest::default()
            }
        }
    }

    /// Make `all_images/<index>.<ext>` hold `source`.
    async fn place(
        &self,
        layout: &ProjectLayout,
        previous: &Manifest,
        index: u64,
        source: &SourceImage,
    ) -> StorageResult<ManifestEntry> {
        let entry = ManifestEntry::new(index, source.unified_name.clone())?;
        let unified_dir = layout.unified_dir();
        let canonical_path = unified_dir.join(&entry.canonical_name);

        // A replaced source can keep both its name and its size.
        if previous.get(index) == Some(&entry)
            && self
                .backend
                .same_content(&source.file.path, &canonical_path)
                .await?
        {
            return Ok(entry);
        }

        let prefixed_path = unified_dir.join(&source.unified_name);
        self.backend.copy(&source.file.path, &prefixed_path).await?;
        self.backend.rename(&prefixed_path, &canonical_path).await?;
        debug!(
            from = %source.unified_name,
            to = %entry.canonical_name,
            "assigned canonical name"
        );
        Ok(entry)
    }

    /// Delete unified-directory files that are not assigned canonical names.
    async fn collect_garbage(
        &self,
        layout: &ProjectLayout,
        manifest: &Manifest,
    ) -> StorageResult<usize> {
        let keep: HashSet<&str> = manifest
            .entries
            .iter()
            .map(|e| e.canonical_name.as_str())
            .collect();

        let mut removed = 0;
        for file in self.backend.list_files(&layout.unified_dir()).await? {
            if keep.contains(file.name.as_str()) {
                continue;
            }
            match self.backend.remove(&file.path).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(file = %file.name, error = %e, "failed to remove stale file"),
            }
        }
        Ok(removed)
    }
}
