//! On-disk layout of one project.
//!
//! ```text
//! <root>/<type>/<value>/<project>/
//!     *.jpg                          project-level photos
//!     image_list.txt                 text manifest
//!     image_groups.json              grouped manifest
//!     all_images/                    canonical set (11.jpg, 12.png, ...)
//!     vehicles/<v>/*.jpg             vehicle-level photos
//!     vehicles/<v>/tracks/<t>/*.jpg  track-level photos
//! ```

use crate::error::StorageResult;
use fieldsync_core::hierarchy::{Hierarchy, TRACKS_DIR, UNIFIED_DIR, VEHICLES_DIR};
use fieldsync_core::naming::validate_component;
use std::path::{Path, PathBuf};

/// Paths of one project directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectLayout {
    upload_type: String,
    upload_value: String,
    project_name: String,
    dir: PathBuf,
}

impl ProjectLayout {
    /// Resolve the project directory under `root`.
    ///
    /// Every component must be a single safe directory name.
    pub fn new(
        root: &Path,
        upload_type: &str,
        upload_value: &str,
        project_name: &str,
    ) -> StorageResult<Self> {
        let upload_type = validate_component(upload_type)?;
        let upload_value = validate_component(upload_value)?;
        let project_name = validate_component(project_name)?;
        Ok(Self {
            dir: root.join(upload_type).join(upload_value).join(project_name),
            upload_type: upload_type.to_string(),
            upload_value: upload_value.to_string(),
            project_name: project_name.to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn upload_type(&self) -> &str {
        &self.upload_type
    }

    pub fn upload_value(&self) -> &str {
        &self.upload_value
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// The unified `all_images/` directory.
    pub fn unified_dir(&self) -> PathBuf {
        self.dir.join(UNIFIED_DIR)
    }

    /// The `vehicles/` directory.
    pub fn vehicles_dir(&self) -> PathBuf {
        self.dir.join(VEHICLES_DIR)
    }

    /// Directory of a hierarchy level.
    pub fn level_dir(&self, hierarchy: &Hierarchy) -> PathBuf {
        self.dir.join(hierarchy.relative_dir())
    }

    /// The `tracks/` directory of a vehicle.
    pub fn tracks_dir(&self, vehicle_id: &str) -> PathBuf {
        self.vehicles_dir().join(vehicle_id).join(TRACKS_DIR)
    }

    /// Path of a manifest file kept in the project directory.
    pub fn manifest_path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Task id handed to the reconstruction watcher.
    pub fn task_id(&self) -> String {
        format!(
            "{}_{}_{}",
            self.upload_type, self.upload_value, self.project_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = ProjectLayout::new(Path::new("/srv"), "site", "42", "bridge").unwrap();
        assert_eq!(layout.dir(), Path::new("/srv/site/42/bridge"));
        assert_eq!(
            layout.unified_dir(),
            Path::new("/srv/site/42/bridge/all_images")
        );
        assert_eq!(
            layout.level_dir(&Hierarchy::Track {
                vehicle_id: "V1".to_string(),
                track_id: "T1".to_string(),
            }),
            Path::new("/srv/site/42/bridge/vehicles/V1/tracks/T1")
        );
        assert_eq!(layout.level_dir(&Hierarchy::Project), layout.dir());
        assert_eq!(layout.task_id(), "site_42_bridge");
    }

    #[test]
    fn test_layout_rejects_traversal() {
        assert!(ProjectLayout::new(Path::new("/srv"), "..", "42", "p").is_err());
        assert!(ProjectLayout::new(Path::new("/srv"), "site", "a/b", "p").is_err());
        assert!(ProjectLayout::new(Path::new("/srv"), "site", "42", "").is_err());
    }
}
