//! Project / vehicle / track classification of uploaded photos.
//!
//! Every photo belongs to exactly one level of the hierarchy. The level decides
//! where the photo lives inside the project directory and which prefix its
//! mirror copy in the unified directory receives:
//!
//! | level   | directory                          | prefix                 |
//! |---------|------------------------------------|------------------------|
//! | project | `<project>/`                       | `P_`                   |
//! | vehicle | `<project>/vehicles/<v>/`          | `V_<v>_`               |
//! | track   | `<project>/vehicles/<v>/tracks/<t>/` | `T_<v>_<t>_`         |
//!
//! Metadata that is missing or cannot be understood classifies as
//! [`Classification::Unrecognized`], which places the photo at project level.
//! A malformed description therefore misfiles a photo but never drops it.

use crate::naming::validate_component;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Directory holding the canonical image set of a project.
pub const UNIFIED_DIR: &str = "all_images";
/// Directory holding per-vehicle photos.
pub const VEHICLES_DIR: &str = "vehicles";
/// Directory (inside a vehicle) holding per-track photos.
pub const TRACKS_DIR: &str = "tracks";

/// Per-file metadata as sent by the capture client (`file_info_<i>`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    /// One of `project`, `vehicle`, `track`.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub vehicle_id: Option<String>,
    #[serde(default)]
    pub vehicle_name: Option<String>,
    #[serde(default)]
    pub track_id: Option<String>,
    #[serde(default)]
    pub track_name: Option<String>,
}

impl FileMeta {
    /// Vehicle identifier, falling back to the display name.
    fn vehicle_key(&self) -> Option<&str> {
        non_blank(self.vehicle_id.as_deref()).or_else(|| non_blank(self.vehicle_name.as_deref()))
    }

    /// Track identifier, falling back to the display name.
    fn track_key(&self) -> Option<&str> {
        non_blank(self.track_id.as_deref()).or_else(|| non_blank(self.track_name.as_deref()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A level of the project hierarchy.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Hierarchy {
    Project,
    Vehicle { vehicle_id: String },
    Track { vehicle_id: String, track_id: String },
}

impl Hierarchy {
    /// Directory of this level, relative to the project directory.
    pub fn relative_dir(&self) -> PathBuf {
        match self {
            Self::Project => PathBuf::new(),
            Self::Vehicle { vehicle_id } => Path::new(VEHICLES_DIR).join(vehicle_id),
            Self::Track {
                vehicle_id,
                track_id,
            } => Path::new(VEHICLES_DIR)
                .join(vehicle_id)
                .join(TRACKS_DIR)
                .join(track_id),
        }
    }

    /// Prefix applied to the unified-directory copy of a file at this level.
    pub fn prefix(&self) -> String {
        match self {
            Self::Project => "P_".to_string(),
            Self::Vehicle { vehicle_id } => format!("V_{vehicle_id}_"),
            Self::Track {
                vehicle_id,
                track_id,
            } => format!("T_{vehicle_id}_{track_id}_"),
        }
    }

    /// Prefixed unified name for a file stored at this level.
    pub fn unified_name(&self, file_name: &str) -> String {
        format!("{}{}", self.prefix(), file_name)
    }

    /// Recover the level from a directory relative to the project directory.
    ///
    /// Returns `None` for directories that are not a hierarchy level (for
    /// example the unified directory or `vehicles/` itself).
    pub fn from_relative_dir(rel: &Path) -> Option<Self> {
        let parts: Vec<&str> = rel
            .components()
            .map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;

        match parts.as_slice() {
            [] => Some(Self::Project),
            [VEHICLES_DIR, vehicle] => Some(Self::Vehicle {
                vehicle_id: vehicle.to_string(),
            }),
            [VEHICLES_DIR, vehicle, TRACKS_DIR, track] => Some(Self::Track {
                vehicle_id: vehicle.to_string(),
                track_id: track.to_string(),
            }),
            _ => None,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Vehicle { .. } => "vehicle",
            Self::Track { .. } => "track",
        }
    }
}

impl fmt::Display for Hierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project => write!(f, "project"),
            Self::Vehicle { vehicle_id } => write!(f, "vehicle {vehicle_id}"),
            Self::Track {
                vehicle_id,
                track_id,
            } => write!(f, "track {vehicle_id}/{track_id}"),
        }
    }
}

/// Outcome of reading a file's hierarchy metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    /// Metadata named a valid level.
    Recognized(Hierarchy),
    /// Metadata was absent or unusable; the file is placed at project level.
    Unrecognized {
        /// Raw metadata as received, if any.
        raw: Option<String>,
        /// Why the metadata was not used.
        reason: String,
    },
}

impl Classification {
    /// Classify from the raw `file_info_<i>` JSON (if the client sent one).
    pub fn from_raw(raw: Option<&str>) -> Self {
        let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
            return Self::Unrecognized {
                raw: None,
                reason: "no metadata".to_string(),
            };
        };

        match serde_json::from_str::<FileMeta>(raw) {
            Ok(meta) => match Self::from_meta(&meta) {
                Self::Unrecognized { reason, .. } => Self::Unrecognized {
                    raw: Some(raw.to_string()),
                    reason,
                },
                recognized => recognized,
            },
            Err(e) => Self::Unrecognized {
                raw: Some(raw.to_string()),
                reason: format!("unparseable metadata: {e}"),
            },
        }
    }

    /// Classify already-decoded metadata.
    pub fn from_meta(meta: &FileMeta) -> Self {
        let unrecognized = |reason: String| Self::Unrecognized { raw: None, reason };

        let kind = non_blank(meta.kind.as_deref()).map(str::to_ascii_lowercase);
        match kind.as_deref() {
            None | Some("project") => Self::Recognized(Hierarchy::Project),
            Some("vehicle") => match meta.vehicle_key() {
                Some(vehicle) => match validate_component(vehicle) {
                    Ok(vehicle) => Self::Recognized(Hierarchy::Vehicle {
                        vehicle_id: vehicle.to_string(),
                    }),
                    Err(e) => unrecognized(e.to_string()),
                },
                None => unrecognized("vehicle metadata without vehicle id".to_string()),
            },
            Some("track") => match (meta.vehicle_key(), meta.track_key()) {
                (Some(vehicle), Some(track)) => {
                    match (validate_component(vehicle), validate_component(track)) {
                        (Ok(vehicle), Ok(track)) => Self::Recognized(Hierarchy::Track {
                            vehicle_id: vehicle.to_string(),
                            track_id: track.to_string(),
                        }),
                        (Err(e), _) | (_, Err(e)) => unrecognized(e.to_string()),
                    }
                }
                _ => unrecognized("track metadata without vehicle and track ids".to_string()),
            },
            Some(other) => unrecognized(format!("unknown type: {other}")),
        }
    }

    /// The level the file is placed at.
    pub fn hierarchy(&self) -> Hierarchy {
        match self {
            Self::Recognized(h) => h.clone(),
            Self::Unrecognized { .. } => Hierarchy::Project,
        }
    }

    pub fn is_recognized(&self) -> bool {
        matches!(self, Self::Recognized(_))
    }
}

/// Where a classified file is stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    pub hierarchy: Hierarchy,
    /// Type-specific directory, relative to the project directory.
    pub target_dir: PathBuf,
    /// Prefix of the unified-directory copy.
    pub prefix: String,
}

impl Placement {
    /// Prefixed unified name for `file_name`.
    pub fn unified_name(&self, file_name: &str) -> String {
        format!("{}{}", self.prefix, file_name)
    }
}

/// Decide the target directory and unified prefix for a classified file.
pub fn classify(classification: &Classification) -> Placement {
    let hierarchy = classification.hierarchy();
    Placement {
        target_dir: hierarchy.relative_dir(),
        prefix: hierarchy.prefix(),
        hierarchy,
    }
}
