//! Image manifest of a project's unified directory.
//!
//! The text form has one tab-separated line per image:
//!
//! ```text
//! 11	P_site.jpg	11.jpg
//! 12	V_V1_door.jpg	12.jpg
//! ```

use crate::hierarchy::Hierarchy;
use crate::naming::{canonical_name, extension_of};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One image of the canonical set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub index: u64,
    /// Prefixed unified name the image was known by before numbering.
    pub original_name: String,
    /// Final `<index>.<ext>` name inside the unified directory.
    pub canonical_name: String,
}

impl ManifestEntry {
    /// Build the entry for `original_name` at `index`.
    pub fn new(index: u64, original_name: impl Into<String>) -> Result<Self> {
        let original_name = original_name.into();
        let ext = extension_of(&original_name).ok_or_else(|| {
            Error::ManifestIntegrity(format!("no extension on {original_name}"))
        })?;
        Ok(Self {
            index,
            canonical_name: canonical_name(index, &ext),
            original_name,
        })
    }
}

/// Ordered list of canonical images.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Build a manifest, checking its invariants.
    pub fn new(entries: Vec<ManifestEntry>) -> Result<Self> {
        let manifest = Self { entries };
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first_index(&self) -> Option<u64> {
        self.entries.first().map(|e| e.index)
    }

    pub fn last_index(&self) -> Option<u64> {
        self.entries.last().map(|e| e.index)
    }

    /// Look up the entry with `index`.
    pub fn get(&self, index: u64) -> Option<&ManifestEntry> {
        let first = self.first_index()?;
        let pos = usize::try_from(index.checked_sub(first)?).ok()?;
        self.entries.get(pos)
    }

    /// Indices must be contiguous and ascending; every canonical name must be
    /// `<index>.<ext>` of its original.
    pub fn validate(&self) -> Result<()> {
        let mut expected: Option<u64> = None;
        for entry in &self.entries {
            if let Some(next) = expected
                && entry.index != next
            {
                return Err(Error::ManifestIntegrity(format!(
                    "expected index {next}, found {}",
                    entry.index
                )));
            }
            let ext = extension_of(&entry.original_name).ok_or_else(|| {
                Error::ManifestIntegrity(format!("no extension on {}", entry.original_name))
            })?;
            if entry.canonical_name != canonical_name(entry.index, &ext) {
                return Err(Error::ManifestIntegrity(format!(
                    "canonical name {} does not match index {}",
                    entry.canonical_name, entry.index
                )));
            }
            expected = Some(entry.index + 1);
        }
        Ok(())
    }

    /// Render as the tab-separated text form.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!(
                "{}\t{}\t{}\n",
                entry.index, entry.original_name, entry.canonical_name
            ));
        }
        out
    }

    /// Parse the tab-separated text form.
    pub fn parse_text(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut parts = line.split('\t');
            let (Some(index), Some(original), Some(canonical), None) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return Err(Error::ManifestIntegrity(format!(
                    "line {}: expected 3 tab-separated fields",
                    line_no + 1
                )));
            };
            let index = index.parse::<u64>().map_err(|e| {
                Error::ManifestIntegrity(format!("line {}: bad index: {e}", line_no + 1))
            })?;
            entries.push(ManifestEntry {
                index,
                original_name: original.to_string(),
                canonical_name: canonical.to_string(),
            });
        }
        Self::new(entries)
    }
}

/// Images of one vehicle in the grouped manifest.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleGroup {
    pub images: Vec<ManifestEntry>,
    pub tracks: BTreeMap<String, Vec<ManifestEntry>>,
}

/// Manifest grouped by hierarchy level.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupedManifest {
    pub project: Vec<ManifestEntry>,
    pub vehicles: BTreeMap<String, VehicleGroup>,
    pub total: usize,
}

impl GroupedManifest {
    /// Group entries by the level they were discovered at.
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = (&'a Hierarchy, &'a ManifestEntry)>,
    ) -> Self {
        let mut grouped = Self::default();
        for (hierarchy, entry) in entries {
            grouped.total += 1;
            match hierarchy {
                Hierarchy::Project => grouped.project.push(entry.clone()),
                Hierarchy::Vehicle { vehicle_id } => grouped
                    .vehicles
                    .entry(vehicle_id.clone())
                    .or_default()
                    .images
                    .push(entry.clone()),
                Hierarchy::Track {
                    vehicle_id,
                    track_id,
                } => grouped
                    .vehicles
                    .entry(vehicle_id.clone())
                    .or_default()
                    .tracks
                    .entry(track_id.clone())
                    .or_default()
                    .push(entry.clone()),
            }
        }
        grouped
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}
