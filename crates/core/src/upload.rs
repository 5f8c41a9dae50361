//! Batch upload request and response types.

use crate::naming::validate_component;
use crate::session::{FileOutcome, SessionId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Scalar form fields of one batch request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchHeader {
    pub batch_number: u32,
    pub total_batches: u32,
    /// Upload category (`type` field), first directory level under the root.
    pub upload_type: String,
    /// Upload value (`value` field), second directory level.
    pub upload_value: String,
    pub session_id: Option<SessionId>,
    pub retry_count: u32,
    pub expected_files_count: Option<u32>,
}

impl BatchHeader {
    /// Parse the header from form fields looked up by name.
    pub fn from_fields<'a>(field: impl Fn(&str) -> Option<&'a str>) -> Result<Self> {
        let required = |name: &str| {
            field(name)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::InvalidBatch(format!("missing field: {name}")))
        };
        let number = |name: &str, value: &str| {
            value
                .trim()
                .parse::<u32>()
                .map_err(|e| Error::InvalidBatch(format!("{name}: {e}")))
        };
        let optional_number = |name: &str| -> Result<Option<u32>> {
            match field(name).map(str::trim).filter(|v| !v.is_empty()) {
                Some(value) => number(name, value).map(Some),
                None => Ok(None),
            }
        };

        let batch_number = number("batch_number", required("batch_number")?)?;
        let total_batches = number("total_batches", required("total_batches")?)?;
        if batch_number == 0 || total_batches == 0 {
            return Err(Error::InvalidBatch(
                "batch_number and total_batches start at 1".to_string(),
            ));
        }
        if batch_number > total_batches {
            return Err(Error::InvalidBatch(format!(
                "batch_number {batch_number} exceeds total_batches {total_batches}"
            )));
        }

        let upload_type = validate_component(required("type")?)?.to_string();
        let upload_value = validate_component(required("value")?)?.to_string();

        let session_id = match field("session_id").map(str::trim).filter(|v| !v.is_empty()) {
            Some(id) => Some(SessionId::parse(id)?),
            None => None,
        };

        Ok(Self {
            batch_number,
            total_batches,
            upload_type,
            upload_value,
            session_id,
            retry_count: optional_number("retry_count")?.unwrap_or(0),
            expected_files_count: optional_number("expected_files_count")?,
        })
    }

    pub fn is_first(&self) -> bool {
        self.batch_number == 1
    }

    pub fn is_last(&self) -> bool {
        self.batch_number == self.total_batches
    }
}

/// Track description inside the project payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDescription {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Vehicle description inside the project payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleDescription {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tracks: Vec<TrackDescription>,
}

/// Project/vehicle/track description sent with every batch (`project` field).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDescription {
    pub name: String,
    #[serde(default)]
    pub vehicles: Vec<VehicleDescription>,
}

impl ProjectDescription {
    /// Decode the JSON payload; the project name must be a safe directory name.
    pub fn from_json(raw: &str) -> Result<Self> {
        let mut project: Self = serde_json::from_str(raw)
            .map_err(|e| Error::InvalidProject(format!("invalid JSON: {e}")))?;
        project.name = project.name.trim().to_string();
        validate_component(&project.name)?;
        Ok(project)
    }

    /// Description carrying only a name (the `project_name` fallback field).
    pub fn named(name: &str) -> Result<Self> {
        let name = name.trim();
        validate_component(name)?;
        Ok(Self {
            name: name.to_string(),
            vehicles: Vec::new(),
        })
    }

    pub fn track_count(&self) -> usize {
        self.vehicles.iter().map(|v| v.tracks.len()).sum()
    }
}

/// Aggregate status of a batch response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Success,
    PartialSuccess,
    Failed,
}

impl BatchStatus {
    pub fn from_counts(saved: usize, total: usize) -> Self {
        if saved == total {
            Self::Success
        } else if saved == 0 {
            Self::Failed
        } else {
            Self::PartialSuccess
        }
    }
}

/// A file accepted in this batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedFile {
    pub file_name: String,
    pub unique_id: String,
    pub stored_path: String,
    pub outcome: FileOutcome,
}

/// A file rejected in this batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    pub file_name: String,
    pub unique_id: String,
    pub error: String,
}

/// Result of the canonicalization pass that followed the batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalSummary {
    pub image_count: usize,
    pub first_index: Option<u64>,
    pub last_index: Option<u64>,
    /// Files the pass could not copy or rename.
    pub skipped: usize,
}

/// Completion report attached to the final batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionReport {
    pub fully_successful: bool,
    pub saved_files: usize,
    pub submitted_files: usize,
    pub reconstruction_found: bool,
    pub task_id: String,
    pub missing_batches: Vec<u32>,
}

/// Response to `POST /upload`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: BatchStatus,
    pub code: u16,
    pub message: String,
    pub session_id: String,
    pub batch_number: u32,
    pub total_batches: u32,
    pub saved_files: Vec<SavedFile>,
    pub failed_files: Vec<FailedFile>,
    pub saved_count: usize,
    pub failed_count: usize,
    pub total_count: usize,
    /// Successful files in the whole session; authoritative over client counts.
    pub server_confirmed_count: usize,
    pub canonical: Option<CanonicalSummary>,
    pub completion: Option<CompletionReport>,
}

/// Request body of `POST /upload/preflight`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreflightRequest {
    #[serde(rename = "type")]
    pub upload_type: String,
    pub value: String,
    pub project_name: String,
}

/// Response of `POST /upload/preflight`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreflightResponse {
    pub ready: bool,
    pub directory: String,
    pub writable: bool,
    pub existing_images: usize,
    pub message: String,
}
