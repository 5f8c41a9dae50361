//! Upload session types and lifecycle.
//!
//! A session spans every batch of one logical multi-batch upload. It records
//! the outcome of each file by the file's unique id so that retried batches
//! converge instead of double counting.

use crate::naming::sanitize_identifier;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use time::OffsetDateTime;

/// Maximum accepted length of a client-supplied session id.
const MAX_SESSION_ID_LEN: usize = 256;

/// Identifier of a logical multi-batch upload.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Parse a client-supplied session id.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(crate::Error::InvalidBatch("empty session id".to_string()));
        }
        if s.len() > MAX_SESSION_ID_LEN {
            return Err(crate::Error::InvalidBatch(format!(
                "session id longer than {MAX_SESSION_ID_LEN} bytes"
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// Derive a session id from the upload target when the client sent none.
    pub fn derive(upload_type: &str, upload_value: &str, project_name: &str) -> Self {
        Self(sanitize_identifier(&format!(
            "{upload_type}_{upload_value}_{project_name}"
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a successful file was accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcome {
    /// Bytes were written to the project tree.
    Stored,
    /// Identical bytes were already stored; nothing was copied.
    Duplicate,
    /// The unique id already succeeded in this session.
    AlreadyProcessed,
}

impl FileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::Duplicate => "duplicate",
            Self::AlreadyProcessed => "already_processed",
        }
    }
}

/// Recorded result of one file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatus {
    pub file_name: String,
    /// Storage path of the accepted copy (absent on failure).
    pub file_path: Option<String>,
    pub is_success: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub process_time: OffsetDateTime,
    pub error_message: Option<String>,
}

impl FileStatus {
    /// A successful outcome pointing at the accepted copy.
    pub fn success(file_name: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            file_path: Some(file_path.into()),
            is_success: true,
            process_time: OffsetDateTime::now_utc(),
            error_message: None,
        }
    }

    /// A failed outcome with the reason.
    pub fn failure(file_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            file_path: None,
            is_success: false,
            process_time: OffsetDateTime::now_utc(),
            error_message: Some(error.into()),
        }
    }
}

/// Values used when a batch references a session that does not exist yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionDefaults {
    pub project_name: String,
    pub upload_type: String,
    pub upload_value: String,
    pub total_batches: u32,
}

/// Server-side state of one logical upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadSession {
    pub id: SessionId,
    pub project_name: String,
    pub upload_type: String,
    pub upload_value: String,
    /// File outcomes keyed by the file's unique id.
    pub files: BTreeMap<String, FileStatus>,
    /// Batch numbers received since the last batch 1.
    pub batches_seen: BTreeSet<u32>,
    /// Batch count declared by the client on its latest batch.
    pub total_batches: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity: OffsetDateTime,
}

impl UploadSession {
    /// Create an empty session.
    pub fn new(id: SessionId, defaults: SessionDefaults) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            project_name: defaults.project_name,
            upload_type: defaults.upload_type,
            upload_value: defaults.upload_value,
            files: BTreeMap::new(),
            batches_seen: BTreeSet::new(),
            total_batches: defaults.total_batches,
            created_at: now,
            last_activity: now,
        }
    }

    /// Whether `unique_id` has already been accepted.
    pub fn is_file_succeeded(&self, unique_id: &str) -> bool {
        self.files.get(unique_id).is_some_and(|s| s.is_success)
    }

    /// Record the outcome of a file, replacing any earlier outcome.
    pub fn record(&mut self, unique_id: impl Into<String>, status: FileStatus) {
        self.files.insert(unique_id.into(), status);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.last_activity = OffsetDateTime::now_utc();
    }

    /// Note that a batch arrived.
    pub fn note_batch(&mut self, batch_number: u32, total_batches: u32) {
        self.batches_seen.insert(batch_number);
        self.total_batches = total_batches;
        self.touch();
    }

    /// Start a fresh upload cycle: forget per-file outcomes and seen batches.
    /// Used when batch 1 clears the project tree.
    pub fn restart(&mut self) {
        self.files.clear();
        self.batches_seen.clear();
        self.touch();
    }

    /// Batches in `1..=total_batches` that have not been seen.
    pub fn missing_batches(&self) -> Vec<u32> {
        (1..=self.total_batches)
            .filter(|n| !self.batches_seen.contains(n))
            .collect()
    }

    pub fn success_count(&self) -> usize {
        self.files.values().filter(|s| s.is_success).count()
    }

    pub fn failure_count(&self) -> usize {
        self.files.values().filter(|s| !s.is_success).count()
    }

    /// Whether the session saw no activity since `cutoff`.
    pub fn is_idle_since(&self, cutoff: OffsetDateTime) -> bool {
        self.last_activity < cutoff
    }
}

/// Response from querying a session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub project_name: String,
    pub success_count: usize,
    pub failure_count: usize,
    pub total_count: usize,
    pub batches_seen: Vec<u32>,
    pub total_batches: u32,
    pub missing_batches: Vec<u32>,
    pub last_activity: String,
}

impl From<&UploadSession> for SessionStatusResponse {
    fn from(session: &UploadSession) -> Self {
        Self {
            session_id: session.id.to_string(),
            project_name: session.project_name.clone(),
            success_count: session.success_count(),
            failure_count: session.failure_count(),
            total_count: session.files.len(),
            batches_seen: session.batches_seen.iter().copied().collect(),
            total_batches: session.total_batches,
            missing_batches: session.missing_batches(),
            last_activity: session
                .last_activity
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default(),
        }
    }
}
