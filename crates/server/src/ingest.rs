//! Batch ingest pipeline.
//!
//! One call handles one batch: every file part is validated, deduplicated,
//! classified and persisted in request order, then the project is
//! canonicalized. On the last batch the completion signal fires.
//!
//! Per-file problems become [`FileRejection`]s in the response and never fail
//! the request. Only a malformed form or an unusable project directory does.

use crate::error::ApiResult;
use crate::form::{BatchForm, UploadedPart};
use crate::metrics;
use crate::state::AppState;
use fieldsync_core::hierarchy::{Classification, Placement, classify};
use fieldsync_core::naming::{
    base_file_name, extension_of, is_accepted_image, validate_component, with_name_suffix,
};
use fieldsync_core::upload::{
    BatchStatus, CanonicalSummary, CompletionReport, FailedFile, SavedFile,
};
use fieldsync_core::{
    BatchHeader, ContentHash, FileOutcome, FileStatus, ProjectDescription, SessionDefaults, SessionId,
    UploadResponse, UploadSession,
};
use fieldsync_metadata::MetadataError;
use fieldsync_storage::{Canonicalizer, ProjectLayout, StorageError};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Hex characters of the digest used in derived unique ids.
const DERIVED_ID_HEX_LEN: usize = 16;

/// Why a single file was not accepted.
#[derive(Debug, thiserror::Error)]
pub enum FileRejection {
    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("empty file")]
    Empty,

    #[error("unsupported file type: {0}")]
    UnsupportedExtension(String),

    #[error("not a readable image: {0}")]
    Corrupt(String),

    #[error("name {0} already holds other content")]
    NameConflict(String),

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("session store failure: {0}")]
    Metadata(#[from] MetadataError),
}

impl FileRejection {
    /// Metric label for the rejection.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidName(_) => "invalid_name",
            Self::Empty => "empty",
            Self::UnsupportedExtension(_) => "unsupported_extension",
            Self::Corrupt(_) => "corrupt",
            Self::NameConflict(_) => "name_conflict",
            Self::Storage(_) => "storage",
            Self::Metadata(_) => "metadata",
        }
    }
}

/// Everything the per-file steps need about the batch.
struct BatchContext<'a> {
    state: &'a AppState,
    session_id: &'a SessionId,
    layout: &'a ProjectLayout,
}

impl BatchContext<'_> {
    /// Path as reported to clients: relative to the storage root.
    fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(self.state.storage.root())
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

/// Ingest one batch.
#[instrument(
    skip(state, form),
    fields(session_id = tracing::field::Empty, batch = tracing::field::Empty)
)]
pub async fn ingest_batch(state: &AppState, form: BatchForm) -> ApiResult<UploadResponse> {
    let header = form.header()?;
    let project = form.project()?;
    let layout = state
        .storage
        .project(&header.upload_type, &header.upload_value, &project.name)?;
    let session_id = header.session_id.clone().unwrap_or_else(|| {
        SessionId::derive(&header.upload_type, &header.upload_value, &project.name)
    });

    let span = tracing::Span::current();
    span.record("session_id", session_id.as_str());
    span.record("batch", header.batch_number);

    metrics::BATCHES_RECEIVED.inc();
    info!(
        project = %project.name,
        vehicles = project.vehicles.len(),
        tracks = project.track_count(),
        total_batches = header.total_batches,
        files = form.parts.len(),
        retry_count = header.retry_count,
        "batch received"
    );

    let session = state
        .sessions
        .get_or_create(&session_id, session_defaults(&header, &project))
        .await?;
    state.storage.create_dir_all(layout.dir()).await?;
    begin_batch(state, &header, &session, &layout).await?;

    let ctx = BatchContext {
        state,
        session_id: &session_id,
        layout: &layout,
    };
    let mut saved_files = Vec::new();
    let mut failed_files = Vec::new();
    for part in &form.parts {
        let unique_id = unique_id_for(&form, part);
        match process_file(&ctx, &form, part, &unique_id).await {
            Ok(saved) => saved_files.push(saved),
            Err(rejection) => {
                warn!(
                    file = %part.file_name,
                    unique_id = %unique_id,
                    error = %rejection,
                    "file rejected"
                );
                metrics::record_file_failure(rejection.reason());
                let status = FileStatus::failure(&part.file_name, rejection.to_string());
                if let Err(e) = state
                    .sessions
                    .record_file_outcome(&session_id, &unique_id, status)
                    .await
                {
                    warn!(error = %e, "failed to record file failure");
                }
                failed_files.push(FailedFile {
                    file_name: part.file_name.clone(),
                    unique_id,
                    error: rejection.to_string(),
                });
            }
        }
    }

    let canonical = canonicalize(state, &layout).await;

    let session = state
        .sessions
        .get_or_create(&session_id, session_defaults(&header, &project))
        .await?;
    let completion = if header.is_last() {
        Some(complete(state, &header, &session, &layout).await)
    } else {
        None
    };

    let saved_count = saved_files.len();
    let total_count = form.parts.len();
    info!(
        saved = saved_count,
        failed = failed_files.len(),
        confirmed = session.success_count(),
        "batch processed"
    );

    Ok(UploadResponse {
        status: BatchStatus::from_counts(saved_count, total_count),
        code: 200,
        message: format!("Saved {saved_count} of {total_count} files"),
        session_id: session_id.to_string(),
        batch_number: header.batch_number,
        total_batches: header.total_batches,
        failed_count: failed_files.len(),
        saved_files,
        failed_files,
        saved_count,
        total_count,
        server_confirmed_count: session.success_count(),
        canonical,
        completion,
    })
}

fn session_defaults(header: &BatchHeader, project: &ProjectDescription) -> SessionDefaults {
    SessionDefaults {
        project_name: project.name.clone(),
        upload_type: header.upload_type.clone(),
        upload_value: header.upload_value.clone(),
        total_batches: header.total_batches,
    }
}

/// Record the batch in its session. A fresh batch 1 clears the project's
/// images and restarts the session.
async fn begin_batch(
    state: &AppState,
    header: &BatchHeader,
    session: &UploadSession,
    layout: &ProjectLayout,
) -> ApiResult<()> {
    let is_retry_of_seen_first =
        header.retry_count > 0 && session.batches_seen.contains(&1);
    let restart = header.is_first() && !is_retry_of_seen_first;

    if restart {
        let _guard = state.locks.lock(layout.dir()).await;
        let cleared = state.storage.clear_images(layout).await?;
        let forgotten = state.hash_index.forget_under(layout.dir()).await?;
        info!(cleared, forgotten, "first batch cleared project images");
    } else if header.is_first() {
        debug!("retried first batch, keeping stored images");
    }

    state
        .sessions
        .note_batch(
            &session.id,
            header.batch_number,
            header.total_batches,
            restart,
        )
        .await?;
    Ok(())
}

/// Client-supplied unique id, or `<file name>#<digest prefix>`.
fn unique_id_for(form: &BatchForm, part: &UploadedPart) -> String {
    match form.unique_id(part.index) {
        Some(id) => id.to_string(),
        None => format!(
            "{}#{}",
            base_file_name(&part.file_name),
            part.digest.short_hex(DERIVED_ID_HEX_LEN)
        ),
    }
}

/// Run every per-file step for one part.
async fn process_file(
    ctx: &BatchContext<'_>,
    form: &BatchForm,
    part: &UploadedPart,
    unique_id: &str,
) -> Result<SavedFile, FileRejection> {
    let state = ctx.state;
    let file_name = validate_component(base_file_name(&part.file_name).trim())
        .map_err(|e| FileRejection::InvalidName(e.to_string()))?
        .to_string();
    let saved = |stored_path: String, outcome: FileOutcome| SavedFile {
        file_name: file_name.clone(),
        unique_id: unique_id.to_string(),
        stored_path,
        outcome,
    };

    if part.data.is_empty() {
        return Err(FileRejection::Empty);
    }
    if !is_accepted_image(&file_name) {
        return Err(FileRejection::UnsupportedExtension(
            extension_of(&file_name).unwrap_or_else(|| "none".to_string()),
        ));
    }

    // A retried unique id that already succeeded is not touched again.
    if let Some(status) = state.sessions.file_status(ctx.session_id, unique_id).await?
        && status.is_success
    {
        debug!(file = %file_name, "already processed in this session");
        metrics::FILES_ALREADY_PROCESSED.inc();
        state.sessions.touch(ctx.session_id).await?;
        return Ok(saved(
            status.file_path.unwrap_or_default(),
            FileOutcome::AlreadyProcessed,
        ));
    }

    if let Some(existing) = lookup_live(ctx, part).await? {
        let stored_path = ctx.display_path(&existing);
        debug!(file = %file_name, existing = %stored_path, "duplicate content");
        metrics::FILES_DEDUPLICATED.inc();
        state
            .sessions
            .record_file_outcome(
                ctx.session_id,
                unique_id,
                FileStatus::success(&file_name, &stored_path),
            )
            .await?;
        return Ok(saved(stored_path, FileOutcome::Duplicate));
    }

    if state.config.server.verify_image_decode {
        verify_image(part).await?;
    }

    let classification = Classification::from_raw(form.file_info(part.index));
    if let Classification::Unrecognized { reason, .. } = &classification {
        warn!(file = %file_name, reason = %reason, "metadata unusable, placing at project level");
        metrics::FILES_UNCLASSIFIED.inc();
    }
    let placement = classify(&classification);

    let (path, outcome) = {
        let _guard = state.locks.lock(ctx.layout.dir()).await;
        store_copies(ctx, part, &file_name, &placement).await?
    };

    let stored_path = ctx.display_path(&path);
    state
        .sessions
        .record_file_outcome(
            ctx.session_id,
            unique_id,
            FileStatus::success(&file_name, &stored_path),
        )
        .await?;
    Ok(saved(stored_path, outcome))
}

/// Hash index hit whose file still exists. Stale entries are dropped.
async fn lookup_live(
    ctx: &BatchContext<'_>,
    part: &UploadedPart,
) -> Result<Option<PathBuf>, FileRejection> {
    let Some(existing) = ctx.state.hash_index.lookup(&part.digest).await? else {
        return Ok(None);
    };
    if ctx.state.storage.exists(&existing).await? {
        return Ok(Some(existing));
    }
    debug!(path = %existing.display(), "dropping stale hash index entry");
    ctx.state.hash_index.forget(&part.digest, &existing).await?;
    metrics::HASH_ENTRIES_PRUNED.inc();
    Ok(None)
}

/// Fully decode the payload off the async runtime.
async fn verify_image(part: &UploadedPart) -> Result<(), FileRejection> {
    let data = part.data.clone();
    tokio::task::spawn_blocking(move || image::load_from_memory(&data).map(|_| ()))
        .await
        .map_err(|e| FileRejection::Corrupt(format!("decode task failed: {e}")))?
        .map_err(|e| FileRejection::Corrupt(e.to_string()))
}

/// Hex characters of the digest appended to a name taken by other content.
const CONFLICT_SUFFIX_HEX_LEN: usize = 8;

/// Where a file goes at its hierarchy level.
enum Slot {
    /// Nothing is stored under this name yet.
    Free(PathBuf),
    /// The same bytes are already stored under this name.
    Holding(PathBuf),
}

/// Pick the stored name for a file. Confirmed content is never replaced: a
/// name holding other bytes falls back to `<stem>_<digest prefix>.<ext>`.
async fn choose_slot(
    ctx: &BatchContext<'_>,
    part: &UploadedPart,
    file_name: &str,
    level_dir: &Path,
) -> Result<Slot, FileRejection> {
    let suffixed = with_name_suffix(
        file_name,
        &part.digest.short_hex(CONFLICT_SUFFIX_HEX_LEN),
    );
    for name in [file_name, suffixed.as_str()] {
        let path = level_dir.join(name);
        match ctx.state.storage.read(&path).await? {
            None => return Ok(Slot::Free(path)),
            Some(existing) if ContentHash::compute(&existing) == part.digest => {
                return Ok(Slot::Holding(path));
            }
            Some(_) => debug!(path = %path.display(), "name taken by other content"),
        }
    }
    Err(FileRejection::NameConflict(file_name.to_string()))
}

/// Write the type-directory copy and the prefixed unified copy, then claim
/// the digest. The caller holds the project lock.
async fn store_copies(
    ctx: &BatchContext<'_>,
    part: &UploadedPart,
    file_name: &str,
    placement: &Placement,
) -> Result<(PathBuf, FileOutcome), FileRejection> {
    let state = ctx.state;
    let level_dir = ctx.layout.level_dir(&placement.hierarchy);

    let type_path = match choose_slot(ctx, part, file_name, &level_dir).await? {
        Slot::Free(path) => path,
        Slot::Holding(path) => {
            // The index lost track of these bytes; claim them again.
            state.hash_index.record(part.digest, path.clone()).await?;
            metrics::FILES_DEDUPLICATED.inc();
            return Ok((path, FileOutcome::Duplicate));
        }
    };
    let stored_name = type_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    if stored_name != file_name {
        info!(
            file = %file_name,
            stored_as = %stored_name,
            "name already holds other content, storing under a suffixed name"
        );
    }
    let unified_path = ctx
        .layout
        .unified_dir()
        .join(placement.unified_name(&stored_name));

    state.storage.write_atomic(&type_path, &part.data).await?;
    if let Err(e) = state.storage.write_atomic(&unified_path, &part.data).await {
        if let Err(cleanup) = state.storage.remove(&type_path).await {
            warn!(error = %cleanup, "failed to remove partial copy");
        }
        return Err(e.into());
    }

    if !state
        .hash_index
        .record(part.digest, type_path.clone())
        .await?
        && let Some(winner) = state.hash_index.lookup(&part.digest).await?
        && winner != type_path
    {
        // Identical bytes were stored concurrently elsewhere; keep theirs.
        state.storage.remove(&type_path).await?;
        state.storage.remove(&unified_path).await?;
        metrics::FILES_DEDUPLICATED.inc();
        return Ok((winner, FileOutcome::Duplicate));
    }

    metrics::FILES_STORED.inc();
    metrics::BYTES_STORED.inc_by(part.data.len() as u64);
    debug!(
        path = %type_path.display(),
        level = placement.hierarchy.kind(),
        "stored file"
    );
    Ok((type_path, FileOutcome::Stored))
}

/// Canonicalize the project. Failures are logged; the batch still succeeds.
async fn canonicalize(state: &AppState, layout: &ProjectLayout) -> Option<CanonicalSummary> {
    let _guard = state.locks.lock(layout.dir()).await;
    let timer = metrics::CANONICALIZE_DURATION.start_timer();
    let result = Canonicalizer::new(&state.storage, &state.config.canonical)
        .run(layout)
        .await;
    timer.observe_duration();

    match result {
        Ok(outcome) => Some(outcome.summary),
        Err(e) => {
            warn!(error = %e, "canonicalization failed");
            metrics::CANONICALIZE_FAILURES.inc();
            None
        }
    }
}

/// Completion signal for the last batch.
async fn complete(
    state: &AppState,
    header: &BatchHeader,
    session: &UploadSession,
    layout: &ProjectLayout,
) -> CompletionReport {
    let saved_files = session.success_count();
    let submitted_files = header
        .expected_files_count
        .map(|n| n as usize)
        .unwrap_or(session.files.len());
    let fully_successful = saved_files == submitted_files;

    let missing_batches = session.missing_batches();
    if !missing_batches.is_empty() {
        warn!(missing = ?missing_batches, "last batch arrived before earlier batches");
    }

    let task_id = layout.task_id();
    let reconstruction_found = if state.config.reconstruction.enabled {
        match state
            .watcher
            .check_and_process(&task_id, layout.project_name(), &layout.unified_dir())
            .await
        {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "reconstruction watcher failed");
                false
            }
        }
    } else {
        false
    };

    metrics::record_completion(fully_successful);
    info!(
        upload_type = layout.upload_type(),
        upload_value = layout.upload_value(),
        saved_files,
        submitted_files,
        fully_successful,
        reconstruction_found,
        "upload complete"
    );

    CompletionReport {
        fully_successful,
        saved_files,
        submitted_files,
        reconstruction_found,
        task_id,
        missing_batches,
    }
}
