//! Upload handlers: batch ingest, session status and directory preflight.

use crate::error::{ApiError, ApiResult};
use crate::form::BatchForm;
use crate::ingest::ingest_batch;
use crate::metrics::{ACTIVE_SESSIONS, BATCH_DURATION};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Multipart, Path, State};
use fieldsync_core::SessionId;
use fieldsync_core::session::SessionStatusResponse;
use fieldsync_core::upload::{PreflightRequest, PreflightResponse, UploadResponse};
use tracing::{instrument, warn};

/// POST /upload - Ingest one batch of a multi-batch upload.
///
/// Returns 200 whenever the batch could be processed, even if some or all of
/// its files were rejected; the body lists saved and failed files.
#[instrument(skip(state, multipart))]
pub async fn upload_batch(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let timer = BATCH_DURATION.start_timer();
    let form = BatchForm::read(&mut multipart, state.config.server.max_files_per_batch).await?;
    let response = ingest_batch(&state, form).await?;
    timer.observe_duration();

    if let Ok(active) = state.sessions.len().await {
        ACTIVE_SESSIONS.set(active as i64);
    }
    Ok(Json(response))
}

/// GET /upload/session/{session_id} - Progress of one upload session.
#[instrument(skip(state))]
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionStatusResponse>> {
    let id = SessionId::parse(&session_id)?;
    let session = state
        .sessions
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("session {id}")))?;
    Ok(Json(SessionStatusResponse::from(&session)))
}

/// POST /upload/preflight - Prepare and probe a project directory.
///
/// An unwritable directory is reported with `ready: false` rather than as
/// an error so clients can show the reason before uploading.
#[instrument(skip(state, request), fields(project = %request.project_name))]
pub async fn preflight(
    State(state): State<AppState>,
    Json(request): Json<PreflightRequest>,
) -> ApiResult<Json<PreflightResponse>> {
    let layout = state.storage.project(
        request.upload_type.trim(),
        request.value.trim(),
        request.project_name.trim(),
    )?;
    let directory = layout.dir().display().to_string();

    if let Err(e) = state.storage.probe_writable(layout.dir()).await {
        warn!(error = %e, "project directory not writable");
        return Ok(Json(PreflightResponse {
            ready: false,
            directory,
            writable: false,
            existing_images: 0,
            message: format!("Directory is not writable: {e}"),
        }));
    }
    state.storage.create_dir_all(&layout.unified_dir()).await?;

    let mut existing_images = 0;
    for dir in state.storage.level_dirs(&layout).await? {
        existing_images += state.storage.list_images(&dir).await?.len();
    }

    Ok(Json(PreflightResponse {
        ready: true,
        directory,
        writable: true,
        existing_images,
        message: format!("Ready ({existing_images} images already stored)"),
    }))
}
