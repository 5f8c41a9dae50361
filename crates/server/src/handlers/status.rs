//! Server status handler.

use crate::completion::BrokerIdentity;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Broker section of the status response.
#[derive(Debug, Serialize)]
pub struct BrokerStatusResponse {
    pub connected: bool,
    #[serde(flatten)]
    pub identity: BrokerIdentity,
}

/// Reconstruction section of the status response.
#[derive(Debug, Serialize)]
pub struct ReconstructionStatusResponse {
    pub enabled: bool,
    pub watch_root: String,
}

/// Server status response.
#[derive(Debug, Serialize)]
pub struct ServerStatusResponse {
    pub version: &'static str,
    pub storage_root: String,
    pub active_sessions: usize,
    pub broker: BrokerStatusResponse,
    pub reconstruction: ReconstructionStatusResponse,
}

/// GET /status - Broker connectivity and server configuration overview.
pub async fn server_status(State(state): State<AppState>) -> ApiResult<Json<ServerStatusResponse>> {
    let connected = state.broker.is_connected().await;
    let active_sessions = state.sessions.len().await?;

    Ok(Json(ServerStatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        storage_root: state.storage.root().display().to_string(),
        active_sessions,
        broker: BrokerStatusResponse {
            connected,
            identity: state.broker.identity(),
        },
        reconstruction: ReconstructionStatusResponse {
            enabled: state.config.reconstruction.enabled,
            watch_root: state.config.reconstruction.watch_root.display().to_string(),
        },
    }))
}
