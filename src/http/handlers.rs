use super::state::AppState;
use crate::error::{CaptureError, SessionError};
use crate::session::{InteractionMode, SampleRate, SessionStats};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub mode: InteractionMode,
    pub stats: SessionStats,
}

#[derive(Debug, Deserialize)]
pub struct SetModeRequest {
    pub mode: InteractionMode,
}

#[derive(Debug, Deserialize)]
pub struct SetSampleRateRequest {
    /// Target rate in Hz
    pub sample_rate: u32,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /session/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(status_of(&state))
}

/// POST /session/start
/// Start streaming directly, bypassing the interaction mode
pub async fn start_session(State(state): State<AppState>) -> Response {
    let result = state.session().start().await;
    respond(&state, result)
}

/// POST /session/stop
pub async fn stop_session(State(state): State<AppState>) -> Json<StatusResponse> {
    state.session().stop().await;
    Json(status_of(&state))
}

/// POST /ptt/press
pub async fn press(State(state): State<AppState>) -> Response {
    let result = state.controller.press().await;
    respond(&state, result)
}

/// POST /ptt/release
pub async fn release(State(state): State<AppState>) -> Json<StatusResponse> {
    state.controller.release();
    Json(status_of(&state))
}

/// POST /ptt/activate
pub async fn activate(State(state): State<AppState>) -> Response {
    let result = state.controller.activate().await;
    respond(&state, result)
}

/// PUT /ptt/mode
pub async fn set_mode(
    State(state): State<AppState>,
    Json(req): Json<SetModeRequest>,
) -> Json<StatusResponse> {
    state.controller.set_mode(req.mode);
    Json(status_of(&state))
}

/// PUT /session/sample_rate
/// Pick the target rate for the next recording; refused while one runs
pub async fn set_sample_rate(
    State(state): State<AppState>,
    Json(req): Json<SetSampleRateRequest>,
) -> Response {
    let result = SampleRate::try_from(req.sample_rate)
        .map_err(SessionError::from)
        .and_then(|rate| state.session().set_sample_rate(rate));
    respond(&state, result)
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

fn status_of(state: &AppState) -> StatusResponse {
    let stats = state.session().stats();
    StatusResponse {
        status: stats.status.clone(),
        mode: state.controller.mode(),
        stats,
    }
}

fn respond(state: &AppState, result: Result<(), SessionError>) -> Response {
    match result {
        Ok(()) => {
            info!("Session {}", state.session().status());
            (StatusCode::OK, Json(status_of(state))).into_response()
        }
        Err(e) => {
            error!("Session request failed: {}", e);
            let code = match &e {
                SessionError::Config(_) => StatusCode::BAD_REQUEST,
                SessionError::Busy(_) => StatusCode::CONFLICT,
                SessionError::Capture(CaptureError::PermissionDenied(_)) => StatusCode::FORBIDDEN,
                SessionError::Capture(CaptureError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                code,
                Json(ErrorResponse {
                    error: e.to_string(),
                    status: state.session().status().to_string(),
                }),
            )
                .into_response()
        }
    }
}
