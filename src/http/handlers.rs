use super::state::AppState;
use crate::error::StreamError;
use crate::session::{SessionState, SessionStats, StartOptions};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StartStreamRequest {
    /// Optional recording ID (if not provided, generate UUID)
    pub recording_id: Option<String>,

    /// File name the backend should store the recording under
    pub audio_stream_file_name: Option<String>,

    /// Metronome lead-in beats (default: 0)
    pub countdown_beats: u32,

    /// Lead-in tempo (default: 60)
    pub bpm: Option<f64>,

    /// Slice length override in milliseconds
    pub frame_duration_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartStreamResponse {
    pub recording_id: String,
    pub status: SessionState,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopStreamResponse {
    pub status: SessionState,
    pub message: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /stream/start
/// Open the backend connection and begin streaming
pub async fn start_stream(
    State(state): State<AppState>,
    Json(req): Json<StartStreamRequest>,
) -> impl IntoResponse {
    let controller = &state.controller;

    let current = controller.state();
    if current != SessionState::Idle {
        return (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: format!("Streaming is already {:?}", current),
            }),
        )
            .into_response();
    }

    let recording_id = req
        .recording_id
        .unwrap_or_else(|| format!("rec-{}", uuid::Uuid::new_v4()));

    info!("Starting stream for recording: {}", recording_id);

    let mut options = StartOptions::new(recording_id.clone())
        .with_countdown(req.countdown_beats, req.bpm.unwrap_or(60.0));
    options.audio_stream_file_name = req.audio_stream_file_name;
    options.frame_duration_ms = req.frame_duration_ms;

    match controller.start(options).await {
        Ok(()) => (
            StatusCode::OK,
            Json(StartStreamResponse {
                recording_id: recording_id.clone(),
                status: controller.state(),
                message: format!("Streaming started for recording {}", recording_id),
            }),
        )
            .into_response(),
        Err(StreamError::Cancelled) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "Start cancelled by a concurrent stop".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to start streaming: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to start streaming: {}", e),
                }),
            )
                .into_response()
        }
    }
}

/// POST /stream/stop
/// Stop the active session (no-op when idle)
pub async fn stop_stream(State(state): State<AppState>) -> impl IntoResponse {
    let controller = &state.controller;

    match controller.stop().await {
        Ok(()) => {
            info!("Stream stopped");
            (
                StatusCode::OK,
                Json(StopStreamResponse {
                    status: controller.state(),
                    message: "Streaming stopped".to_string(),
                    stats: controller.stats(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to stop streaming: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to stop streaming: {}", e),
                }),
            )
                .into_response()
        }
    }
}

/// GET /stream/status
pub async fn stream_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.controller.stats()))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
