//! HTTP API server for local control of the streaming client
//!
//! This module provides a REST API for driving a streaming session:
//! - POST /stream/start - Start streaming a recording
//! - POST /stream/stop - Stop the active session
//! - GET /stream/status - Query session statistics
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{StartStreamRequest, StartStreamResponse, StopStreamResponse};
pub use routes::create_router;
pub use state::AppState;
