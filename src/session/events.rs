use serde::{Deserialize, Serialize};

/// Lifecycle of the streaming controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Opening,
    Streaming,
    Stopping,
}

/// Notifications published to whoever drives the session (UI, CLI, HTTP API)
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    StartFailed { reason: String },
    CountdownSlice { remaining_ms: i64 },
    BoundaryReached,
    FrameSent { frame_no: u64, bytes: usize },
    FrameResent { frame_no: u64 },
    /// Server asked for a frame that is no longer buffered
    ResendMiss { frame_no: u64 },
    TickFailed { reason: String },
    ServerError { reason: String },
    ConnectionLost { reason: Option<String> },
}
