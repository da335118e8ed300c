//! Error types for the streaming client

use thiserror::Error;

/// Errors surfaced by the streaming session and its collaborators
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Connection to {url} timed out after {timeout_ms}ms")]
    ConnectTimeout { url: String, timeout_ms: u64 },

    #[error("Connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("Capture error: {0}")]
    Capture(#[from] RecorderError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Start cancelled by stop")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Recorder handle errors
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Recording {0} is already stopped")]
    AlreadyStopped(u64),

    #[error("Audio backend error: {0}")]
    Backend(String),

    #[error("Failed to write slice: {0}")]
    Write(String),
}

/// Base64 payload errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
}

/// Inbound message errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("Message has no MESSAGE_TYPE")]
    MissingType,

    #[error("Unknown message type: {0}")]
    UnknownType(String),
}

impl RecorderError {
    /// Stopping a handle that already finished is an expected race during shutdown
    pub fn is_already_stopped(&self) -> bool {
        matches!(self, RecorderError::AlreadyStopped(_))
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
