use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::transport::OpenPolicy;

/// Caller-supplied parameters for one streaming session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartOptions {
    /// Opaque identifier of the recording (e.g., "rec-2025-10-28-etude-3")
    pub recording_id: String,

    /// File name the backend should use for the assembled recording
    pub audio_stream_file_name: Option<String>,

    /// Metronome lead-in beats before the first real frame
    pub countdown_beats: u32,

    /// Tempo of the lead-in
    pub bpm: f64,

    /// Server-supplied slice length; falls back to the configured default
    pub frame_duration_ms: Option<u64>,
}

impl StartOptions {
    pub fn new(recording_id: impl Into<String>) -> Self {
        Self {
            recording_id: recording_id.into(),
            audio_stream_file_name: None,
            countdown_beats: 0,
            bpm: 60.0,
            frame_duration_ms: None,
        }
    }

    pub fn with_countdown(mut self, beats: u32, bpm: f64) -> Self {
        self.countdown_beats = beats;
        self.bpm = bpm;
        self
    }

    /// Lead-in length: `beats * (60000 / bpm)`, zero for a non-positive tempo
    pub fn countdown_ms(&self) -> u64 {
        if self.countdown_beats == 0 || !self.bpm.is_finite() || self.bpm <= 0.0 {
            return 0;
        }
        (f64::from(self.countdown_beats) * (60_000.0 / self.bpm)).round() as u64
    }
}

/// Connection and timing settings shared by every session
#[derive(Debug, Clone)]
pub struct StreamingSettings {
    /// Primary streaming endpoint
    pub stream_url: String,

    /// Echo endpoint used for the preflight round-trip (skipped when `None`)
    pub echo_url: Option<String>,

    /// Liveness endpoint queried once per session (skipped when `None`)
    pub health_url: Option<String>,

    /// Default slice length
    pub frame_duration_ms: u64,

    /// Extra delay added to every reschedule
    pub send_slack_ms: u64,

    pub open_policy: OpenPolicy,

    pub preflight_timeout_ms: u64,

    pub resend_capacity: usize,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            stream_url: "ws://localhost:7070/ws/stream".to_string(),
            echo_url: None,
            health_url: None,
            frame_duration_ms: 250,
            send_slack_ms: 15,
            open_policy: OpenPolicy::default(),
            preflight_timeout_ms: 2000,
            resend_capacity: super::resend::DEFAULT_RESEND_CAPACITY,
        }
    }
}

impl StreamingSettings {
    pub fn from_config(config: &Config) -> Self {
        let server = &config.server;
        let streaming = &config.streaming;

        Self {
            stream_url: server.ws_url(&server.stream_path),
            echo_url: streaming
                .preflight
                .then(|| server.ws_url(&server.echo_path)),
            health_url: Some(server.http_url(&server.health_path)),
            frame_duration_ms: streaming.frame_duration_ms,
            send_slack_ms: streaming.send_slack_ms,
            open_policy: OpenPolicy {
                timeout_ms: streaming.connect_timeout_ms,
                retry_attempts: streaming.retry_attempts,
                backoff_ms: streaming.backoff_ms,
            },
            preflight_timeout_ms: streaming.preflight_timeout_ms,
            resend_capacity: streaming.resend_capacity,
        }
    }
}
