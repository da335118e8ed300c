use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub streaming: StreamingConfig,
    pub recording: RecordingConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "practice-stream".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 7171,
        }
    }
}

/// Analysis backend endpoints
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `http://` or `https://` origin of the backend
    pub base_url: String,
    pub stream_path: String,
    pub echo_path: String,
    pub health_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7070".to_string(),
            stream_path: "/ws/stream".to_string(),
            echo_path: "/ws/echo".to_string(),
            health_path: "/health".to_string(),
        }
    }
}

impl ServerConfig {
    /// HTTP URL for `path` on the backend
    pub fn http_url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// WebSocket URL for `path`, derived from the HTTP origin
    pub fn ws_url(&self, path: &str) -> String {
        let base = self.base_url.trim();
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        join_url(&base, path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub frame_duration_ms: u64,
    pub send_slack_ms: u64,
    pub connect_timeout_ms: u64,
    pub retry_attempts: u32,
    pub backoff_ms: u64,
    pub resend_capacity: usize,
    /// Run the health probe and echo round-trip before each session
    pub preflight: bool,
    pub preflight_timeout_ms: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            frame_duration_ms: 250,
            send_slack_ms: 15,
            connect_timeout_ms: 5000,
            retry_attempts: 3,
            backoff_ms: 500,
            resend_capacity: 128,
            preflight: true,
            preflight_timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub slice_dir: String,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            slice_dir: "~/.practice-stream/slices".to_string(),
            sample_rate: 16000,
            channels: 1,
        }
    }
}

impl Config {
    /// Load `path` (extension optional) layered under `PRACTICE_STREAM__*` env overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("PRACTICE_STREAM").separator("__"))
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}
