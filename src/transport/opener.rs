use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::socket::{Socket, SocketEvent, Transport};
use crate::error::{Result, StreamError};

/// Interval of the readiness poll that backs up missed open events
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Retry policy for opening a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenPolicy {
    pub timeout_ms: u64,
    /// Total attempts; values below 1 behave as 1
    pub retry_attempts: u32,
    /// Delay before attempt `n + 1` is `backoff_ms * n`
    pub backoff_ms: u64,
}

impl Default for OpenPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            retry_attempts: 3,
            backoff_ms: 500,
        }
    }
}

/// What proved the connection usable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadySignal {
    OpenEvent,
    FirstMessage,
    ReadyPoll,
}

/// A connection that passed the readiness check
pub struct OpenedConnection {
    pub socket: Box<dyn Socket>,
    /// Text received before readiness was declared; deliver it before reading further
    pub early_message: Option<String>,
    pub signal: ReadySignal,
    pub attempts: u32,
}

/// Opens connections with a bounded timeout and linear-backoff retry
#[derive(Clone)]
pub struct ConnectionOpener {
    transport: Arc<dyn Transport>,
}

impl ConnectionOpener {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn open(&self, url: &str, policy: OpenPolicy) -> Result<OpenedConnection> {
        let attempts = policy.retry_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.open_once(url, policy.timeout_ms).await {
                Ok(mut opened) => {
                    opened.attempts = attempt;
                    info!(
                        "Connected to {} (attempt {}/{}, via {:?})",
                        url, attempt, attempts, opened.signal
                    );
                    return Ok(opened);
                }
                Err(e) => {
                    warn!("Connect attempt {}/{} to {} failed: {}", attempt, attempts, url, e);
                    last_error = Some(e);
                }
            }

            if attempt < attempts {
                let delay = Duration::from_millis(policy.backoff_ms * u64::from(attempt));
                debug!("Retrying {} in {:?}", url, delay);
                sleep(delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| StreamError::Connect {
            url: url.to_string(),
            reason: "no attempts made".to_string(),
        }))
    }

    async fn open_once(&self, url: &str, timeout_ms: u64) -> Result<OpenedConnection> {
        let mut socket = self.transport.dial(url).await?;
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        let mut poll = tokio::time::interval(READY_POLL_INTERVAL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let (signal, early_message) = loop {
            tokio::select! {
                _ = sleep_until(deadline) => {
                    socket.close().await;
                    return Err(StreamError::ConnectTimeout {
                        url: url.to_string(),
                        timeout_ms,
                    });
                }
                event = socket.next_event() => match event {
                    Some(SocketEvent::Opened) => break (ReadySignal::OpenEvent, None),
                    Some(SocketEvent::Text(text)) => break (ReadySignal::FirstMessage, Some(text)),
                    Some(SocketEvent::Binary(bytes)) => {
                        debug!("Discarding {} binary bytes received while opening", bytes.len());
                        break (ReadySignal::FirstMessage, None);
                    }
                    Some(SocketEvent::Closed(reason)) => {
                        socket.close().await;
                        return Err(StreamError::Connect {
                            url: url.to_string(),
                            reason: reason.unwrap_or_else(|| "closed while opening".to_string()),
                        });
                    }
                    None => {
                        socket.close().await;
                        return Err(StreamError::Connect {
                            url: url.to_string(),
                            reason: "event stream ended while opening".to_string(),
                        });
                    }
                },
                _ = poll.tick() => {
                    if socket.is_open() {
                        break (ReadySignal::ReadyPoll, None);
                    }
                }
            }
        };

        Ok(OpenedConnection {
            socket,
            early_message,
            signal,
            attempts: 1,
        })
    }
}
