// Best-effort reachability checks run before the primary connection opens.
// Failures here are reported to the caller but never abort a session start.

use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::debug;

use crate::error::{Result, StreamError};
use crate::transport::{ConnectionOpener, OpenPolicy, SocketEvent};

const PING: &str = "ping";

/// Query the backend's liveness endpoint, returning its body
pub async fn probe_health(url: &str, timeout_ms: u64) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .map_err(|e| StreamError::Connect {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| StreamError::Connect {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if !status.is_success() {
        return Err(StreamError::Connect {
            url: url.to_string(),
            reason: format!("health check returned {}", status),
        });
    }

    Ok(body)
}

/// Round-trip a `ping` through the echo endpoint
///
/// The echo server may greet with a banner first; anything that is not the
/// echoed ping is skipped. Returns the measured round-trip time.
pub async fn echo_round_trip(
    opener: &ConnectionOpener,
    url: &str,
    timeout_ms: u64,
) -> Result<Duration> {
    let policy = OpenPolicy {
        timeout_ms,
        retry_attempts: 1,
        backoff_ms: 0,
    };
    let opened = opener.open(url, policy).await?;
    let mut socket = opened.socket;

    if let Some(banner) = &opened.early_message {
        debug!("Echo banner: {}", banner);
    }

    let sent_at = Instant::now();
    socket.send_text(PING.to_string()).await?;

    let wait = async {
        loop {
            match socket.next_event().await {
                Some(SocketEvent::Text(text)) if text == PING => return Ok(sent_at.elapsed()),
                Some(SocketEvent::Text(text)) => debug!("Echo endpoint said: {}", text),
                Some(SocketEvent::Opened) | Some(SocketEvent::Binary(_)) => {}
                Some(SocketEvent::Closed(reason)) => {
                    return Err(StreamError::Connect {
                        url: url.to_string(),
                        reason: reason.unwrap_or_else(|| "echo connection closed".to_string()),
                    })
                }
                None => {
                    return Err(StreamError::Connect {
                        url: url.to_string(),
                        reason: "echo connection ended".to_string(),
                    })
                }
            }
        }
    };

    let result = match timeout(Duration::from_millis(timeout_ms), wait).await {
        Ok(result) => result,
        Err(_) => Err(StreamError::ConnectTimeout {
            url: url.to_string(),
            timeout_ms,
        }),
    };

    socket.close().await;
    result
}
