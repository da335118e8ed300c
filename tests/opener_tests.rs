// Tests for connection opening: readiness signals, timeout, and retry backoff

mod common;

use common::{DialMode, FakeTransport};
use practice_stream::error::StreamError;
use practice_stream::transport::{ConnectionOpener, OpenPolicy, ReadySignal};
use std::time::Duration;
use tokio::time::Instant;

const URL: &str = "ws://localhost:7070/ws/stream";

fn policy(timeout_ms: u64, retry_attempts: u32, backoff_ms: u64) -> OpenPolicy {
    OpenPolicy {
        timeout_ms,
        retry_attempts,
        backoff_ms,
    }
}

#[tokio::test(start_paused = true)]
async fn test_open_event_marks_ready() {
    let transport = FakeTransport::new(DialMode::OpenEvent);
    let opener = ConnectionOpener::new(transport.clone());

    let opened = opener.open(URL, OpenPolicy::default()).await.unwrap();

    assert_eq!(opened.signal, ReadySignal::OpenEvent);
    assert_eq!(opened.attempts, 1);
    assert!(opened.early_message.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_first_message_marks_ready_and_is_retained() {
    let transport = FakeTransport::new(DialMode::Banner("server ready".to_string()));
    let opener = ConnectionOpener::new(transport.clone());

    let opened = opener.open(URL, OpenPolicy::default()).await.unwrap();

    assert_eq!(opened.signal, ReadySignal::FirstMessage);
    assert_eq!(opened.early_message.as_deref(), Some("server ready"));
}

#[tokio::test(start_paused = true)]
async fn test_ready_poll_catches_missed_open_event() {
    let transport = FakeTransport::new(DialMode::SilentOpen);
    let opener = ConnectionOpener::new(transport.clone());
    let started = Instant::now();

    let opened = opener.open(URL, OpenPolicy::default()).await.unwrap();

    assert_eq!(opened.signal, ReadySignal::ReadyPoll);
    assert!(started.elapsed() < Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_closes_and_fails() {
    let transport = FakeTransport::new(DialMode::Never);
    let opener = ConnectionOpener::new(transport.clone());
    let started = Instant::now();

    let result = opener.open(URL, policy(1000, 1, 500)).await;

    assert!(matches!(
        result,
        Err(StreamError::ConnectTimeout { timeout_ms: 1000, .. })
    ));
    assert!(started.elapsed() >= Duration::from_millis(1000));
    assert_eq!(transport.dial_count(), 1);
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retries_with_linear_backoff() {
    let transport = FakeTransport::new(DialMode::Never);
    let opener = ConnectionOpener::new(transport.clone());
    let started = Instant::now();

    let result = opener.open(URL, policy(1000, 3, 500)).await;

    // 3 timeouts plus 500ms and 1000ms of backoff
    assert!(result.is_err());
    assert_eq!(transport.dial_count(), 3);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(4500) && elapsed < Duration::from_millis(4600));
}

#[tokio::test(start_paused = true)]
async fn test_succeeds_after_failed_dials() {
    let transport = FakeTransport::new(DialMode::FailFirst(2));
    let opener = ConnectionOpener::new(transport.clone());
    let started = Instant::now();

    let opened = opener.open(URL, policy(1000, 3, 200)).await.unwrap();

    assert_eq!(opened.attempts, 3);
    assert_eq!(transport.dial_count(), 3);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(600) && elapsed < Duration::from_millis(700));
}

#[tokio::test(start_paused = true)]
async fn test_zero_attempts_still_tries_once() {
    let transport = FakeTransport::new(DialMode::OpenEvent);
    let opener = ConnectionOpener::new(transport.clone());

    let opened = opener.open(URL, policy(1000, 0, 0)).await.unwrap();

    assert_eq!(opened.attempts, 1);
    assert_eq!(transport.dial_count(), 1);
}
