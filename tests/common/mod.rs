// In-memory stand-ins for the platform primitives used by the session tests

#![allow(dead_code)]

use practice_stream::audio::{Microphone, Recording, SliceArtifact, SliceStore};
use practice_stream::codec;
use practice_stream::error::{RecorderError, Result, StreamError};
use practice_stream::transport::{Socket, SocketEvent, Transport};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Instant;

// ============================================================================
// Transport
// ============================================================================

/// Something the client wrote to a fake socket
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text(String),
    Binary(Vec<u8>),
}

impl Sent {
    pub fn json(&self) -> Option<serde_json::Value> {
        match self {
            Sent::Text(text) => serde_json::from_str(text).ok(),
            Sent::Binary(_) => None,
        }
    }

    pub fn message_type(&self) -> Option<String> {
        self.json()
            .and_then(|v| v.get("MESSAGE_TYPE").and_then(|t| t.as_str()).map(String::from))
    }
}

/// How a dialled fake connection becomes ready
#[derive(Debug, Clone)]
pub enum DialMode {
    /// Queue an `Opened` event
    OpenEvent,
    /// Report open via `is_open` only
    SilentOpen,
    /// Deliver this text before anything else
    Banner(String),
    /// Never become ready
    Never,
    /// Fail the first `n` dials outright, then behave like `OpenEvent`
    FailFirst(usize),
}

#[derive(Default)]
pub struct TransportLog {
    pub sent: Vec<Sent>,
    pub inbound: Option<mpsc::UnboundedSender<SocketEvent>>,
    pub closes: usize,
}

pub struct FakeTransport {
    mode: DialMode,
    pub dials: AtomicUsize,
    pub log: Arc<Mutex<TransportLog>>,
}

impl FakeTransport {
    pub fn new(mode: DialMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            dials: AtomicUsize::new(0),
            log: Arc::new(Mutex::new(TransportLog::default())),
        })
    }

    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.log.lock().unwrap().sent.clone()
    }

    pub fn sent_texts(&self) -> Vec<serde_json::Value> {
        self.sent().iter().filter_map(Sent::json).collect()
    }

    pub fn sent_of_type(&self, kind: &str) -> Vec<serde_json::Value> {
        self.sent_texts()
            .into_iter()
            .filter(|v| v.get("MESSAGE_TYPE").and_then(|t| t.as_str()) == Some(kind))
            .collect()
    }

    /// `FRAME_NO` of every frame header, in send order
    pub fn frame_numbers(&self) -> Vec<u64> {
        self.sent_of_type("FRAME")
            .iter()
            .filter_map(|v| v["FRAME_NO"].as_str().and_then(|n| n.parse().ok()))
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.log.lock().unwrap().closes
    }

    /// Push a server message into the most recent connection
    pub fn inject(&self, event: SocketEvent) {
        if let Some(inbound) = &self.log.lock().unwrap().inbound {
            let _ = inbound.send(event);
        }
    }

    pub fn inject_text(&self, text: &str) {
        self.inject(SocketEvent::Text(text.to_string()));
    }

    /// Drop the inbound sender so the connection's event stream ends
    pub fn sever(&self) {
        self.log.lock().unwrap().inbound = None;
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn dial(&self, url: &str) -> Result<Box<dyn Socket>> {
        let dial_no = self.dials.fetch_add(1, Ordering::SeqCst);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));

        match &self.mode {
            DialMode::FailFirst(n) if dial_no < *n => {
                return Err(StreamError::Connect {
                    url: url.to_string(),
                    reason: "refused".to_string(),
                });
            }
            DialMode::OpenEvent | DialMode::FailFirst(_) => {
                let _ = inbound_tx.send(SocketEvent::Opened);
            }
            DialMode::SilentOpen => open.store(true, Ordering::SeqCst),
            DialMode::Banner(text) => {
                let _ = inbound_tx.send(SocketEvent::Text(text.clone()));
            }
            DialMode::Never => {}
        }

        self.log.lock().unwrap().inbound = Some(inbound_tx);

        Ok(Box::new(FakeSocket {
            events: inbound_rx,
            open,
            closed: false,
            log: Arc::clone(&self.log),
        }))
    }
}

pub struct FakeSocket {
    events: mpsc::UnboundedReceiver<SocketEvent>,
    open: Arc<AtomicBool>,
    closed: bool,
    log: Arc<Mutex<TransportLog>>,
}

impl FakeSocket {
    fn record(&self, sent: Sent) {
        if !self.closed {
            self.log.lock().unwrap().sent.push(sent);
        }
    }
}

#[async_trait::async_trait]
impl Socket for FakeSocket {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.record(Sent::Text(text));
        Ok(())
    }

    async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.record(Sent::Binary(bytes));
        Ok(())
    }

    async fn next_event(&mut self) -> Option<SocketEvent> {
        let event = self.events.recv().await;
        if matches!(event, Some(SocketEvent::Opened)) {
            self.open.store(true, Ordering::SeqCst);
        }
        event
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.closed
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.log.lock().unwrap().closes += 1;
        }
    }
}

// ============================================================================
// Microphone
// ============================================================================

#[derive(Default)]
pub struct MicLog {
    pub starts: usize,
    pub stops: usize,
    pub releases: usize,
    pub in_flight: usize,
    pub max_in_flight: usize,
    pub started_at: Vec<Instant>,
}

pub struct FakeMicrophone {
    permission: bool,
    next_id: AtomicU64,
    pub log: Arc<Mutex<MicLog>>,
}

impl FakeMicrophone {
    pub fn new() -> Arc<Self> {
        Self::with_permission(true)
    }

    pub fn with_permission(permission: bool) -> Arc<Self> {
        Arc::new(Self {
            permission,
            next_id: AtomicU64::new(1),
            log: Arc::new(Mutex::new(MicLog::default())),
        })
    }

    pub fn starts(&self) -> usize {
        self.log.lock().unwrap().starts
    }

    pub fn stops(&self) -> usize {
        self.log.lock().unwrap().stops
    }

    pub fn in_flight(&self) -> usize {
        self.log.lock().unwrap().in_flight
    }

    pub fn max_in_flight(&self) -> usize {
        self.log.lock().unwrap().max_in_flight
    }

    pub fn releases(&self) -> usize {
        self.log.lock().unwrap().releases
    }

    /// Start instant of every handle, in start order
    pub fn start_times(&self) -> Vec<Instant> {
        self.log.lock().unwrap().started_at.clone()
    }
}

#[async_trait::async_trait]
impl Microphone for FakeMicrophone {
    async fn request_permission(&self) -> bool {
        self.permission
    }

    async fn start(&self) -> std::result::Result<Box<dyn Recording>, RecorderError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let started_at = Instant::now();
        {
            let mut log = self.log.lock().unwrap();
            log.started_at.push(started_at);
            log.starts += 1;
            log.in_flight += 1;
            log.max_in_flight = log.max_in_flight.max(log.in_flight);
        }

        Ok(Box::new(FakeRecording {
            id,
            started_at,
            stopped: false,
            log: Arc::clone(&self.log),
        }))
    }

    async fn release(&self) {
        self.log.lock().unwrap().releases += 1;
    }
}

pub struct FakeRecording {
    id: u64,
    started_at: Instant,
    stopped: bool,
    log: Arc<Mutex<MicLog>>,
}

#[async_trait::async_trait]
impl Recording for FakeRecording {
    fn id(&self) -> u64 {
        self.id
    }

    fn started_at(&self) -> Instant {
        self.started_at
    }

    async fn stop(&mut self) -> std::result::Result<SliceArtifact, RecorderError> {
        if self.stopped {
            return Err(RecorderError::AlreadyStopped(self.id));
        }
        self.stopped = true;

        let mut log = self.log.lock().unwrap();
        log.stops += 1;
        log.in_flight -= 1;

        Ok(SliceArtifact {
            uri: slice_uri(self.id),
            recording_id: self.id,
        })
    }
}

pub fn slice_uri(id: u64) -> String {
    format!("mem://slice-{}", id)
}

/// Payload the fake store returns for an artifact
pub fn slice_payload(uri: &str) -> Vec<u8> {
    format!("pcm:{}", uri).into_bytes()
}

// ============================================================================
// Slice store
// ============================================================================

pub struct FakeStore {
    fail_reads: AtomicBool,
    corrupt_payloads: AtomicBool,
    pub deletes: Mutex<HashMap<String, usize>>,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_reads: AtomicBool::new(false),
            corrupt_payloads: AtomicBool::new(false),
            deletes: Mutex::new(HashMap::new()),
        })
    }

    pub fn failing_reads() -> Arc<Self> {
        let store = Self::new();
        store.fail_reads.store(true, Ordering::SeqCst);
        store
    }

    /// Reads succeed but return text that is not valid base64
    pub fn corrupt_payloads() -> Arc<Self> {
        let store = Self::new();
        store.corrupt_payloads.store(true, Ordering::SeqCst);
        store
    }

    pub fn delete_counts(&self) -> HashMap<String, usize> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn total_deletes(&self) -> usize {
        self.deletes.lock().unwrap().values().sum()
    }
}

#[async_trait::async_trait]
impl SliceStore for FakeStore {
    async fn read_base64(&self, uri: &str) -> Result<String> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StreamError::Storage(format!("cannot read {}", uri)));
        }
        if self.corrupt_payloads.load(Ordering::SeqCst) {
            return Ok(format!("%%{}%%", uri));
        }
        Ok(codec::encode(&slice_payload(uri)))
    }

    async fn delete(&self, uri: &str) -> Result<()> {
        *self
            .deletes
            .lock()
            .unwrap()
            .entry(uri.to_string())
            .or_default() += 1;
        Ok(())
    }
}
