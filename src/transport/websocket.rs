// WebSocket transport backed by tokio-tungstenite

use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::socket::{Socket, SocketEvent, Transport};
use crate::error::Result;

const CHANNEL_CAPACITY: usize = 256;

/// Dials `ws://` / `wss://` URLs
#[derive(Debug, Clone, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn dial(&self, url: &str) -> Result<Box<dyn Socket>> {
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let open = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run_connection(
            url.to_string(),
            event_tx,
            outbound_rx,
            Arc::clone(&open),
        ));

        Ok(Box::new(WsSocket {
            url: url.to_string(),
            events: event_rx,
            outbound: Some(outbound_tx),
            open,
            task,
        }))
    }
}

/// Client side of one WebSocket connection
///
/// Reads and writes are pumped by a background task so the owner only deals
/// with channels.
pub struct WsSocket {
    url: String,
    events: mpsc::Receiver<SocketEvent>,
    outbound: Option<mpsc::Sender<Message>>,
    open: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl WsSocket {
    async fn send(&mut self, message: Message) -> Result<()> {
        if !self.is_open() {
            debug!("Dropping outbound message on closed socket {}", self.url);
            return Ok(());
        }

        if let Some(outbound) = &self.outbound {
            if outbound.send(message).await.is_err() {
                debug!("Socket {} closed while sending", self.url);
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl Socket for WsSocket {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.send(Message::Text(text)).await
    }

    async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.send(Message::Binary(bytes)).await
    }

    async fn next_event(&mut self) -> Option<SocketEvent> {
        self.events.recv().await
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&mut self) {
        let was_open = self.open.swap(false, Ordering::SeqCst);

        // Dropping the sender makes the pump send a close frame and exit
        self.outbound.take();

        if !was_open {
            // Still handshaking (or already gone): nothing to close gracefully
            self.task.abort();
        }

        debug!("Closed socket {}", self.url);
    }
}

async fn run_connection(
    url: String,
    events: mpsc::Sender<SocketEvent>,
    mut outbound: mpsc::Receiver<Message>,
    open: Arc<AtomicBool>,
) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", url, e);
            let _ = events.send(SocketEvent::Closed(Some(e.to_string()))).await;
            return;
        }
    };

    open.store(true, Ordering::SeqCst);
    info!("WebSocket connected: {}", url);

    if events.send(SocketEvent::Opened).await.is_err() {
        open.store(false, Ordering::SeqCst);
        return;
    }

    let (mut sink, mut stream) = stream.split();
    let mut close_reason: Option<String> = None;

    loop {
        tokio::select! {
            message = outbound.recv() => match message {
                Some(message) => {
                    if let Err(e) = sink.send(message).await {
                        warn!("WebSocket send to {} failed: {}", url, e);
                        close_reason = Some(e.to_string());
                        break;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if events.send(SocketEvent::Text(text)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    if events.send(SocketEvent::Binary(bytes)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    close_reason = frame.map(|f| f.reason.to_string());
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    close_reason = Some(e.to_string());
                    break;
                }
                None => break,
            },
        }
    }

    open.store(false, Ordering::SeqCst);
    debug!("WebSocket pump for {} finished", url);
    let _ = events.send(SocketEvent::Closed(close_reason)).await;
}
