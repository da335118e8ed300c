// One live streaming session: the capture/send tick loop plus inbound
// acknowledgement handling, multiplexed on a single task.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, warn};

use super::countdown::{FrameSequencer, SliceDisposition};
use super::events::SessionEvent;
use super::resend::{ResendBuffer, ResendEntry};
use super::scheduler::TickScheduler;
use super::stats::SessionCounters;
use crate::audio::{Microphone, Recording, SliceArtifact, SliceStore};
use crate::codec;
use crate::error::Result;
use crate::protocol::{ClientMessage, FrameHeader, ServerMessage};
use crate::transport::{Socket, SocketEvent};

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Slice fell inside the countdown and was dropped
    Discarded,
    Sent(u64),
    /// Buffered for resend, but the connection was already gone
    Unsent(u64),
    /// Stopped mid-capture, or the handle was already gone
    Abandoned,
    /// No handle was active; one was started for the next tick
    Primed,
}

/// Everything a running session owns
pub struct StreamingSession {
    recording_id: String,
    frame_duration_ms: u64,
    send_slack: Duration,
    socket: Box<dyn Socket>,
    socket_open: bool,
    microphone: Arc<dyn Microphone>,
    store: Arc<dyn SliceStore>,
    active: Option<Box<dyn Recording>>,
    sequencer: FrameSequencer,
    resend: ResendBuffer,
    scheduler: TickScheduler,
    pending_text: Option<String>,
    events: broadcast::Sender<SessionEvent>,
    counters: Arc<SessionCounters>,
}

/// Construction parameters for `StreamingSession`
pub struct SessionParts {
    pub recording_id: String,
    pub frame_duration_ms: u64,
    pub send_slack_ms: u64,
    pub countdown_ms: u64,
    pub resend_capacity: usize,
    pub socket: Box<dyn Socket>,
    /// Text that arrived while the connection was opening
    pub pending_text: Option<String>,
    pub microphone: Arc<dyn Microphone>,
    pub store: Arc<dyn SliceStore>,
    /// Already-started first recording handle
    pub first_recording: Box<dyn Recording>,
    pub events: broadcast::Sender<SessionEvent>,
    pub counters: Arc<SessionCounters>,
}

impl StreamingSession {
    pub fn new(parts: SessionParts) -> Self {
        let delay = Duration::from_millis(parts.frame_duration_ms + parts.send_slack_ms);

        Self {
            recording_id: parts.recording_id,
            frame_duration_ms: parts.frame_duration_ms,
            send_slack: Duration::from_millis(parts.send_slack_ms),
            socket: parts.socket,
            socket_open: true,
            microphone: parts.microphone,
            store: parts.store,
            active: Some(parts.first_recording),
            sequencer: FrameSequencer::new(parts.countdown_ms, parts.frame_duration_ms),
            resend: ResendBuffer::new(parts.resend_capacity),
            scheduler: TickScheduler::new(delay),
            pending_text: parts.pending_text,
            events: parts.events,
            counters: parts.counters,
        }
    }

    /// Drive the session until `shutdown` flips (or its sender is dropped), then tear down
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Streaming {} ({}ms frames, countdown {}ms)",
            self.recording_id,
            self.frame_duration_ms,
            self.sequencer.countdown_remaining_ms()
        );

        if let Some(text) = self.pending_text.take() {
            self.handle_inbound(&text).await;
        }

        let deadline = self.next_deadline();
        self.scheduler.arm_at(deadline);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = self.scheduler.fired() => {
                    self.run_tick(&mut shutdown).await;
                    if !*shutdown.borrow() {
                        let deadline = self.next_deadline();
                        self.scheduler.arm_at(deadline);
                    }
                }
                event = self.socket.next_event(), if self.socket_open => match event {
                    Some(SocketEvent::Text(text)) => self.handle_inbound(&text).await,
                    Some(SocketEvent::Opened) | Some(SocketEvent::Binary(_)) => {}
                    Some(SocketEvent::Closed(reason)) => self.connection_lost(reason),
                    None => self.connection_lost(None),
                },
            }
        }

        self.teardown().await;
    }

    /// End of the active slice, or a full frame plus slack from now when that
    /// boundary has already passed (no handle, or the last swap failed)
    fn next_deadline(&self) -> Instant {
        let now = Instant::now();
        let frame = Duration::from_millis(self.frame_duration_ms);

        self.active
            .as_ref()
            .map(|recording| recording.started_at() + frame)
            .filter(|boundary| *boundary > now)
            .unwrap_or_else(|| now + self.scheduler.delay())
    }

    async fn run_tick(&mut self, shutdown: &mut watch::Receiver<bool>) {
        match self.tick(shutdown).await {
            Ok(TickOutcome::Abandoned) => debug!("Tick abandoned"),
            Ok(_) => {}
            Err(e) => {
                SessionCounters::bump(&self.counters.tick_failures);
                warn!("Tick failed for {}: {}", self.recording_id, e);
                let _ = self.events.send(SessionEvent::TickFailed {
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Capture, decode, classify, and (for real frames) buffer and send one slice
    pub async fn tick(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<TickOutcome> {
        let Some(started_at) = self.active.as_ref().map(|recording| recording.started_at()) else {
            self.active = Some(self.microphone.start().await?);
            return Ok(TickOutcome::Primed);
        };

        let ready_at = started_at + Duration::from_millis(self.frame_duration_ms);
        tokio::select! {
            _ = sleep_until(ready_at) => {}
            _ = shutdown.changed() => return Ok(TickOutcome::Abandoned),
        }

        // Start the successor first so capture has no gap
        let next = self.microphone.start().await?;
        let Some(mut finished) = self.active.replace(next) else {
            return Ok(TickOutcome::Abandoned);
        };

        let artifact = match finished.stop().await {
            Ok(artifact) => artifact,
            Err(e) if e.is_already_stopped() => {
                debug!("Recording {} already stopped", finished.id());
                return Ok(TickOutcome::Abandoned);
            }
            Err(e) => return Err(e.into()),
        };

        // Slack delays the send only; the successor is already capturing
        sleep(self.send_slack).await;

        let decoded = read_slice(&self.store, &artifact).await;
        discard_artifact(&self.store, &artifact).await;
        let bytes = decoded?;

        match self.sequencer.classify() {
            SliceDisposition::Countdown {
                remaining_ms,
                boundary_reached,
            } => {
                SessionCounters::bump(&self.counters.countdown_slices);
                let _ = self.events.send(SessionEvent::CountdownSlice { remaining_ms });
                if boundary_reached {
                    info!("Countdown complete for {}; next slice is frame 1", self.recording_id);
                    let _ = self.events.send(SessionEvent::BoundaryReached);
                }
                Ok(TickOutcome::Discarded)
            }
            SliceDisposition::Frame(frame_no) => {
                let header = FrameHeader {
                    recording_id: self.recording_id.clone(),
                    frame_no,
                    frame_duration_in_ms: self.frame_duration_ms,
                    bytes_len: bytes.len(),
                };

                self.resend.put(
                    frame_no,
                    ResendEntry {
                        header: header.clone(),
                        bytes: bytes.clone(),
                    },
                );
                self.counters
                    .buffered_frames
                    .store(self.resend.len(), Ordering::SeqCst);

                let len = bytes.len();
                if !self.send_frame(&header, bytes).await? {
                    return Ok(TickOutcome::Unsent(frame_no));
                }

                SessionCounters::bump(&self.counters.frames_sent);
                let _ = self.events.send(SessionEvent::FrameSent {
                    frame_no,
                    bytes: len,
                });
                debug!("Sent frame {} ({} bytes)", frame_no, len);

                Ok(TickOutcome::Sent(frame_no))
            }
        }
    }

    /// Header then payload, as two writes
    ///
    /// Returns `Ok(false)` without writing once the connection is gone.
    async fn send_frame(&mut self, header: &FrameHeader, bytes: Vec<u8>) -> Result<bool> {
        if !self.socket_open {
            debug!("Connection closed; frame {} not transmitted", header.frame_no);
            return Ok(false);
        }

        self.socket
            .send_text(ClientMessage::Frame(header.clone()).to_text())
            .await?;
        self.socket.send_binary(bytes).await?;
        Ok(true)
    }

    async fn handle_inbound(&mut self, text: &str) {
        match ServerMessage::parse(text) {
            Ok(ServerMessage::Ack(ack)) => {
                for frame_no in ack.missing_frames {
                    self.resend_frame(frame_no).await;
                }
            }
            Ok(ServerMessage::StartAck { recording_id }) => {
                info!("Backend accepted recording {:?}", recording_id);
            }
            Ok(ServerMessage::StopAck { recording_id }) => {
                debug!("Backend acknowledged stop of {:?}", recording_id);
            }
            Ok(ServerMessage::Error { reason }) => {
                warn!("Backend reported error: {}", reason);
                let _ = self.events.send(SessionEvent::ServerError { reason });
            }
            Err(e) => warn!("Ignoring server message: {}", e),
        }
    }

    async fn resend_frame(&mut self, frame_no: u64) {
        let Some(entry) = self.resend.get(frame_no).cloned() else {
            debug!("Frame {} no longer buffered; cannot resend", frame_no);
            SessionCounters::bump(&self.counters.resend_misses);
            let _ = self.events.send(SessionEvent::ResendMiss { frame_no });
            return;
        };

        match self.send_frame(&entry.header, entry.bytes).await {
            Ok(false) => {}
            Ok(true) => {
                SessionCounters::bump(&self.counters.frames_resent);
                let _ = self.events.send(SessionEvent::FrameResent { frame_no });
                debug!("Resent frame {}", frame_no);
            }
            Err(e) => warn!("Resend of frame {} failed: {}", frame_no, e),
        }
    }

    fn connection_lost(&mut self, reason: Option<String>) {
        if !self.socket_open {
            return;
        }
        self.socket_open = false;
        error!(
            "Connection lost for {}: {}",
            self.recording_id,
            reason.as_deref().unwrap_or("closed")
        );
        let _ = self.events.send(SessionEvent::ConnectionLost { reason });
    }

    async fn teardown(mut self) {
        self.scheduler.disarm();

        if let Some(mut recording) = self.active.take() {
            match recording.stop().await {
                Ok(artifact) => discard_artifact(&self.store, &artifact).await,
                Err(e) if e.is_already_stopped() => {
                    debug!("Final recording {} was already stopped", recording.id())
                }
                Err(e) => warn!("Failed to stop final recording: {}", e),
            }
        }

        self.microphone.release().await;

        if self.socket_open {
            let stop = ClientMessage::Stop {
                recording_id: self.recording_id.clone(),
            };
            if let Err(e) = self.socket.send_text(stop.to_text()).await {
                warn!("Failed to send STOP for {}: {}", self.recording_id, e);
            }
        }
        self.socket.close().await;

        self.resend.clear();
        self.counters.buffered_frames.store(0, Ordering::SeqCst);

        info!("Streaming session {} torn down", self.recording_id);
    }
}

async fn read_slice(store: &Arc<dyn SliceStore>, artifact: &SliceArtifact) -> Result<Vec<u8>> {
    let encoded = store.read_base64(&artifact.uri).await?;
    Ok(codec::decode(&encoded)?)
}

/// Every captured slice is deleted exactly once, whatever happened to it
async fn discard_artifact(store: &Arc<dyn SliceStore>, artifact: &SliceArtifact) {
    if let Err(e) = store.delete(&artifact.uri).await {
        warn!("Failed to delete slice artifact {}: {}", artifact.uri, e);
    }
}
