// Public entry points for streaming: start/stop orchestration and the
// IDLE -> OPENING -> STREAMING -> STOPPING -> IDLE state machine.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::config::{StartOptions, StreamingSettings};
use super::countdown::countdown_slice_count;
use super::events::{SessionEvent, SessionState};
use super::preflight;
use super::session::{SessionParts, StreamingSession};
use super::stats::{SessionCounters, SessionStats};
use crate::audio::{Microphone, SliceStore};
use crate::error::{Result, StreamError};
use crate::protocol::ClientMessage;
use crate::transport::{ConnectionOpener, OpenedConnection, Transport};

const EVENT_CAPACITY: usize = 256;

/// Owns at most one streaming session at a time
pub struct StreamingController {
    settings: StreamingSettings,
    opener: ConnectionOpener,
    microphone: Arc<dyn Microphone>,
    store: Arc<dyn SliceStore>,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    inner: Mutex<ControllerInner>,
}

#[derive(Default)]
struct ControllerInner {
    /// Set while OPENING; flipping it asks the in-progress start to give up
    opening_cancel: Option<watch::Sender<bool>>,
    active: Option<ActiveSession>,
    recording_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    counters: Arc<SessionCounters>,
}

struct ActiveSession {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl StreamingController {
    pub fn new(
        settings: StreamingSettings,
        transport: Arc<dyn Transport>,
        microphone: Arc<dyn Microphone>,
        store: Arc<dyn SliceStore>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            settings,
            opener: ConnectionOpener::new(transport),
            microphone,
            store,
            state,
            events,
            inner: Mutex::new(ControllerInner::default()),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> &StreamingSettings {
        &self.settings
    }

    pub fn stats(&self) -> SessionStats {
        let inner = self.lock_inner();
        inner.counters.snapshot(
            self.state(),
            inner.recording_id.clone(),
            inner.started_at,
        )
    }

    /// Start streaming; a no-op while a session is opening, streaming or stopping
    ///
    /// Fatal start failures leave the controller idle and are returned (and
    /// published as `SessionEvent::StartFailed`).
    pub async fn start(&self, options: StartOptions) -> Result<()> {
        let claimed = self.state.send_if_modified(|state| {
            if *state == SessionState::Idle {
                *state = SessionState::Opening;
                true
            } else {
                false
            }
        });

        if !claimed {
            info!("Streaming already {:?}; ignoring start", self.state());
            return Ok(());
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        {
            let mut inner = self.lock_inner();
            inner.opening_cancel = Some(cancel_tx);
            inner.recording_id = Some(options.recording_id.clone());
            inner.started_at = None;
            inner.counters = Arc::new(SessionCounters::default());
        }
        self.emit(SessionEvent::StateChanged(SessionState::Opening));

        match self.open_session(&options, cancel_rx).await {
            Ok(session) => self.commit(session, &options).await,
            Err(StreamError::Cancelled) => {
                info!("Start of {} cancelled by stop", options.recording_id);
                self.finish_opening();
                Err(StreamError::Cancelled)
            }
            Err(e) => {
                error!("Failed to start streaming {}: {}", options.recording_id, e);
                self.finish_opening();
                self.emit(SessionEvent::StartFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Stop streaming; safe at any point, a no-op when idle
    pub async fn stop(&self) -> Result<()> {
        let active = {
            let mut inner = self.lock_inner();
            match self.state() {
                SessionState::Idle => return Ok(()),
                SessionState::Streaming => {
                    self.state.send_replace(SessionState::Stopping);
                    inner.active.take()
                }
                SessionState::Opening => {
                    if let Some(cancel) = &inner.opening_cancel {
                        let _ = cancel.send(true);
                    }
                    None
                }
                SessionState::Stopping => None,
            }
        };

        let Some(active) = active else {
            // Another caller (or the opening start) finishes the transition
            let mut state = self.watch_state();
            let _ = state.wait_for(|state| *state == SessionState::Idle).await;
            return Ok(());
        };

        self.emit(SessionEvent::StateChanged(SessionState::Stopping));
        info!("Stopping streaming session");

        let _ = active.shutdown.send(true);
        if let Err(e) = active.task.await {
            error!("Streaming task panicked: {}", e);
        }

        self.state.send_replace(SessionState::Idle);
        self.emit(SessionEvent::StateChanged(SessionState::Idle));
        info!("Streaming stopped");

        Ok(())
    }

    async fn open_session(
        &self,
        options: &StartOptions,
        cancel: watch::Receiver<bool>,
    ) -> Result<StreamingSession> {
        if !self.microphone.request_permission().await {
            return Err(StreamError::PermissionDenied);
        }
        ensure_not_cancelled(&cancel)?;

        if let Some(url) = &self.settings.health_url {
            match preflight::probe_health(url, self.settings.preflight_timeout_ms).await {
                Ok(body) => info!("Backend health: {}", body.trim()),
                Err(e) => warn!("Health probe failed (continuing): {}", e),
            }
        }

        if let Some(url) = &self.settings.echo_url {
            match preflight::echo_round_trip(&self.opener, url, self.settings.preflight_timeout_ms)
                .await
            {
                Ok(rtt) => info!("Preflight round-trip to {} took {:?}", url, rtt),
                Err(e) => warn!("Preflight failed (continuing): {}", e),
            }
        }
        ensure_not_cancelled(&cancel)?;

        let opened = {
            let mut cancel = cancel.clone();
            tokio::select! {
                opened = self.opener.open(&self.settings.stream_url, self.settings.open_policy) => opened?,
                _ = cancel.wait_for(|cancelled| *cancelled) => return Err(StreamError::Cancelled),
            }
        };

        let OpenedConnection {
            mut socket,
            early_message,
            ..
        } = opened;

        if ensure_not_cancelled(&cancel).is_err() {
            socket.close().await;
            return Err(StreamError::Cancelled);
        }

        let handshake = ClientMessage::Start {
            recording_id: options.recording_id.clone(),
            audio_stream_file_name: options.audio_stream_file_name.clone(),
        };
        if let Err(e) = socket.send_text(handshake.to_text()).await {
            socket.close().await;
            return Err(e);
        }

        let first_recording = match self.microphone.start().await {
            Ok(recording) => recording,
            Err(e) => {
                socket.close().await;
                self.microphone.release().await;
                return Err(e.into());
            }
        };

        let frame_duration_ms = options
            .frame_duration_ms
            .filter(|ms| *ms > 0)
            .unwrap_or(self.settings.frame_duration_ms);
        let countdown_ms = options.countdown_ms();

        info!(
            "Countdown of {} beats at {} bpm: {}ms, {} slices discarded",
            options.countdown_beats,
            options.bpm,
            countdown_ms,
            countdown_slice_count(countdown_ms, frame_duration_ms)
        );

        let counters = Arc::clone(&self.lock_inner().counters);

        Ok(StreamingSession::new(SessionParts {
            recording_id: options.recording_id.clone(),
            frame_duration_ms,
            send_slack_ms: self.settings.send_slack_ms,
            countdown_ms,
            resend_capacity: self.settings.resend_capacity,
            socket,
            pending_text: early_message,
            microphone: Arc::clone(&self.microphone),
            store: Arc::clone(&self.store),
            first_recording,
            events: self.events.clone(),
            counters,
        }))
    }

    /// Hand the opened session to its task, unless a stop arrived meanwhile
    async fn commit(&self, session: StreamingSession, options: &StartOptions) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let cancelled = {
            let mut inner = self.lock_inner();
            let cancelled = inner
                .opening_cancel
                .take()
                .map(|cancel| *cancel.borrow())
                .unwrap_or(false);

            if !cancelled {
                let task = tokio::spawn(session.run(shutdown_rx));
                inner.active = Some(ActiveSession {
                    shutdown: shutdown_tx,
                    task,
                });
                inner.started_at = Some(Utc::now());
                self.state.send_replace(SessionState::Streaming);
                None
            } else {
                Some((session, shutdown_tx, shutdown_rx))
            }
        };

        match cancelled {
            None => {
                self.emit(SessionEvent::StateChanged(SessionState::Streaming));
                info!("Streaming started for {}", options.recording_id);
                Ok(())
            }
            Some((session, shutdown_tx, shutdown_rx)) => {
                // Run teardown immediately
                let _ = shutdown_tx.send(true);
                session.run(shutdown_rx).await;
                self.state.send_replace(SessionState::Idle);
                self.emit(SessionEvent::StateChanged(SessionState::Idle));
                Err(StreamError::Cancelled)
            }
        }
    }

    fn finish_opening(&self) {
        {
            let mut inner = self.lock_inner();
            inner.opening_cancel = None;
        }
        self.state.send_replace(SessionState::Idle);
        self.emit(SessionEvent::StateChanged(SessionState::Idle));
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn lock_inner(&self) -> MutexGuard<'_, ControllerInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn ensure_not_cancelled(cancel: &watch::Receiver<bool>) -> Result<()> {
    if *cancel.borrow() {
        Err(StreamError::Cancelled)
    } else {
        Ok(())
    }
}
