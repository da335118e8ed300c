use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::events::SessionState;

/// Statistics about the current (or last) streaming session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub state: SessionState,

    pub recording_id: Option<String>,

    /// When the session reached streaming
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since `started_at`
    pub duration_secs: f64,

    /// Real frames transmitted (resends excluded)
    pub frames_sent: usize,

    pub frames_resent: usize,

    /// Lead-in slices captured and discarded
    pub countdown_slices: usize,

    pub tick_failures: usize,

    pub resend_misses: usize,

    /// Frames currently held for retransmission
    pub buffered_frames: usize,
}

/// Live counters shared between a running session and the controller
#[derive(Debug, Default)]
pub struct SessionCounters {
    pub frames_sent: AtomicUsize,
    pub frames_resent: AtomicUsize,
    pub countdown_slices: AtomicUsize,
    pub tick_failures: AtomicUsize,
    pub resend_misses: AtomicUsize,
    pub buffered_frames: AtomicUsize,
}

impl SessionCounters {
    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(
        &self,
        state: SessionState,
        recording_id: Option<String>,
        started_at: Option<DateTime<Utc>>,
    ) -> SessionStats {
        let duration_secs = started_at
            .map(|at| Utc::now().signed_duration_since(at).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        SessionStats {
            state,
            recording_id,
            started_at,
            duration_secs,
            frames_sent: self.frames_sent.load(Ordering::SeqCst),
            frames_resent: self.frames_resent.load(Ordering::SeqCst),
            countdown_slices: self.countdown_slices.load(Ordering::SeqCst),
            tick_failures: self.tick_failures.load(Ordering::SeqCst),
            resend_misses: self.resend_misses.load(Ordering::SeqCst),
            buffered_frames: self.buffered_frames.load(Ordering::SeqCst),
        }
    }
}
