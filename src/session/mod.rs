//! Streaming session management
//!
//! This module provides the `StreamingController` abstraction that manages:
//! - Session lifecycle (idle, opening, streaming, stopping)
//! - Count-in discard and gap-free frame numbering
//! - Rolling capture with self-rescheduling ticks
//! - Retransmission of frames the backend reports missing
//! - Session statistics and event publishing

mod config;
mod controller;
mod countdown;
mod events;
mod preflight;
mod resend;
mod scheduler;
mod session;
mod stats;

pub use config::{StartOptions, StreamingSettings};
pub use controller::StreamingController;
pub use countdown::{countdown_slice_count, FrameSequencer, SliceDisposition};
pub use events::{SessionEvent, SessionState};
pub use preflight::{echo_round_trip, probe_health};
pub use resend::{ResendBuffer, ResendEntry, DEFAULT_RESEND_CAPACITY};
pub use scheduler::{TickScheduler, TickState};
pub use session::{SessionParts, StreamingSession, TickOutcome};
pub use stats::{SessionCounters, SessionStats};
