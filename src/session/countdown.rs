//! Countdown alignment and frame numbering
//!
//! Lead-in slices are captured on the same cadence as real frames and
//! discarded, so the first real frame starts on the countdown's final beat.
//! A partial last countdown slice is discarded whole.

/// What to do with one captured slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceDisposition {
    /// Inside the lead-in: discard without sending or buffering
    Countdown {
        remaining_ms: i64,
        /// This slice consumed the rest of the countdown
        boundary_reached: bool,
    },
    /// A real frame carrying this sequence number
    Frame(u64),
}

/// Assigns each captured slice to the countdown or a frame number
#[derive(Debug, Clone)]
pub struct FrameSequencer {
    frame_duration_ms: u64,
    countdown_remaining_ms: i64,
    boundary_reached: bool,
    frame_counter: u64,
}

impl FrameSequencer {
    pub fn new(countdown_ms: u64, frame_duration_ms: u64) -> Self {
        Self {
            frame_duration_ms: frame_duration_ms.max(1),
            countdown_remaining_ms: countdown_ms as i64,
            boundary_reached: countdown_ms == 0,
            frame_counter: 1,
        }
    }

    pub fn classify(&mut self) -> SliceDisposition {
        if !self.boundary_reached && self.countdown_remaining_ms > 0 {
            self.countdown_remaining_ms -= self.frame_duration_ms as i64;

            let boundary_reached = self.countdown_remaining_ms <= 0;
            if boundary_reached {
                self.boundary_reached = true;
                self.frame_counter = 1;
            }

            return SliceDisposition::Countdown {
                remaining_ms: self.countdown_remaining_ms,
                boundary_reached,
            };
        }

        let frame_no = self.frame_counter;
        self.frame_counter += 1;
        SliceDisposition::Frame(frame_no)
    }

    pub fn boundary_reached(&self) -> bool {
        self.boundary_reached
    }

    pub fn countdown_remaining_ms(&self) -> i64 {
        self.countdown_remaining_ms
    }

    /// Number the next real frame will carry
    pub fn next_frame_no(&self) -> u64 {
        self.frame_counter
    }
}

/// Slices discarded for a lead-in: `ceil(countdown_ms / frame_duration_ms)`
pub fn countdown_slice_count(countdown_ms: u64, frame_duration_ms: u64) -> u64 {
    countdown_ms.div_ceil(frame_duration_ms.max(1))
}
