use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Single-flight tick timer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickState {
    Idle,
    Armed { deadline: Instant },
}

/// Schedules the next tick; at most one tick is ever pending
#[derive(Debug)]
pub struct TickScheduler {
    state: TickState,
    delay: Duration,
}

impl TickScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            state: TickState::Idle,
            delay,
        }
    }

    /// Arm the timer `delay` from now; a no-op returning false while already armed
    pub fn arm(&mut self) -> bool {
        self.arm_at(Instant::now() + self.delay)
    }

    pub fn arm_at(&mut self, deadline: Instant) -> bool {
        match self.state {
            TickState::Armed { .. } => false,
            TickState::Idle => {
                self.state = TickState::Armed { deadline };
                true
            }
        }
    }

    /// Cancel the pending tick, if any
    pub fn disarm(&mut self) {
        self.state = TickState::Idle;
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, TickState::Armed { .. })
    }

    pub fn state(&self) -> TickState {
        self.state
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Resolves when the pending tick is due, leaving the scheduler idle
    ///
    /// Never resolves while idle. Dropping the future before it resolves keeps
    /// the tick pending.
    pub async fn fired(&mut self) {
        match self.state {
            TickState::Armed { deadline } => {
                sleep_until(deadline).await;
                self.state = TickState::Idle;
            }
            TickState::Idle => std::future::pending().await,
        }
    }
}
