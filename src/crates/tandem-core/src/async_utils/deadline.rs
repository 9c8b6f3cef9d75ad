//! Shared timeout budget
//!
//! Pipeline and group retrieval hand the same [`Deadline`] to every stage so
//! that the caller's timeout bounds the whole call rather than each poll.

use std::time::Duration;
use tokio::time::Instant;

/// Wall-clock budget started when a blocking call begins
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    /// Start a budget of `budget` from now
    pub fn new(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    /// The original budget
    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// `budget - elapsed`, saturating at zero
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.budget
    }
}
