//! Bounded exponential backoff for polling an external store

use super::Deadline;
use crate::error::Result;
use std::future::Future;
use std::time::Duration;

/// Delay schedule between polls
///
/// The n-th delay (0-indexed) is `initial_interval * backoff_factor^n`,
/// capped at `max_interval`. There is no jitter: pollers of one result are
/// not competing for anything.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub backoff_factor: u32,
    pub max_interval: Duration,
}

impl PollPolicy {
    pub fn new(initial_interval: Duration) -> Self {
        Self {
            initial_interval,
            backoff_factor: 2,
            max_interval: Duration::from_millis(1000),
        }
    }

    pub fn with_backoff_factor(mut self, factor: u32) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    /// Delay to sleep after the `attempt`-th unsuccessful check
    pub fn delay(&self, attempt: u32) -> Duration {
        self.initial_interval
            .saturating_mul(self.backoff_factor.saturating_pow(attempt))
            .min(self.max_interval)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(5))
    }
}

/// Check until it yields a value or the deadline runs out
///
/// Sleeps never extend past the deadline: the last sleep is cut short so
/// that one final check lands exactly on it. Returns `Ok(None)` only after a
/// check made at or past the deadline found nothing, so a check always runs
/// at least once, even with an exhausted budget. Check errors are returned
/// immediately.
pub async fn poll_until<F, Fut, T>(
    policy: &PollPolicy,
    deadline: &Deadline,
    mut check: F,
) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let mut attempt = 0;
    loop {
        if let Some(value) = check().await? {
            return Ok(Some(value));
        }
        if deadline.is_expired() {
            return Ok(None);
        }

        let delay = policy.delay(attempt).min(deadline.remaining());
        attempt = attempt.saturating_add(1);

        tracing::trace!(attempt, ?delay, "Polling again after backoff");
        tokio::time::sleep(delay).await;
    }
}
