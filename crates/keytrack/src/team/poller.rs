//! Waiting for a team key generation to become visible.
//!
//! [`ClientPoller::poll_until`] is a bounded read-and-retry loop: fetch,
//! compare, back off, fetch again. It takes no team lock and writes
//! nothing, so it can run alongside rotations. Waits go through a
//! [`Sleeper`] and elapsed time through a [`Clock`], so tests can observe
//! the schedule without sleeping.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Result, TrustError};
use crate::time::{Clock, ManualClock, SystemClock};

use super::types::TeamState;

/// Where the poller reads team state from (`TeamGet` with repoll).
pub trait TeamStateSource: Send + Sync {
    fn fetch(&self, team: &str) -> Result<TeamState>;
}

/// Attempt bound and backoff growth for one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub growth_factor: u32,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(10),
            growth_factor: 2,
        }
    }
}

impl PollSchedule {
    /// Wait after the attempt numbered `attempt` (from zero):
    /// `initial_backoff * growth_factor^attempt`, saturating.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.growth_factor.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor)
    }

    /// Sum of every wait in a poll that never succeeds.
    pub fn total_wait(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.backoff(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// How the poller waits between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Blocks the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested waits and returns immediately, optionally moving a
/// [`ManualClock`] forward by each wait.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
    clock: Option<Arc<ManualClock>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advancing(clock: Arc<ManualClock>) -> Self {
        Self {
            slept: Mutex::default(),
            clock: Some(clock),
        }
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Some(clock) = &self.clock {
            clock.advance(u64::try_from(duration.as_micros()).unwrap_or(u64::MAX));
        }
        self.slept
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
    }
}

/// Caller-held cancellation signal, cheap to clone.
#[derive(Debug, Default, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Client-side wait for a key generation.
pub struct ClientPoller {
    source: Arc<dyn TeamStateSource>,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
}

impl ClientPoller {
    pub fn new(source: Arc<dyn TeamStateSource>) -> Self {
        Self {
            source,
            sleeper: Arc::new(ThreadSleeper),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Return the first fetched state whose generation is at least
    /// `desired`.
    ///
    /// A failed fetch counts as a missed attempt. Cancellation is checked
    /// before each attempt and before each sleep.
    ///
    /// # Errors
    ///
    /// `Timeout` with `attempts == schedule.max_attempts` once the bound
    /// is spent; `PollCancelled` if `cancel` fires first.
    pub fn poll_until(
        &self,
        team: &str,
        desired: u32,
        schedule: &PollSchedule,
        cancel: &CancellationToken,
    ) -> Result<TeamState> {
        let started = self.clock.now_micros();

        for attempt in 0..schedule.max_attempts {
            if cancel.is_cancelled() {
                return Err(TrustError::PollCancelled { attempts: attempt });
            }

            match self.source.fetch(team) {
                Ok(state) if state.key_generation >= desired => {
                    log::debug!(
                        "{team}: generation {} visible after {} attempts",
                        state.key_generation,
                        attempt + 1
                    );
                    return Ok(state);
                }
                Ok(state) => log::debug!(
                    "{team}: attempt {}: generation {} < {desired}",
                    attempt + 1,
                    state.key_generation
                ),
                Err(e) => log::warn!("{team}: attempt {} failed: {e}", attempt + 1),
            }

            if attempt + 1 == schedule.max_attempts {
                break;
            }
            if cancel.is_cancelled() {
                return Err(TrustError::PollCancelled {
                    attempts: attempt + 1,
                });
            }
            self.sleeper.sleep(schedule.backoff(attempt));
        }

        let total_elapsed =
            Duration::from_micros(self.clock.now_micros().saturating_sub(started));
        log::warn!(
            "{team}: generation {desired} not visible after {} attempts",
            schedule.max_attempts
        );
        Err(TrustError::Timeout {
            attempts: schedule.max_attempts,
            total_elapsed,
        })
    }
}
