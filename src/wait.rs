//! Bounded, cancellable waiting
//!
//! [`await_condition`] is the only suspension point in the crate. The clock is a
//! collaborator so tests can substitute simulated time.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Source of elapsed time for polling loops
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Wall-clock sleeps
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Caller-owned cancellation flag, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Polling interval and attempt bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    #[serde(rename = "interval_ms", with = "millis")]
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    #[must_use]
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), 60)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Result of a bounded wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    Satisfied(T),
    Exhausted,
    Cancelled,
}

impl<T> WaitOutcome<T> {
    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied(_))
    }
}

/// Run `probe` until it yields a value, the attempts run out, or `cancel` fires
///
/// The probe runs once per attempt, with a sleep of `policy.interval` between
/// attempts. Cancellation is checked before every attempt.
///
/// # Errors
///
/// Returns the first error the probe reports.
pub fn await_condition<T, E, F>(
    clock: &dyn Clock,
    policy: &PollPolicy,
    cancel: &CancelToken,
    mut probe: F,
) -> Result<WaitOutcome<T>, E>
where
    F: FnMut() -> Result<Option<T>, E>,
{
    for attempt in 0..policy.max_attempts {
        if cancel.is_cancelled() {
            return Ok(WaitOutcome::Cancelled);
        }
        if attempt > 0 {
            clock.sleep(policy.interval);
        }
        if let Some(value) = probe()? {
            return Ok(WaitOutcome::Satisfied(value));
        }
        trace!(attempt, "condition not yet met");
    }
    if cancel.is_cancelled() {
        return Ok(WaitOutcome::Cancelled);
    }
    Ok(WaitOutcome::Exhausted)
}
