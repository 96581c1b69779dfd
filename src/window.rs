//! Validity window calculation
//!
//! Windows are pure functions of the current slot and a policy; nothing here
//! blocks or talks to the ledger.

use crate::error::ClockSkewError;
use crate::ledger::Slot;
use crate::time::SlotConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive slot range in which a transaction may be included
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawWindow")]
pub struct ValidityWindow {
    from: Slot,
    to: Slot,
}

#[derive(Deserialize)]
struct RawWindow {
    from: Slot,
    to: Slot,
}

impl TryFrom<RawWindow> for ValidityWindow {
    type Error = String;

    fn try_from(raw: RawWindow) -> Result<Self, Self::Error> {
        Self::new(raw.from, raw.to).ok_or_else(|| format!("window [{}, {}] is inverted", raw.from, raw.to))
    }
}

impl ValidityWindow {
    /// `None` when `from > to`
    #[must_use]
    pub fn new(from: Slot, to: Slot) -> Option<Self> {
        (from <= to).then_some(Self { from, to })
    }

    #[must_use]
    pub const fn valid_from(&self) -> Slot {
        self.from
    }

    #[must_use]
    pub const fn valid_to(&self) -> Slot {
        self.to
    }

    #[must_use]
    pub fn contains(&self, slot: Slot) -> bool {
        self.from <= slot && slot <= self.to
    }
}

impl fmt::Display for ValidityWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

/// A point in time a workflow is gated on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPoint {
    Slot(Slot),
    /// POSIX milliseconds, as stored in datums and script parameters
    PosixMs(u64),
}

impl LockPoint {
    /// Resolve to a slot
    ///
    /// # Errors
    ///
    /// Fails if a POSIX instant cannot be placed on the slot clock.
    pub fn resolve(&self, slots: &SlotConfig) -> Result<Slot, ClockSkewError> {
        match self {
            Self::Slot(slot) => Ok(*slot),
            Self::PosixMs(ms) => slots.posix_to_slot(*ms),
        }
    }
}

/// Where a time-gated window starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    /// Start exactly at the lock point
    #[default]
    Deadline,
    /// Start at the current slot
    Now,
}

/// How a workflow wants its window shaped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPolicy {
    /// `[now - tolerance, now + tolerance]`
    Immediate { tolerance: u64 },
    /// Window whose upper bound is never below `lock`; see [`Anchor`] for the lower bound
    NoEarlierThan {
        lock: LockPoint,
        tolerance: u64,
        anchor: Anchor,
    },
}

/// Compute the validity window for `now` under `policy`
///
/// For `NoEarlierThan`, the upper bound is `max(now, lock) + tolerance`; the lower
/// bound is `lock` with [`Anchor::Deadline`] and `now` with [`Anchor::Now`].
///
/// # Errors
///
/// Returns a [`ClockSkewError`] if the lock point cannot be resolved against `now`.
pub fn compute_window(
    now: Slot,
    policy: &WindowPolicy,
    slots: &SlotConfig,
) -> Result<ValidityWindow, ClockSkewError> {
    match policy {
        WindowPolicy::Immediate { tolerance } => {
            let to = now.checked_add(*tolerance).ok_or(ClockSkewError::Overflow)?;
            Ok(ValidityWindow {
                from: now.saturating_sub(*tolerance),
                to,
            })
        }
        WindowPolicy::NoEarlierThan {
            lock,
            tolerance,
            anchor,
        } => {
            let lock = lock.resolve(slots)?;
            let to = now.max(lock).checked_add(*tolerance).ok_or(ClockSkewError::Overflow)?;
            let from = match anchor {
                Anchor::Deadline => lock,
                Anchor::Now => now,
            };
            Ok(ValidityWindow { from, to })
        }
    }
}

/// Time branch selected by a redeemer, checked against the window at composition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeGate {
    #[default]
    None,
    /// Branch only valid from this slot on
    After(Slot),
    /// Branch only valid up to this slot
    Before(Slot),
}
