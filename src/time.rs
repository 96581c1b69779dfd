//! Conversion between POSIX time and slots

use crate::error::ClockSkewError;
use crate::ledger::Slot;
use serde::{Deserialize, Serialize};

/// Parameters of a network's slot clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConfig {
    /// POSIX time (ms) at which `zero_slot` began
    pub zero_time_ms: u64,
    pub zero_slot: u64,
    pub slot_length_ms: u64,
}

impl SlotConfig {
    pub const MAINNET: Self = Self {
        zero_time_ms: 1_596_059_091_000,
        zero_slot: 4_492_800,
        slot_length_ms: 1000,
    };

    pub const PREPROD: Self = Self {
        zero_time_ms: 1_655_683_200_000,
        zero_slot: 86_400,
        slot_length_ms: 1000,
    };

    pub const PREVIEW: Self = Self {
        zero_time_ms: 1_666_656_000_000,
        zero_slot: 0,
        slot_length_ms: 1000,
    };

    /// Slot enclosing the given POSIX time
    ///
    /// # Errors
    ///
    /// Fails if the time predates the slot clock or the arithmetic overflows.
    pub fn posix_to_slot(&self, time_ms: u64) -> Result<Slot, ClockSkewError> {
        if self.slot_length_ms == 0 {
            return Err(ClockSkewError::ZeroSlotLength);
        }
        let elapsed = time_ms
            .checked_sub(self.zero_time_ms)
            .ok_or(ClockSkewError::BeforeSystemStart {
                time_ms,
                zero_time_ms: self.zero_time_ms,
            })?;
        (elapsed / self.slot_length_ms)
            .checked_add(self.zero_slot)
            .map(Slot)
            .ok_or(ClockSkewError::Overflow)
    }

    /// POSIX time (ms) at the start of `slot`
    ///
    /// # Errors
    ///
    /// Fails if the slot predates `zero_slot` or the arithmetic overflows.
    pub fn slot_to_posix(&self, slot: Slot) -> Result<u64, ClockSkewError> {
        let slots = slot.0.checked_sub(self.zero_slot).ok_or(ClockSkewError::Overflow)?;
        slots
            .checked_mul(self.slot_length_ms)
            .and_then(|ms| ms.checked_add(self.zero_time_ms))
            .ok_or(ClockSkewError::Overflow)
    }

    /// Number of whole slots needed to cover `duration_ms`, rounding up
    #[must_use]
    pub fn slots_for(&self, duration_ms: u64) -> u64 {
        if self.slot_length_ms == 0 {
            return 0;
        }
        duration_ms.div_ceil(self.slot_length_ms)
    }
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self::PREPROD
    }
}
