//! Time-locked vault with two-step withdrawal
//!
//! Deposits sit at the script without a datum. A withdrawal request re-locks the
//! funds under `Constr 0 [lock_time_ms]`; the owner may finalize once
//! `wait_time_ms` has elapsed, or cancel at any time.

use super::{load_validator, Driver};
use crate::blueprint::{Blueprint, ScriptParameterizer, Validator};
use crate::client::LedgerClient;
use crate::compose::{ScriptSpend, TxLeg};
use crate::datum::Datum;
use crate::error::DriverError;
use crate::ledger::{Address, KeyHash, Slot, TxRef, Utxo, Value};
use crate::redeemer::{RedeemerSpec, RedeemerTable};
use crate::selector::UtxoPredicate;
use crate::signer::Signer;
use crate::submit::Outcome;
use crate::wait::WaitOutcome;
use crate::window::{Anchor, LockPoint, TimeGate, WindowPolicy};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

const WORKFLOW: &str = "vault";

pub const REDEEMERS: RedeemerTable = RedeemerTable {
    workflow: WORKFLOW,
    entries: &[
        RedeemerSpec {
            action: "request_withdraw",
            tag: 0,
            arity: 0,
        },
        RedeemerSpec {
            action: "finalize_withdraw",
            tag: 1,
            arity: 0,
        },
        RedeemerSpec {
            action: "cancel",
            tag: 2,
            arity: 0,
        },
    ],
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    pub owner: KeyHash,
    /// Delay between a withdrawal request and its finalization
    pub wait_time_ms: u64,
}

impl VaultConfig {
    /// `[owner, wait_time_ms]`
    #[must_use]
    pub fn params(&self) -> Vec<Datum> {
        vec![
            Datum::bytes(self.owner.as_bytes().to_vec()),
            Datum::int(self.wait_time_ms),
        ]
    }
}

/// Withdrawal request datum: `Constr 0 [lock_time_ms]`
#[must_use]
pub fn request_datum(lock_time_ms: u64) -> Datum {
    Datum::constr(0, vec![Datum::int(lock_time_ms)])
}

fn lock_time_of(utxo: &Utxo) -> Result<Option<u64>, DriverError> {
    let Some(datum) = &utxo.inline_datum else {
        return Ok(None);
    };
    match datum.as_constr() {
        Some((0, [time])) => time
            .as_int()
            .and_then(|ms| u64::try_from(ms).ok())
            .map(Some)
            .ok_or_else(|| DriverError::UnexpectedDatum {
                workflow: WORKFLOW,
                detail: format!("lock time is {}", time.kind()),
            }),
        _ => Err(DriverError::UnexpectedDatum {
            workflow: WORKFLOW,
            detail: format!("expected Constr 0 [int], found {}", datum.kind()),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultState {
    /// Nothing locked; either never deposited or withdrawn
    Empty,
    Idle {
        tx_ref: TxRef,
        value: Value,
    },
    WithdrawRequested {
        tx_ref: TxRef,
        value: Value,
        lock_time_ms: u64,
        /// First slot at which the withdrawal may be finalized
        unlock_slot: Slot,
    },
}

impl fmt::Display for VaultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Idle { .. } => write!(f, "idle"),
            Self::WithdrawRequested { unlock_slot, .. } => {
                write!(f, "withdraw requested (unlocks at slot {unlock_slot})")
            }
        }
    }
}

pub struct Vault<'a, C, S> {
    driver: &'a Driver<C, S>,
    config: VaultConfig,
    validator: Validator,
}

impl<'a, C: LedgerClient, S: Signer> Vault<'a, C, S> {
    #[must_use]
    pub const fn new(driver: &'a Driver<C, S>, config: VaultConfig, validator: Validator) -> Self {
        Self {
            driver,
            config,
            validator,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the redeemer table disagrees with the blueprint or
    /// parameter application fails.
    pub fn from_blueprint(
        driver: &'a Driver<C, S>,
        config: VaultConfig,
        blueprint: &Blueprint,
        title: &str,
        parameterizer: &dyn ScriptParameterizer,
    ) -> Result<Self, DriverError> {
        let validator = load_validator(blueprint, title, &REDEEMERS, &config.params(), parameterizer)?;
        Ok(Self::new(driver, config, validator))
    }

    pub const fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub const fn validator(&self) -> &Validator {
        &self.validator
    }

    pub const fn address(&self) -> Address {
        self.validator.address(self.driver.network())
    }

    fn unlock_slot(&self, lock_time_ms: u64) -> Result<Slot, DriverError> {
        let unlock_ms = lock_time_ms
            .checked_add(self.config.wait_time_ms)
            .ok_or(DriverError::ValueOverflow)?;
        self.driver.slot_at(unlock_ms)
    }

    /// A pending withdrawal request takes precedence over idle deposits
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be queried or a datum is malformed.
    pub fn state(&self) -> Result<VaultState, DriverError> {
        let utxos = self.driver.utxos_at(&self.address())?;
        for utxo in &utxos {
            if let Some(lock_time_ms) = lock_time_of(utxo)? {
                return Ok(VaultState::WithdrawRequested {
                    tx_ref: utxo.tx_ref,
                    value: utxo.value.clone(),
                    lock_time_ms,
                    unlock_slot: self.unlock_slot(lock_time_ms)?,
                });
            }
        }
        Ok(utxos.into_iter().next().map_or(VaultState::Empty, |utxo| VaultState::Idle {
            tx_ref: utxo.tx_ref,
            value: utxo.value,
        }))
    }

    /// Lock `value` in the vault
    ///
    /// # Errors
    ///
    /// Returns an error if submission fails.
    pub fn deposit(&self, value: Value) -> Result<Outcome, DriverError> {
        let builder = self
            .driver
            .builder()
            .leg(TxLeg::pay_to_script(self.address(), value, None))
            .validity(self.driver.immediate_window()?);
        let outcome = self.driver.execute(builder, &[])?;
        info!(workflow = WORKFLOW, action = "deposit", %outcome);
        Ok(outcome)
    }

    /// Start the withdrawal clock on an idle deposit
    ///
    /// The lock time recorded is the POSIX time of the current slot.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::IllegalTransition`] unless the vault is idle.
    pub fn request_withdraw(&self) -> Result<Outcome, DriverError> {
        let state = self.state()?;
        if !matches!(state, VaultState::Idle { .. }) {
            return Err(illegal("request_withdraw", &state));
        }
        let utxo = self.driver.select_first(&self.address(), &UtxoPredicate::NoInlineDatum)?;
        let held = self.driver.hold([utxo.tx_ref]);
        let value = utxo.value.clone();
        let lock_time_ms = self.driver.now_ms()?;
        let owner = self.config.owner;
        let spend =
            ScriptSpend::new(utxo, REDEEMERS.bare("request_withdraw")?, self.validator.clone()).requires(owner);

        let builder = self
            .driver
            .builder()
            .leg(TxLeg::SpendScript(spend))
            .leg(TxLeg::pay_to_script(self.address(), value, Some(request_datum(lock_time_ms))))
            .required_signer(owner)
            .validity(self.driver.immediate_window()?);
        held.commit();
        let outcome = self.driver.execute(builder, &[])?;
        info!(workflow = WORKFLOW, action = "request_withdraw", lock_time_ms, %outcome);
        Ok(outcome)
    }

    /// Pay a requested withdrawal to the owner
    ///
    /// The window starts now and is only stretched to reach the unlock time.
    /// Called early, the window straddles the unlock and the validator decides.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::IllegalTransition`] unless a withdrawal is requested.
    pub fn finalize(&self) -> Result<Outcome, DriverError> {
        let state = self.state()?;
        let VaultState::WithdrawRequested {
            tx_ref,
            lock_time_ms,
            unlock_slot,
            ..
        } = state
        else {
            return Err(illegal("finalize_withdraw", &state));
        };
        let utxo = self.driver.select_first(&self.address(), &UtxoPredicate::AtRef(tx_ref))?;
        let held = self.driver.hold([utxo.tx_ref]);
        let value = utxo.value.clone();
        let owner = self.config.owner;
        let spend = ScriptSpend::new(utxo, REDEEMERS.bare("finalize_withdraw")?, self.validator.clone())
            .gate(TimeGate::After(unlock_slot))
            .requires(owner);

        let unlock_ms = lock_time_ms
            .checked_add(self.config.wait_time_ms)
            .ok_or(DriverError::ValueOverflow)?;
        let window = self.driver.window(&WindowPolicy::NoEarlierThan {
            lock: LockPoint::PosixMs(unlock_ms),
            tolerance: self.driver.tolerance(),
            anchor: Anchor::Now,
        })?;
        let builder = self
            .driver
            .builder()
            .leg(TxLeg::SpendScript(spend))
            .leg(TxLeg::pay(self.driver.key_address(owner), value))
            .required_signer(owner)
            .validity(window);
        held.commit();
        let outcome = self.driver.execute(builder, &[])?;
        info!(workflow = WORKFLOW, action = "finalize_withdraw", %outcome);
        Ok(outcome)
    }

    /// Abandon a withdrawal request and return the deposit to idle
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::IllegalTransition`] unless a withdrawal is requested.
    pub fn cancel(&self) -> Result<Outcome, DriverError> {
        let state = self.state()?;
        let VaultState::WithdrawRequested { tx_ref, .. } = state else {
            return Err(illegal("cancel", &state));
        };
        let utxo = self.driver.select_first(&self.address(), &UtxoPredicate::AtRef(tx_ref))?;
        let held = self.driver.hold([utxo.tx_ref]);
        let value = utxo.value.clone();
        let owner = self.config.owner;
        let spend = ScriptSpend::new(utxo, REDEEMERS.bare("cancel")?, self.validator.clone()).requires(owner);

        let builder = self
            .driver
            .builder()
            .leg(TxLeg::SpendScript(spend))
            .leg(TxLeg::pay_to_script(self.address(), value, None))
            .required_signer(owner)
            .validity(self.driver.immediate_window()?);
        held.commit();
        let outcome = self.driver.execute(builder, &[])?;
        info!(workflow = WORKFLOW, action = "cancel", %outcome);
        Ok(outcome)
    }

    /// Block until a pending withdrawal can be finalized
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::IllegalTransition`] unless a withdrawal is requested.
    pub fn await_unlock(&self) -> Result<WaitOutcome<Slot>, DriverError> {
        match self.state()? {
            VaultState::WithdrawRequested { unlock_slot, .. } => self.driver.wait_until(unlock_slot),
            state => Err(illegal("await_unlock", &state)),
        }
    }
}

fn illegal(action: &'static str, state: &VaultState) -> DriverError {
    DriverError::IllegalTransition {
        workflow: WORKFLOW,
        action,
        state: state.to_string(),
    }
}
