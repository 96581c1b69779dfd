//! Crowdfund with a goal and a deadline
//!
//! The pot is a single script UTXO whose datum records every donor's running
//! contribution as `Constr 0 [Map donor -> amount]`. The beneficiary claims once
//! the goal is reached; after an unsuccessful deadline the pot is paid back.

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

const WORKFLOW: &str = "crowdfund";

pub const REDEEMERS: RedeemerTable = RedeemerTable {
    workflow: WORKFLOW,
    entries: &[
        RedeemerSpec {
            action: "donate",
            tag: 0,
            arity: 0,
        },
        RedeemerSpec {
            action: "claim",
            tag: 1,
            arity: 0,
        },
        RedeemerSpec {
            action: "reclaim",
            tag: 2,
            arity: 0,
        },
    ],
};

/// Script parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrowdfundConfig {
    pub beneficiary: KeyHash,
    /// Lovelace the pot must reach before the beneficiary may claim
    pub goal: u64,
    /// POSIX time (ms) after which an unsuccessful pot may be reclaimed
    pub deadline_ms: u64,
}

impl CrowdfundConfig {
    /// `[beneficiary, goal, deadline_ms]`
    #[must_use]
    pub fn params(&self) -> Vec<Datum> {
        vec![
            Datum::bytes(self.beneficiary.as_bytes().to_vec()),
            Datum::int(self.goal),
            Datum::int(self.deadline_ms),
        ]
    }
}

/// Per-donor contributions in first-donation order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DonorMap(Vec<(KeyHash, u64)>);

impl DonorMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` to the donor's entry, creating it if absent
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::ValueOverflow`] if the entry would overflow.
    pub fn credit(&mut self, donor: KeyHash, amount: u64) -> Result<(), DriverError> {
        if let Some((_, credited)) = self.0.iter_mut().find(|(key, _)| *key == donor) {
            *credited = credited.checked_add(amount).ok_or(DriverError::ValueOverflow)?;
        } else {
            self.0.push((donor, amount));
        }
        Ok(())
    }

    #[must_use]
    pub fn credited(&self, donor: &KeyHash) -> u64 {
        self.0
            .iter()
            .find(|(key, _)| key == donor)
            .map_or(0, |(_, amount)| *amount)
    }

    /// # Errors
    ///
    /// Returns [`DriverError::ValueOverflow`] if the sum overflows.
    pub fn total(&self) -> Result<u64, DriverError> {
        self.0
            .iter()
            .try_fold(0u64, |acc, (_, amount)| acc.checked_add(*amount))
            .ok_or(DriverError::ValueOverflow)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&KeyHash, u64)> {
        self.0.iter().map(|(key, amount)| (key, *amount))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn to_datum(&self) -> Datum {
        let entries = self
            .0
            .iter()
            .map(|(key, amount)| (Datum::bytes(key.as_bytes().to_vec()), Datum::int(*amount)))
            .collect();
        Datum::constr(0, vec![Datum::Map(entries)])
    }

    /// # Errors
    ///
    /// Returns [`DriverError::UnexpectedDatum`] unless the datum is
    /// `Constr 0 [Map bytes -> int]` with 28-byte keys and non-negative amounts.
    pub fn from_datum(datum: &Datum) -> Result<Self, DriverError> {
        let unexpected = |detail: String| DriverError::UnexpectedDatum {
            workflow: WORKFLOW,
            detail,
        };
        let entries = match datum.as_constr() {
            Some((0, [map])) => map
                .as_map()
                .ok_or_else(|| unexpected(format!("expected a donor map, found {}", map.kind())))?,
            _ => return Err(unexpected(format!("expected Constr 0 [map], found {}", datum.kind()))),
        };

        let mut donors = Self::new();
        for (key, amount) in entries {
            let key = key
                .as_bytes()
                .ok_or_else(|| unexpected(format!("donor key is {}", key.kind())))
                .and_then(|bytes| KeyHash::from_slice(bytes).map_err(|e| unexpected(e.to_string())))?;
            let amount = amount
                .as_int()
                .and_then(|i| u64::try_from(i).ok())
                .ok_or_else(|| unexpected(format!("amount for {key} is not a lovelace quantity")))?;
            donors.credit(key, amount)?;
        }
        Ok(donors)
    }
}

/// The crowdfund UTXO and its decoded datum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pot {
    pub tx_ref: TxRef,
    pub value: Value,
    pub donors: DonorMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrowdfundState {
    /// Nothing locked yet
    Closed,
    /// Below the goal, before the deadline
    Funding(Pot),
    /// Goal reached; claimable by the beneficiary
    Reached(Pot),
    /// Deadline passed below the goal; refundable
    Expired(Pot),
}

impl CrowdfundState {
    #[must_use]
    pub const fn pot(&self) -> Option<&Pot> {
        match self {
            Self::Closed => None,
            Self::Funding(pot) | Self::Reached(pot) | Self::Expired(pot) => Some(pot),
        }
    }
}

impl fmt::Display for CrowdfundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Funding(_) => write!(f, "funding"),
            Self::Reached(_) => write!(f, "reached"),
            Self::Expired(_) => write!(f, "expired"),
        }
    }
}

/// Who receives the pot when an expired crowdfund is reclaimed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReclaimPayout {
    /// Every donor gets their own contribution back
    #[default]
    PerDonor,
    /// The whole pot goes to one address
    Aggregate(Address),
}

pub struct Crowdfund<'a, C, S> {
    driver: &'a Driver<C, S>,
    config: CrowdfundConfig,
    validator: Validator,
}

impl<'a, C: LedgerClient, S: Signer> Crowdfund<'a, C, S> {
    #[must_use]
    pub const fn new(driver: &'a Driver<C, S>, config: CrowdfundConfig, validator: Validator) -> Self {
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
        config: CrowdfundConfig,
        blueprint: &Blueprint,
        title: &str,
        parameterizer: &dyn ScriptParameterizer,
    ) -> Result<Self, DriverError> {
        let validator = load_validator(blueprint, title, &REDEEMERS, &config.params(), parameterizer)?;
        Ok(Self::new(driver, config, validator))
    }

    pub const fn config(&self) -> &CrowdfundConfig {
        &self.config
    }

    pub const fn validator(&self) -> &Validator {
        &self.validator
    }

    pub const fn address(&self) -> Address {
        self.validator.address(self.driver.network())
    }

    /// # Errors
    ///
    /// Returns an error if the deadline predates the slot clock.
    pub fn deadline_slot(&self) -> Result<Slot, DriverError> {
        self.driver.slot_at(self.config.deadline_ms)
    }

    /// Derive the state from the pot UTXO and the current slot
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be queried or the pot's datum is malformed.
    pub fn state(&self) -> Result<CrowdfundState, DriverError> {
        let Some(utxo) = self
            .driver
            .utxos_at(&self.address())?
            .into_iter()
            .find(|utxo| UtxoPredicate::HasInlineDatum.matches(utxo))
        else {
            return Ok(CrowdfundState::Closed);
        };
        let pot = pot_of(utxo)?;
        let reached = pot.donors.total()? >= self.config.goal;
        let past_deadline = self.driver.now()? >= self.deadline_slot()?;
        Ok(match (reached, past_deadline) {
            (true, _) => CrowdfundState::Reached(pot),
            (false, false) => CrowdfundState::Funding(pot),
            (false, true) => CrowdfundState::Expired(pot),
        })
    }

    /// Create the pot with a first donation
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::IllegalTransition`] if a pot already exists.
    pub fn open(&self, donor: KeyHash, amount: u64) -> Result<Outcome, DriverError> {
        let state = self.state()?;
        if !matches!(state, CrowdfundState::Closed) {
            return Err(illegal("open", &state));
        }
        let mut donors = DonorMap::new();
        donors.credit(donor, amount)?;

        let value = Value::lovelace(amount);
        let window = self.driver.immediate_window()?;
        let funding = self.driver.fund_from(&self.driver.key_address(donor), &value)?;
        let builder = self
            .driver
            .builder()
            .legs(funding)
            .leg(TxLeg::pay_to_script(self.address(), value, Some(donors.to_datum())))
            .validity(window);
        let outcome = self.driver.execute(builder, &[])?;
        info!(workflow = WORKFLOW, action = "open", %donor, amount, %outcome);
        Ok(outcome)
    }

    /// Add `amount` from `donor` to the pot
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::IllegalTransition`] unless the pot is funding or
    /// reached, and a composition error once the deadline has passed.
    pub fn donate(&self, donor: KeyHash, amount: u64) -> Result<Outcome, DriverError> {
        let state = self.state()?;
        if !matches!(state, CrowdfundState::Funding(_) | CrowdfundState::Reached(_)) {
            return Err(illegal("donate", &state));
        }
        let utxo = self.driver.select_first(&self.address(), &UtxoPredicate::HasInlineDatum)?;
        let held = self.driver.hold([utxo.tx_ref]);
        let pot = pot_of(utxo.clone())?;
        let mut donors = pot.donors;
        donors.credit(donor, amount)?;
        let donation = Value::lovelace(amount);
        let relocked = pot.value.checked_add(&donation).ok_or(DriverError::ValueOverflow)?;

        let spend = ScriptSpend::new(utxo, REDEEMERS.bare("donate")?, self.validator.clone())
            .gate(TimeGate::Before(self.deadline_slot()?))
            .requires(donor);
        let window = self.driver.immediate_window()?;
        // Last fallible step: it releases its own selection on failure.
        let funding = self.driver.fund_from(&self.driver.key_address(donor), &donation)?;
        let builder = self
            .driver
            .builder()
            .leg(TxLeg::SpendScript(spend))
            .legs(funding)
            .leg(TxLeg::pay_to_script(self.address(), relocked, Some(donors.to_datum())))
            .required_signer(donor)
            .validity(window);
        held.commit();
        let outcome = self.driver.execute(builder, &[])?;
        info!(workflow = WORKFLOW, action = "donate", %donor, amount, %outcome);
        Ok(outcome)
    }

    /// Pay the pot to the beneficiary
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::IllegalTransition`] unless the goal is reached.
    pub fn claim(&self) -> Result<Outcome, DriverError> {
        let state = self.state()?;
        if !matches!(state, CrowdfundState::Reached(_)) {
            return Err(illegal("claim", &state));
        }
        let utxo = self.driver.select_first(&self.address(), &UtxoPredicate::HasInlineDatum)?;
        let held = self.driver.hold([utxo.tx_ref]);
        let value = utxo.value.clone();
        let beneficiary = self.config.beneficiary;
        let spend = ScriptSpend::new(utxo, REDEEMERS.bare("claim")?, self.validator.clone()).requires(beneficiary);

        let builder = self
            .driver
            .builder()
            .leg(TxLeg::SpendScript(spend))
            .leg(TxLeg::pay(self.driver.key_address(beneficiary), value))
            .required_signer(beneficiary)
            .validity(self.driver.immediate_window()?);
        held.commit();
        let outcome = self.driver.execute(builder, &[])?;
        info!(workflow = WORKFLOW, action = "claim", %outcome);
        Ok(outcome)
    }

    /// Pay an expired pot back, signed by `caller`
    ///
    /// Whatever the payout does not cover is paid to `caller`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::IllegalTransition`] unless the pot has expired.
    pub fn reclaim(&self, caller: KeyHash, payout: ReclaimPayout) -> Result<Outcome, DriverError> {
        let state = self.state()?;
        if !matches!(state, CrowdfundState::Expired(_)) {
            return Err(illegal("reclaim", &state));
        }
        let utxo = self.driver.select_first(&self.address(), &UtxoPredicate::HasInlineDatum)?;
        let held = self.driver.hold([utxo.tx_ref]);
        let pot = pot_of(utxo.clone())?;

        let mut legs = Vec::new();
        let mut paid = Value::default();
        match payout {
            ReclaimPayout::PerDonor => {
                for (donor, amount) in pot.donors.iter().filter(|(_, amount)| *amount > 0) {
                    let refund = Value::lovelace(amount);
                    paid = paid.checked_add(&refund).ok_or(DriverError::ValueOverflow)?;
                    legs.push(TxLeg::pay(self.driver.key_address(*donor), refund));
                }
            }
            ReclaimPayout::Aggregate(address) => {
                paid = pot.value.clone();
                legs.push(TxLeg::pay(address, pot.value.clone()));
            }
        }
        let remainder = pot.value.checked_sub(&paid).ok_or(DriverError::ValueOverflow)?;
        if !remainder.is_empty() {
            legs.push(TxLeg::pay(self.driver.key_address(caller), remainder));
        }

        let spend = ScriptSpend::new(utxo, REDEEMERS.bare("reclaim")?, self.validator.clone())
            .gate(TimeGate::After(self.deadline_slot()?))
            .requires(caller);
        let window = self.driver.window(&WindowPolicy::NoEarlierThan {
            lock: LockPoint::PosixMs(self.config.deadline_ms),
            tolerance: self.driver.tolerance(),
            anchor: Anchor::Deadline,
        })?;
        let builder = self
            .driver
            .builder()
            .leg(TxLeg::SpendScript(spend))
            .legs(legs)
            .required_signer(caller)
            .validity(window);
        held.commit();
        let outcome = self.driver.execute(builder, &[])?;
        info!(workflow = WORKFLOW, action = "reclaim", %caller, %outcome);
        Ok(outcome)
    }

    /// Block until the deadline slot is reached
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be queried.
    pub fn await_deadline(&self) -> Result<WaitOutcome<Slot>, DriverError> {
        self.driver.wait_until(self.deadline_slot()?)
    }
}

fn pot_of(utxo: Utxo) -> Result<Pot, DriverError> {
    let donors = match &utxo.inline_datum {
        Some(datum) => DonorMap::from_datum(datum)?,
        None => {
            return Err(DriverError::UnexpectedDatum {
                workflow: WORKFLOW,
                detail: format!("pot {} has no datum", utxo.tx_ref),
            })
        }
    };
    Ok(Pot {
        tx_ref: utxo.tx_ref,
        value: utxo.value,
        donors,
    })
}

fn illegal(action: &'static str, state: &CrowdfundState) -> DriverError {
    DriverError::IllegalTransition {
        workflow: WORKFLOW,
        action,
        state: state.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redeemer::Redeemer;
    use crate::test_fixtures::test_key_hash;

    #[test]
    fn test_credit_appends_then_increments() {
        let mut donors = DonorMap::new();
        donors.credit(test_key_hash(1), 5).unwrap();
        donors.credit(test_key_hash(2), 7).unwrap();
        donors.credit(test_key_hash(1), 3).unwrap();

        assert_eq!(donors.len(), 2);
        assert_eq!(donors.credited(&test_key_hash(1)), 8);
        assert_eq!(donors.credited(&test_key_hash(3)), 0);
        assert_eq!(donors.total().unwrap(), 15);
        let order: Vec<_> = donors.iter().map(|(key, _)| *key).collect();
        assert_eq!(order, vec![test_key_hash(1), test_key_hash(2)]);
    }

    #[test]
    fn test_credit_overflow() {
        let mut donors = DonorMap::new();
        donors.credit(test_key_hash(1), u64::MAX).unwrap();
        assert!(matches!(
            donors.credit(test_key_hash(1), 1),
            Err(DriverError::ValueOverflow)
        ));
    }

    #[test]
    fn test_datum_shape() {
        let mut donors = DonorMap::new();
        donors.credit(test_key_hash(1), 10).unwrap();
        let datum = donors.to_datum();
        let (tag, fields) = datum.as_constr().unwrap();
        assert_eq!(tag, 0);
        assert_eq!(fields[0].as_map().unwrap().len(), 1);
        assert_eq!(DonorMap::from_datum(&datum).unwrap(), donors);
    }

    #[test]
    fn test_from_bad_datum() {
        assert!(matches!(
            DonorMap::from_datum(&Datum::unit()),
            Err(DriverError::UnexpectedDatum { .. })
        ));
        let negative = Datum::constr(
            0,
            vec![Datum::Map(vec![(
                Datum::bytes(test_key_hash(1).as_bytes().to_vec()),
                Datum::int(-5),
            )])],
        );
        assert!(DonorMap::from_datum(&negative).is_err());
    }

    #[test]
    fn test_redeemer_round_trip() {
        for (action, tag) in [("donate", 0), ("claim", 1), ("reclaim", 2)] {
            let redeemer = REDEEMERS.bare(action).unwrap();
            assert_eq!(redeemer.tag, tag);
            assert_eq!(Redeemer::decode(&redeemer.encode().unwrap()).unwrap(), redeemer);
        }
    }
}
