//! Payment splitter
//!
//! Funds locked under the owner's datum are divided evenly between a fixed list
//! of payees in one transaction.

use super::{load_validator, Driver};
use crate::blueprint::{Blueprint, ScriptParameterizer, Validator};
use crate::client::LedgerClient;
use crate::compose::{ScriptSpend, TxLeg};
use crate::datum::Datum;
use crate::error::DriverError;
use crate::ledger::{Address, AssetId, KeyHash, TxRef, Value};
use crate::redeemer::{RedeemerSpec, RedeemerTable};
use crate::selector::UtxoPredicate;
use crate::signer::Signer;
use crate::submit::Outcome;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

const WORKFLOW: &str = "splitter";

/// Marker carried by the payout redeemer
pub const PAYOUT_MARKER: &str = "Payday";

pub const REDEEMERS: RedeemerTable = RedeemerTable {
    workflow: WORKFLOW,
    entries: &[RedeemerSpec {
        action: "payout",
        tag: 0,
        arity: 1,
    }],
};

/// What to do with lovelace that does not divide evenly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemainderPolicy {
    /// Refuse to split
    #[default]
    Reject,
    /// Add the remainder to the first payee's share
    FirstPayee,
}

const fn default_fee_leg() -> u64 {
    2_000_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitterConfig {
    pub payees: Vec<KeyHash>,
    /// Key recorded in the lock datum; signs every split
    pub owner: KeyHash,
    #[serde(default)]
    pub remainder: RemainderPolicy,
    /// Lovelace of the fee-only output paid back to the fee payer
    #[serde(default = "default_fee_leg")]
    pub fee_leg_lovelace: u64,
}

impl SplitterConfig {
    #[must_use]
    pub fn new(payees: Vec<KeyHash>, owner: KeyHash) -> Self {
        Self {
            payees,
            owner,
            remainder: RemainderPolicy::default(),
            fee_leg_lovelace: default_fee_leg(),
        }
    }

    #[must_use]
    pub const fn with_remainder(mut self, remainder: RemainderPolicy) -> Self {
        self.remainder = remainder;
        self
    }

    /// `[payees]`
    #[must_use]
    pub fn params(&self) -> Vec<Datum> {
        let payees = self
            .payees
            .iter()
            .map(|payee| Datum::bytes(payee.as_bytes().to_vec()))
            .collect();
        vec![Datum::List(payees)]
    }

    /// Lock datum: `Constr 0 [owner]`
    #[must_use]
    pub fn owner_datum(&self) -> Datum {
        Datum::constr(0, vec![Datum::bytes(self.owner.as_bytes().to_vec())])
    }
}

/// Per-payee lovelace shares of `total`
///
/// Every payee gets `total / payees`; a remainder is handled per `policy`.
///
/// # Errors
///
/// Returns [`DriverError::IndivisibleSplit`] when there are no payees, or when
/// there is a remainder under [`RemainderPolicy::Reject`].
pub fn split_even(total: u64, payees: usize, policy: RemainderPolicy) -> Result<Vec<u64>, DriverError> {
    let indivisible = DriverError::IndivisibleSplit { total, payees };
    let Ok(count) = u64::try_from(payees) else {
        return Err(indivisible);
    };
    if count == 0 {
        return Err(indivisible);
    }
    let share = total / count;
    let remainder = total % count;
    let mut shares = vec![share; payees];
    match (remainder, policy) {
        (0, _) => {}
        (_, RemainderPolicy::Reject) => return Err(indivisible),
        (_, RemainderPolicy::FirstPayee) => shares[0] += remainder,
    }
    Ok(shares)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitterState {
    Locked { utxos: Vec<TxRef>, value: Value },
    Split,
}

impl fmt::Display for SplitterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locked { utxos, .. } => write!(f, "locked in {} utxo(s)", utxos.len()),
            Self::Split => write!(f, "split"),
        }
    }
}

pub struct Splitter<'a, C, S> {
    driver: &'a Driver<C, S>,
    config: SplitterConfig,
    validator: Validator,
}

impl<'a, C: LedgerClient, S: Signer> Splitter<'a, C, S> {
    #[must_use]
    pub const fn new(driver: &'a Driver<C, S>, config: SplitterConfig, validator: Validator) -> Self {
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
        config: SplitterConfig,
        blueprint: &Blueprint,
        title: &str,
        parameterizer: &dyn ScriptParameterizer,
    ) -> Result<Self, DriverError> {
        let validator = load_validator(blueprint, title, &REDEEMERS, &config.params(), parameterizer)?;
        Ok(Self::new(driver, config, validator))
    }

    pub const fn config(&self) -> &SplitterConfig {
        &self.config
    }

    pub const fn validator(&self) -> &Validator {
        &self.validator
    }

    pub const fn address(&self) -> Address {
        self.validator.address(self.driver.network())
    }

    fn locked_predicate(&self) -> UtxoPredicate {
        UtxoPredicate::DatumEquals(self.config.owner_datum())
    }

    /// # Errors
    ///
    /// Returns an error if the ledger cannot be queried.
    pub fn state(&self) -> Result<SplitterState, DriverError> {
        let predicate = self.locked_predicate();
        let locked: Vec<_> = self
            .driver
            .utxos_at(&self.address())?
            .into_iter()
            .filter(|utxo| predicate.matches(utxo))
            .collect();
        if locked.is_empty() {
            return Ok(SplitterState::Split);
        }
        let value = locked
            .iter()
            .try_fold(Value::default(), |acc, utxo| acc.checked_add(&utxo.value))
            .ok_or(DriverError::ValueOverflow)?;
        Ok(SplitterState::Locked {
            utxos: locked.into_iter().map(|utxo| utxo.tx_ref).collect(),
            value,
        })
    }

    /// Lock `value` under the owner's datum
    ///
    /// # Errors
    ///
    /// Returns an error if submission fails.
    pub fn lock(&self, value: Value) -> Result<Outcome, DriverError> {
        let builder = self
            .driver
            .builder()
            .leg(TxLeg::pay_to_script(self.address(), value, Some(self.config.owner_datum())))
            .validity(self.driver.immediate_window()?);
        let outcome = self.driver.execute(builder, &[])?;
        info!(workflow = WORKFLOW, action = "lock", %outcome);
        Ok(outcome)
    }

    /// Spend every locked UTXO and pay each payee an even share
    ///
    /// Native assets, if any, go to the first payee along with its lovelace.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is locked or the lovelace does not split under
    /// the configured remainder policy.
    pub fn split(&self) -> Result<Outcome, DriverError> {
        let utxos = self.driver.select(&self.address(), &self.locked_predicate())?;
        if utxos.is_empty() {
            return Err(DriverError::SelectionEmpty {
                address: self.address(),
            });
        }
        let held = self.driver.hold(utxos.iter().map(|utxo| utxo.tx_ref));
        let total = utxos
            .iter()
            .try_fold(Value::default(), |acc, utxo| acc.checked_add(&utxo.value))
            .ok_or(DriverError::ValueOverflow)?;
        let payouts = self.payouts(&total)?;

        let owner = self.config.owner;
        let redeemer = REDEEMERS.build("payout", [PAYOUT_MARKER])?;
        let mut builder = self.driver.builder();
        for utxo in utxos {
            let spend = ScriptSpend::new(utxo, redeemer.clone(), self.validator.clone()).requires(owner);
            builder = builder.leg(TxLeg::SpendScript(spend));
        }
        builder = builder.legs(payouts);
        if self.config.fee_leg_lovelace > 0 {
            builder = builder.leg(TxLeg::pay(
                self.driver.wallet(),
                Value::lovelace(self.config.fee_leg_lovelace),
            ));
        }
        let builder = builder
            .required_signer(owner)
            .validity(self.driver.immediate_window()?);
        held.commit();
        let outcome = self.driver.execute(builder, &[])?;
        info!(workflow = WORKFLOW, action = "payout", payees = self.config.payees.len(), %outcome);
        Ok(outcome)
    }

    fn payouts(&self, total: &Value) -> Result<Vec<TxLeg>, DriverError> {
        let shares = split_even(total.lovelace_amount(), self.config.payees.len(), self.config.remainder)?;
        debug!(workflow = WORKFLOW, ?shares, "computed shares");

        let mut legs = Vec::with_capacity(shares.len());
        for (index, (payee, share)) in self.config.payees.iter().zip(shares).enumerate() {
            let mut value = Value::lovelace(share);
            if index == 0 {
                for (asset, amount) in total.iter().filter(|(asset, _)| **asset != AssetId::Lovelace) {
                    value
                        .checked_add_asset(asset.clone(), amount)
                        .ok_or(DriverError::ValueOverflow)?;
                }
            }
            legs.push(TxLeg::pay(self.driver.key_address(*payee), value));
        }
        Ok(legs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redeemer::Redeemer;
    use crate::test_fixtures::test_key_hash;

    #[test]
    fn test_split_even() {
        assert_eq!(split_even(30, 3, RemainderPolicy::Reject).unwrap(), vec![10, 10, 10]);
        assert_eq!(split_even(31, 3, RemainderPolicy::FirstPayee).unwrap(), vec![11, 10, 10]);
        assert!(matches!(
            split_even(31, 3, RemainderPolicy::Reject),
            Err(DriverError::IndivisibleSplit { total: 31, payees: 3 })
        ));
        assert!(matches!(
            split_even(30, 0, RemainderPolicy::FirstPayee),
            Err(DriverError::IndivisibleSplit { payees: 0, .. })
        ));
    }

    #[test]
    fn test_payout_redeemer() {
        let redeemer = REDEEMERS.build("payout", [PAYOUT_MARKER]).unwrap();
        assert_eq!(redeemer.fields, vec![Datum::bytes(b"Payday".to_vec())]);
        assert_eq!(Redeemer::decode(&redeemer.encode().unwrap()).unwrap(), redeemer);
    }

    #[test]
    fn test_config_defaults() {
        let config: SplitterConfig = toml::from_str(&format!(
            "payees = [\"{}\"]\nowner = \"{}\"\n",
            test_key_hash(1),
            test_key_hash(2)
        ))
        .unwrap();
        assert_eq!(config.remainder, RemainderPolicy::Reject);
        assert_eq!(config.fee_leg_lovelace, 2_000_000);
        assert_eq!(config, SplitterConfig::new(vec![test_key_hash(1)], test_key_hash(2)));
        assert_eq!(config.params()[0].as_list().map(<[Datum]>::len), Some(1));
    }
}
