//! Hash time-locked contract
//!
//! Value locked at the script can be taken by anyone revealing the preimage of
//! `secret_hash` before `expiration_ms`, or reclaimed by `owner` afterwards.

use super::{load_validator, Driver};
use crate::blueprint::{Blueprint, ScriptParameterizer, Validator};
use crate::client::LedgerClient;
use crate::compose::{ScriptSpend, TxLeg};
use crate::datum::Datum;
use crate::error::DriverError;
use crate::ledger::{Address, KeyHash, Slot, TxRef, Value};
use crate::redeemer::{RedeemerSpec, RedeemerTable};
use crate::selector::UtxoPredicate;
use crate::signer::Signer;
use crate::submit::Outcome;
use crate::wait::WaitOutcome;
use crate::window::{Anchor, LockPoint, TimeGate, WindowPolicy};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::info;

pub const REDEEMERS: RedeemerTable = RedeemerTable {
    workflow: "htlc",
    entries: &[
        RedeemerSpec {
            action: "reveal_secret",
            tag: 0,
            arity: 1,
        },
        RedeemerSpec {
            action: "timeout_reclaim",
            tag: 1,
            arity: 0,
        },
    ],
};

/// Script parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtlcConfig {
    /// SHA-256 of the secret
    #[serde(with = "hex::serde")]
    pub secret_hash: [u8; 32],
    /// POSIX time (ms) after which only the owner may reclaim
    pub expiration_ms: u64,
    pub owner: KeyHash,
}

impl HtlcConfig {
    /// Config locking on the hash of `secret`
    #[must_use]
    pub fn from_secret(secret: &[u8], expiration_ms: u64, owner: KeyHash) -> Self {
        Self {
            secret_hash: Sha256::digest(secret).into(),
            expiration_ms,
            owner,
        }
    }

    /// `[secret_hash, expiration_ms, owner]`
    #[must_use]
    pub fn params(&self) -> Vec<Datum> {
        vec![
            Datum::bytes(self.secret_hash.to_vec()),
            Datum::int(self.expiration_ms),
            Datum::bytes(self.owner.as_bytes().to_vec()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtlcState {
    Locked { tx_ref: TxRef, value: Value },
    Unlocked,
}

impl fmt::Display for HtlcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locked { tx_ref, .. } => write!(f, "locked at {tx_ref}"),
            Self::Unlocked => write!(f, "unlocked"),
        }
    }
}

pub struct Htlc<'a, C, S> {
    driver: &'a Driver<C, S>,
    config: HtlcConfig,
    validator: Validator,
}

impl<'a, C: LedgerClient, S: Signer> Htlc<'a, C, S> {
    /// Workflow over an already parameterized validator
    #[must_use]
    pub const fn new(driver: &'a Driver<C, S>, config: HtlcConfig, validator: Validator) -> Self {
        Self {
            driver,
            config,
            validator,
        }
    }

    /// Load the validator from a blueprint and apply this config's parameters
    ///
    /// # Errors
    ///
    /// Returns an error if the redeemer table disagrees with the blueprint or
    /// parameter application fails.
    pub fn from_blueprint(
        driver: &'a Driver<C, S>,
        config: HtlcConfig,
        blueprint: &Blueprint,
        title: &str,
        parameterizer: &dyn ScriptParameterizer,
    ) -> Result<Self, DriverError> {
        let validator = load_validator(blueprint, title, &REDEEMERS, &config.params(), parameterizer)?;
        Ok(Self::new(driver, config, validator))
    }

    pub const fn config(&self) -> &HtlcConfig {
        &self.config
    }

    pub const fn validator(&self) -> &Validator {
        &self.validator
    }

    pub const fn address(&self) -> Address {
        self.validator.address(self.driver.network())
    }

    /// Slot at which the reveal branch closes and the reclaim branch opens
    ///
    /// # Errors
    ///
    /// Returns an error if the expiration predates the slot clock.
    pub fn expiration_slot(&self) -> Result<Slot, DriverError> {
        self.driver.slot_at(self.config.expiration_ms)
    }

    /// # Errors
    ///
    /// Returns an error if the ledger cannot be queried.
    pub fn state(&self) -> Result<HtlcState, DriverError> {
        let locked = self
            .driver
            .utxos_at(&self.address())?
            .into_iter()
            .find(|utxo| UtxoPredicate::HasInlineDatum.matches(utxo));
        Ok(match locked {
            Some(utxo) => HtlcState::Locked {
                tx_ref: utxo.tx_ref,
                value: utxo.value,
            },
            None => HtlcState::Unlocked,
        })
    }

    /// Lock `value` at the script, paid from `funder`'s wallet
    ///
    /// # Errors
    ///
    /// Returns an error if the funder cannot cover `value` or submission fails.
    pub fn lock(&self, funder: &Address, value: Value) -> Result<Outcome, DriverError> {
        let funding = self.driver.fund_from(funder, &value)?;
        let builder = self
            .driver
            .builder()
            .legs(funding)
            .leg(TxLeg::pay_to_script(self.address(), value, Some(Datum::unit())))
            .validity(self.driver.immediate_window()?);
        let outcome = self.driver.execute(builder, &[])?;
        info!(workflow = "htlc", action = "lock", %outcome);
        Ok(outcome)
    }

    /// Take the locked value by revealing the secret
    ///
    /// The secret is not checked locally; a wrong one surfaces as
    /// [`Outcome::ValidatorRejected`].
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is locked, the expiration has passed, or
    /// submission fails.
    pub fn reveal(&self, secret: &[u8], receiver: &Address) -> Result<Outcome, DriverError> {
        let utxo = self.driver.select_first(&self.address(), &UtxoPredicate::HasInlineDatum)?;
        let held = self.driver.hold([utxo.tx_ref]);
        let value = utxo.value.clone();
        let redeemer = REDEEMERS.build("reveal_secret", [secret.to_vec()])?;
        let spend = ScriptSpend::new(utxo, redeemer, self.validator.clone())
            .gate(TimeGate::Before(self.expiration_slot()?));

        let builder = self
            .driver
            .builder()
            .leg(TxLeg::SpendScript(spend))
            .leg(TxLeg::pay(*receiver, value))
            .validity(self.driver.immediate_window()?);
        held.commit();
        let outcome = self.driver.execute(builder, &[])?;
        info!(workflow = "htlc", action = "reveal_secret", %outcome);
        Ok(outcome)
    }

    /// Return the locked value to the owner after expiration
    ///
    /// Before expiration the window starts in the future and the node rejects
    /// the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is locked or submission fails.
    pub fn reclaim(&self) -> Result<Outcome, DriverError> {
        let utxo = self.driver.select_first(&self.address(), &UtxoPredicate::HasInlineDatum)?;
        let held = self.driver.hold([utxo.tx_ref]);
        let value = utxo.value.clone();
        let owner = self.config.owner;
        let spend = ScriptSpend::new(utxo, REDEEMERS.bare("timeout_reclaim")?, self.validator.clone())
            .gate(TimeGate::After(self.expiration_slot()?))
            .requires(owner);

        let window = self.driver.window(&WindowPolicy::NoEarlierThan {
            lock: LockPoint::PosixMs(self.config.expiration_ms),
            tolerance: self.driver.tolerance(),
            anchor: Anchor::Deadline,
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
        info!(workflow = "htlc", action = "timeout_reclaim", %outcome);
        Ok(outcome)
    }

    /// Block until the expiration slot is reached
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be queried.
    pub fn await_expiry(&self) -> Result<WaitOutcome<Slot>, DriverError> {
        self.driver.wait_until(self.expiration_slot()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::FieldValue;
    use crate::memory::DigestParameterizer;
    use crate::signer::Keyring;
    use crate::test_fixtures::{test_key_address, test_key_hash, SAMPLE_BLUEPRINT};

    #[test]
    fn test_config_params() {
        let config = HtlcConfig::from_secret(b"Secret Answer", 1_700_000_000_000, test_key_hash(3));
        let params = config.params();
        assert_eq!(params.len(), 3);
        assert_eq!(params[0].as_bytes().map(<[u8]>::len), Some(32));
        assert_eq!(params[1], Datum::int(1_700_000_000_000u64));
    }

    #[test]
    fn test_redeemer_round_trip() {
        let reveal = REDEEMERS.build("reveal_secret", [FieldValue::from("secret")]).unwrap();
        assert_eq!(
            crate::redeemer::Redeemer::decode(&reveal.encode().unwrap()).unwrap(),
            reveal
        );
        let timeout = REDEEMERS.bare("timeout_reclaim").unwrap();
        assert_eq!(timeout.to_datum(), Datum::constr(1, Vec::new()));
    }

    #[test]
    fn test_from_blueprint() {
        let blueprint = Blueprint::from_json(SAMPLE_BLUEPRINT).unwrap();
        let ledger = crate::memory::InMemoryLedger::new();
        let driver = Driver::new(ledger, Keyring::new(), test_key_address(1));
        let config = HtlcConfig::from_secret(b"s", 1_700_000_000_000, test_key_hash(2));
        let htlc = Htlc::from_blueprint(&driver, config.clone(), &blueprint, "htlc.htlc", &DigestParameterizer)
            .unwrap();
        let other = Htlc::from_blueprint(
            &driver,
            HtlcConfig::from_secret(b"t", 1_700_000_000_000, test_key_hash(2)),
            &blueprint,
            "htlc.htlc",
            &DigestParameterizer,
        )
        .unwrap();
        assert_ne!(htlc.validator().hash, other.validator().hash);
        assert!(htlc.address().is_script());
        assert_eq!(htlc.state().unwrap(), HtlcState::Unlocked);
    }

    #[test]
    fn test_config_toml() {
        let config = HtlcConfig::from_secret(b"s", 42, test_key_hash(2));
        let text = toml::to_string(&config).unwrap();
        let back: HtlcConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
