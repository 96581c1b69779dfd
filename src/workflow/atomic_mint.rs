//! Atomic spend-and-mint demo
//!
//! One transaction spends a script UTXO and mints a token under a policy that
//! checks a password. Either both scripts accept or nothing changes.

use super::{load_validator, Driver};
use crate::blueprint::{Blueprint, ScriptParameterizer, Validator};
use crate::client::LedgerClient;
use crate::compose::{MintLeg, ScriptSpend, TxLeg};
use crate::datum::Datum;
use crate::error::DriverError;
use crate::ledger::{Address, AssetId, TxRef, Value};
use crate::redeemer::{RedeemerSpec, RedeemerTable};
use crate::selector::UtxoPredicate;
use crate::signer::Signer;
use crate::submit::Outcome;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

pub const SPEND_REDEEMERS: RedeemerTable = RedeemerTable {
    workflow: "atomic_mint",
    entries: &[RedeemerSpec {
        action: "unlock",
        tag: 0,
        arity: 0,
    }],
};

pub const MINT_REDEEMERS: RedeemerTable = RedeemerTable {
    workflow: "atomic_mint",
    entries: &[RedeemerSpec {
        action: "mint",
        tag: 0,
        arity: 1,
    }],
};

fn default_asset_name() -> String {
    "TestAsset".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicMintConfig {
    /// Name of the token minted on resolution
    #[serde(default = "default_asset_name")]
    pub asset_name: String,
}

impl Default for AtomicMintConfig {
    fn default() -> Self {
        Self {
            asset_name: default_asset_name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtomicMintState {
    Funded { tx_ref: TxRef, value: Value },
    Resolved,
}

impl fmt::Display for AtomicMintState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Funded { tx_ref, .. } => write!(f, "funded at {tx_ref}"),
            Self::Resolved => write!(f, "resolved"),
        }
    }
}

pub struct AtomicMint<'a, C, S> {
    driver: &'a Driver<C, S>,
    config: AtomicMintConfig,
    spend_validator: Validator,
    policy: Validator,
}

impl<'a, C: LedgerClient, S: Signer> AtomicMint<'a, C, S> {
    #[must_use]
    pub const fn new(
        driver: &'a Driver<C, S>,
        config: AtomicMintConfig,
        spend_validator: Validator,
        policy: Validator,
    ) -> Self {
        Self {
            driver,
            config,
            spend_validator,
            policy,
        }
    }

    /// Load the spending validator and minting policy, both unparameterized
    ///
    /// # Errors
    ///
    /// Returns an error if either redeemer table disagrees with the blueprint.
    pub fn from_blueprint(
        driver: &'a Driver<C, S>,
        config: AtomicMintConfig,
        blueprint: &Blueprint,
        spend_title: &str,
        mint_title: &str,
        parameterizer: &dyn ScriptParameterizer,
    ) -> Result<Self, DriverError> {
        let spend_validator = load_validator(blueprint, spend_title, &SPEND_REDEEMERS, &[], parameterizer)?;
        let policy = load_validator(blueprint, mint_title, &MINT_REDEEMERS, &[], parameterizer)?;
        Ok(Self::new(driver, config, spend_validator, policy))
    }

    pub const fn address(&self) -> Address {
        self.spend_validator.address(self.driver.network())
    }

    pub const fn spend_validator(&self) -> &Validator {
        &self.spend_validator
    }

    pub const fn policy(&self) -> &Validator {
        &self.policy
    }

    /// The token minted on resolution
    #[must_use]
    pub fn asset(&self) -> AssetId {
        AssetId::native(self.policy.hash, self.config.asset_name.as_bytes())
    }

    /// # Errors
    ///
    /// Returns an error if the ledger cannot be queried.
    pub fn state(&self) -> Result<AtomicMintState, DriverError> {
        let funded = self
            .driver
            .utxos_at(&self.address())?
            .into_iter()
            .find(|utxo| UtxoPredicate::HasInlineDatum.matches(utxo));
        Ok(funded.map_or(AtomicMintState::Resolved, |utxo| AtomicMintState::Funded {
            tx_ref: utxo.tx_ref,
            value: utxo.value,
        }))
    }

    /// # Errors
    ///
    /// Returns an error if submission fails.
    pub fn fund(&self, value: Value) -> Result<Outcome, DriverError> {
        let builder = self
            .driver
            .builder()
            .leg(TxLeg::pay_to_script(self.address(), value, Some(Datum::unit())))
            .validity(self.driver.immediate_window()?);
        let outcome = self.driver.execute(builder, &[])?;
        info!(workflow = "atomic_mint", action = "fund", %outcome);
        Ok(outcome)
    }

    /// Spend the funded UTXO and mint one token to `recipient`
    ///
    /// The payout and the token land in a single merged output. A wrong password
    /// fails the minting policy, so the spend is rolled back with it.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is funded or submission fails.
    pub fn resolve(&self, password: &str, recipient: &Address) -> Result<Outcome, DriverError> {
        let utxo = self.driver.select_first(&self.address(), &UtxoPredicate::HasInlineDatum)?;
        let held = self.driver.hold([utxo.tx_ref]);
        let value = utxo.value.clone();
        let spend = ScriptSpend::new(utxo, SPEND_REDEEMERS.bare("unlock")?, self.spend_validator.clone());
        let mint = MintLeg {
            validator: self.policy.clone(),
            asset_name: self.config.asset_name.as_bytes().to_vec(),
            quantity: 1,
            redeemer: MINT_REDEEMERS.build("mint", [password])?,
            recipient: *recipient,
        };

        let builder = self
            .driver
            .builder()
            .leg(TxLeg::SpendScript(spend))
            .leg(TxLeg::pay(*recipient, value))
            .leg(TxLeg::Mint(mint))
            .merge_outputs(true)
            .validity(self.driver.immediate_window()?);
        held.commit();
        let outcome = self.driver.execute(builder, &[])?;
        info!(workflow = "atomic_mint", action = "resolve", %outcome);
        Ok(outcome)
    }

    /// Burn `quantity` previously minted tokens held by the driver's wallet
    ///
    /// # Errors
    ///
    /// Returns an error if `quantity` is zero or out of range, or submission fails.
    pub fn burn(&self, password: &str, quantity: u64) -> Result<Outcome, DriverError> {
        let quantity = i64::try_from(quantity)
            .ok()
            .and_then(i64::checked_neg)
            .ok_or(DriverError::ValueOverflow)?;
        let mint = MintLeg {
            validator: self.policy.clone(),
            asset_name: self.config.asset_name.as_bytes().to_vec(),
            quantity,
            redeemer: MINT_REDEEMERS.build("mint", [password])?,
            recipient: self.driver.wallet(),
        };
        let builder = self
            .driver
            .builder()
            .leg(TxLeg::Mint(mint))
            .validity(self.driver.immediate_window()?);
        let outcome = self.driver.execute(builder, &[])?;
        info!(workflow = "atomic_mint", action = "burn", %outcome);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redeemer::Redeemer;

    #[test]
    fn test_redeemers() {
        assert_eq!(SPEND_REDEEMERS.bare("unlock").unwrap(), Redeemer::bare(0));
        let mint = MINT_REDEEMERS.build("mint", ["hunter2"]).unwrap();
        assert_eq!(mint.to_datum(), Datum::constr(0, vec![Datum::bytes(b"hunter2".to_vec())]));
        assert_eq!(Redeemer::decode(&mint.encode().unwrap()).unwrap(), mint);
    }

    #[test]
    fn test_default_config() {
        let config: AtomicMintConfig = toml::from_str("").unwrap();
        assert_eq!(config, AtomicMintConfig::default());
        assert_eq!(config.asset_name, "TestAsset");
    }
}
