//! Transaction composition
//!
//! [`TxBuilder`] collects legs, a fee payer, required signers and a validity
//! window, then [`TxBuilder::compose`] checks them for static consistency and
//! produces a [`DraftTx`]. Composition is pure: nothing here queries the ledger.
//!
//! # Example
//!
//! ```ignore
//! use scriptflow::compose::{ScriptSpend, TxBuilder, TxLeg};
//!
//! let draft = TxBuilder::new()
//!     .leg(TxLeg::SpendScript(ScriptSpend::new(utxo, redeemer, validator)))
//!     .leg(TxLeg::pay(receiver, utxo.value.clone()))
//!     .funded_fee_payer(wallet)
//!     .validity(window)
//!     .compose()?;
//! ```

use crate::blueprint::Validator;
use crate::datum::Datum;
use crate::error::{CompositionError, EncodingError};
use crate::ledger::{Address, AssetId, KeyHash, ScriptHash, TxId, TxRef, Utxo, Value};
use crate::redeemer::Redeemer;
use crate::window::{TimeGate, ValidityWindow};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Spend of a script-locked UTXO under a redeemer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSpend {
    pub utxo: Utxo,
    pub redeemer: Redeemer,
    pub validator: Validator,
    /// Time branch the redeemer selects
    pub gate: TimeGate,
    /// Signers the selected branch checks for
    pub requires: Vec<KeyHash>,
}

impl ScriptSpend {
    #[must_use]
    pub fn new(utxo: Utxo, redeemer: Redeemer, validator: Validator) -> Self {
        Self {
            utxo,
            redeemer,
            validator,
            gate: TimeGate::None,
            requires: Vec::new(),
        }
    }

    #[must_use]
    pub fn gate(mut self, gate: TimeGate) -> Self {
        self.gate = gate;
        self
    }

    #[must_use]
    pub fn requires(mut self, signer: KeyHash) -> Self {
        self.requires.push(signer);
        self
    }
}

/// Mint (positive quantity) or burn (negative) under a minting policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintLeg {
    pub validator: Validator,
    pub asset_name: Vec<u8>,
    pub quantity: i64,
    pub redeemer: Redeemer,
    /// Receives freshly minted tokens
    pub recipient: Address,
}

/// One component of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxLeg {
    Pay {
        address: Address,
        value: Value,
    },
    PayToScript {
        address: Address,
        value: Value,
        datum: Option<Datum>,
    },
    SpendScript(ScriptSpend),
    Mint(MintLeg),
    /// Spend of a key-locked UTXO, e.g. a wallet output funding fees
    Collect(Utxo),
}

impl TxLeg {
    #[must_use]
    pub const fn pay(address: Address, value: Value) -> Self {
        Self::Pay { address, value }
    }

    #[must_use]
    pub const fn pay_to_script(address: Address, value: Value, datum: Option<Datum>) -> Self {
        Self::PayToScript {
            address,
            value,
            datum,
        }
    }
}

/// A script input with the redeemer and validator that unlock it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptInput {
    pub utxo: Utxo,
    pub redeemer: Redeemer,
    pub validator: ScriptHash,
}

/// A transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: Address,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datum: Option<Datum>,
}

/// A mint or burn entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintEntry {
    pub policy: ScriptHash,
    #[serde(with = "hex::serde")]
    pub asset_name: Vec<u8>,
    pub quantity: i64,
    pub redeemer: Redeemer,
}

impl MintEntry {
    #[must_use]
    pub fn asset(&self) -> AssetId {
        AssetId::native(self.policy, self.asset_name.clone())
    }
}

/// A composed, unsigned transaction body
///
/// Fee inputs and change beyond the declared legs are added by the backend that
/// balances against the fee payer's wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftTx {
    pub script_inputs: Vec<ScriptInput>,
    pub key_inputs: Vec<Utxo>,
    pub outputs: Vec<TxOutput>,
    pub mints: Vec<MintEntry>,
    pub validators: Vec<Validator>,
    pub fee_payer: Address,
    pub required_signers: Vec<KeyHash>,
    pub validity: ValidityWindow,
}

impl DraftTx {
    /// Transaction id: SHA-256 of the canonical JSON body
    ///
    /// # Errors
    ///
    /// Returns an error if a datum or redeemer is not representable in JSON.
    pub fn body_hash(&self) -> Result<TxId, EncodingError> {
        let body = serde_json::to_vec(self).map_err(|e| EncodingError::Malformed(e.to_string()))?;
        let digest: [u8; 32] = Sha256::digest(&body).into();
        Ok(TxId::from_bytes(digest))
    }

    /// References of every input, script and key-locked
    pub fn input_refs(&self) -> impl Iterator<Item = TxRef> + '_ {
        self.script_inputs
            .iter()
            .map(|input| input.utxo.tx_ref)
            .chain(self.key_inputs.iter().map(|utxo| utxo.tx_ref))
    }

    /// Validator attached for `hash`, if any
    #[must_use]
    pub fn validator(&self, hash: &ScriptHash) -> Option<&Validator> {
        self.validators.iter().find(|v| v.hash == *hash)
    }
}

/// Builder for composing transactions
#[derive(Debug, Clone, Default)]
pub struct TxBuilder {
    legs: Vec<TxLeg>,
    fee_payer: Option<Address>,
    funded: bool,
    required_signers: Vec<KeyHash>,
    validity: Option<ValidityWindow>,
    merge_outputs: bool,
}

impl TxBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn leg(mut self, leg: TxLeg) -> Self {
        self.legs.push(leg);
        self
    }

    #[must_use]
    pub fn legs(mut self, legs: impl IntoIterator<Item = TxLeg>) -> Self {
        self.legs.extend(legs);
        self
    }

    /// Fee payer that must own one of the collected inputs
    #[must_use]
    pub const fn fee_payer(mut self, address: Address) -> Self {
        self.fee_payer = Some(address);
        self.funded = false;
        self
    }

    /// Fee payer whose wallet the backend balances against
    #[must_use]
    pub const fn funded_fee_payer(mut self, address: Address) -> Self {
        self.fee_payer = Some(address);
        self.funded = true;
        self
    }

    #[must_use]
    pub fn required_signer(mut self, signer: KeyHash) -> Self {
        self.required_signers.push(signer);
        self
    }

    #[must_use]
    pub const fn validity(mut self, window: ValidityWindow) -> Self {
        self.validity = Some(window);
        self
    }

    /// Merge datum-less outputs to the same address into one
    #[must_use]
    pub const fn merge_outputs(mut self, merge: bool) -> Self {
        self.merge_outputs = merge;
        self
    }

    /// Inputs the legs would consume, in leg order
    #[must_use]
    pub fn input_refs(&self) -> Vec<TxRef> {
        self.legs
            .iter()
            .filter_map(|leg| match leg {
                TxLeg::SpendScript(spend) => Some(spend.utxo.tx_ref),
                TxLeg::Collect(utxo) => Some(utxo.tx_ref),
                TxLeg::Pay { .. } | TxLeg::PayToScript { .. } | TxLeg::Mint(_) => None,
            })
            .collect()
    }

    /// Check the legs for static consistency and produce the draft body
    ///
    /// # Errors
    ///
    /// Returns the first [`CompositionError`] found.
    pub fn compose(self) -> Result<DraftTx, CompositionError> {
        if self.legs.is_empty() {
            return Err(CompositionError::NoLegs);
        }
        let fee_payer = self.fee_payer.ok_or(CompositionError::MissingFeePayer)?;
        if fee_payer.is_script() {
            return Err(CompositionError::FeePayerIsScript(fee_payer));
        }
        let validity = self.validity.ok_or(CompositionError::MissingValidity)?;

        let mut seen = HashSet::new();
        let mut script_inputs = Vec::new();
        let mut key_inputs: Vec<Utxo> = Vec::new();
        let mut outputs = Vec::new();
        let mut mints = Vec::new();
        let mut validators: Vec<Validator> = Vec::new();
        let mut branch_signers: Vec<KeyHash> = Vec::new();

        for leg in self.legs {
            match leg {
                TxLeg::Pay { address, value } => {
                    outputs.push(checked_output(address, value, None)?);
                }
                TxLeg::PayToScript {
                    address,
                    value,
                    datum,
                } => {
                    outputs.push(checked_output(address, value, datum)?);
                }
                TxLeg::SpendScript(spend) => {
                    let tx_ref = spend.utxo.tx_ref;
                    if !seen.insert(tx_ref) {
                        return Err(CompositionError::DuplicateInput(tx_ref));
                    }
                    let expected = spend
                        .utxo
                        .address
                        .script_hash()
                        .ok_or(CompositionError::NotScriptLocked(tx_ref))?;
                    if spend.validator.hash != expected {
                        return Err(CompositionError::ValidatorMismatch {
                            tx_ref,
                            expected,
                            attached: spend.validator.hash,
                        });
                    }
                    check_gate(spend.gate, validity)?;
                    branch_signers.extend(spend.requires);
                    attach(&mut validators, spend.validator)?;
                    script_inputs.push(ScriptInput {
                        utxo: spend.utxo,
                        redeemer: spend.redeemer,
                        validator: expected,
                    });
                }
                TxLeg::Collect(utxo) => {
                    if !seen.insert(utxo.tx_ref) {
                        return Err(CompositionError::DuplicateInput(utxo.tx_ref));
                    }
                    if utxo.address.is_script() {
                        return Err(CompositionError::NotKeyLocked(utxo.tx_ref));
                    }
                    key_inputs.push(utxo);
                }
                TxLeg::Mint(mint) => {
                    if mint.quantity == 0 {
                        return Err(CompositionError::ZeroMint(mint.validator.hash));
                    }
                    let entry = MintEntry {
                        policy: mint.validator.hash,
                        asset_name: mint.asset_name,
                        quantity: mint.quantity,
                        redeemer: mint.redeemer,
                    };
                    if mint.quantity > 0 {
                        outputs.push(TxOutput {
                            address: mint.recipient,
                            value: Value::from_asset(entry.asset(), mint.quantity.unsigned_abs()),
                            datum: None,
                        });
                    }
                    attach(&mut validators, mint.validator)?;
                    mints.push(entry);
                }
            }
        }

        if script_inputs.is_empty() && key_inputs.is_empty() && !self.funded {
            return Err(CompositionError::NoInputs);
        }
        if !self.funded && !key_inputs.iter().any(|utxo| utxo.address == fee_payer) {
            return Err(CompositionError::UnfundedFeePayer(fee_payer));
        }

        let required_signers = check_signers(
            self.required_signers,
            &branch_signers,
            &fee_payer,
            &key_inputs,
        )?;

        let outputs = if self.merge_outputs {
            merge(outputs)
        } else {
            outputs
        };

        Ok(DraftTx {
            script_inputs,
            key_inputs,
            outputs,
            mints,
            validators,
            fee_payer,
            required_signers,
            validity,
        })
    }
}

fn checked_output(
    address: Address,
    value: Value,
    datum: Option<Datum>,
) -> Result<TxOutput, CompositionError> {
    if value.is_empty() {
        return Err(CompositionError::ZeroValueOutput(address));
    }
    Ok(TxOutput {
        address,
        value,
        datum,
    })
}

fn attach(validators: &mut Vec<Validator>, validator: Validator) -> Result<(), CompositionError> {
    if validator.code.is_empty() {
        return Err(CompositionError::ValidatorNotAttached(validator.hash));
    }
    if !validators.iter().any(|v| v.hash == validator.hash) {
        validators.push(validator);
    }
    Ok(())
}

fn check_gate(gate: TimeGate, window: ValidityWindow) -> Result<(), CompositionError> {
    match gate {
        TimeGate::None => Ok(()),
        TimeGate::After(gate) if window.valid_to() < gate => Err(CompositionError::WindowBeforeGate {
            from: window.valid_from(),
            to: window.valid_to(),
            gate,
        }),
        TimeGate::Before(gate) if window.valid_from() > gate => Err(CompositionError::WindowAfterGate {
            from: window.valid_from(),
            to: window.valid_to(),
            gate,
        }),
        TimeGate::After(_) | TimeGate::Before(_) => Ok(()),
    }
}

fn check_signers(
    listed: Vec<KeyHash>,
    branch: &[KeyHash],
    fee_payer: &Address,
    key_inputs: &[Utxo],
) -> Result<Vec<KeyHash>, CompositionError> {
    let mut unique = HashSet::new();
    for signer in &listed {
        if !unique.insert(*signer) {
            return Err(CompositionError::DuplicateSigner(*signer));
        }
    }
    if let Some(missing) = branch.iter().find(|signer| !unique.contains(signer)) {
        return Err(CompositionError::MissingSigner(*missing));
    }

    let justified = |signer: &KeyHash| {
        branch.contains(signer)
            || fee_payer.key_hash() == Some(*signer)
            || key_inputs.iter().any(|utxo| utxo.address.key_hash() == Some(*signer))
    };
    if let Some(unexpected) = listed.iter().find(|signer| !justified(signer)) {
        return Err(CompositionError::UnexpectedSigner(*unexpected));
    }

    let mut signers = listed;
    signers.sort();
    Ok(signers)
}

fn merge(outputs: Vec<TxOutput>) -> Vec<TxOutput> {
    let mut merged: Vec<TxOutput> = Vec::with_capacity(outputs.len());
    for output in outputs {
        if output.datum.is_none() {
            if let Some(existing) = merged
                .iter_mut()
                .find(|o| o.datum.is_none() && o.address == output.address)
            {
                if let Some(sum) = existing.value.checked_add(&output.value) {
                    existing.value = sum;
                    continue;
                }
            }
        }
        merged.push(output);
    }
    merged
}
