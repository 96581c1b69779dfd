//! In-process ledger for tests and demos
//!
//! [`InMemoryLedger`] applies transactions atomically and checks the validity
//! interval, input existence, witnesses and required signers. It runs a
//! registered [`ScriptEvaluator`] per script input and mint, then balances the
//! transaction from the fee payer's wallet with a flat fee.
//!
//! The ledger is also a [`Clock`]: sleeping advances the slot counter, so polling
//! loops run in simulated time.

use crate::blueprint::{BlueprintValidator, PlutusVersion, ScriptParameterizer, Validator};
use crate::client::{ClientResult, LedgerClient, TxStatus};
use crate::compose::DraftTx;
use crate::datum::Datum;
use crate::error::{BlueprintError, ClientError};
use crate::ledger::{Address, KeyHash, ScriptHash, Slot, TxId, TxRef, Utxo, Value};
use crate::redeemer::Redeemer;
use crate::signer::SignedTx;
use crate::time::SlotConfig;
use crate::wait::Clock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

/// Flat fee charged per transaction, in lovelace
pub const DEFAULT_FEE: u64 = 200_000;

/// What a script is being run for
#[derive(Debug, Clone, Copy)]
pub enum ScriptPurpose<'a> {
    Spend(&'a Utxo),
    Mint(ScriptHash),
}

/// Everything a validator sees
#[derive(Debug, Clone, Copy)]
pub struct ScriptContext<'a> {
    pub purpose: ScriptPurpose<'a>,
    pub datum: Option<&'a Datum>,
    pub redeemer: &'a Redeemer,
    pub tx: &'a DraftTx,
    /// Keys with a valid witness on the transaction
    pub signatories: &'a [KeyHash],
    pub slot_config: &'a SlotConfig,
}

impl ScriptContext<'_> {
    #[must_use]
    pub fn signed_by(&self, key: &KeyHash) -> bool {
        self.signatories.contains(key)
    }

    /// POSIX time (ms) at the start of the validity interval
    #[must_use]
    pub fn valid_from_ms(&self) -> Option<u64> {
        self.slot_config.slot_to_posix(self.tx.validity.valid_from()).ok()
    }

    /// POSIX time (ms) at the end of the validity interval
    #[must_use]
    pub fn valid_to_ms(&self) -> Option<u64> {
        self.slot_config.slot_to_posix(self.tx.validity.valid_to()).ok()
    }

    /// Total value paid to `address` by the declared outputs
    ///
    /// Each asset saturates at `u64::MAX` rather than dropping an output.
    #[must_use]
    pub fn paid_to(&self, address: &Address) -> Value {
        self.tx
            .outputs
            .iter()
            .filter(|o| o.address == *address)
            .fold(Value::default(), |acc, o| acc.saturating_add(&o.value))
    }
}

/// On-chain logic stand-in: `Ok` accepts, `Err(reason)` fails the transaction
pub trait ScriptEvaluator: Send + Sync {
    fn evaluate(&self, ctx: &ScriptContext<'_>) -> Result<(), String>;
}

impl<F> ScriptEvaluator for F
where
    F: Fn(&ScriptContext<'_>) -> Result<(), String> + Send + Sync,
{
    fn evaluate(&self, ctx: &ScriptContext<'_>) -> Result<(), String> {
        self(ctx)
    }
}

/// Validator whose hash is the truncated SHA-256 of its code
#[must_use]
pub fn digest_validator(code: impl Into<Vec<u8>>) -> Validator {
    let code = code.into();
    let digest = Sha256::digest(&code);
    let mut hash = [0u8; ScriptHash::LEN];
    hash.copy_from_slice(&digest[..ScriptHash::LEN]);
    Validator {
        hash: ScriptHash::from_bytes(hash),
        code,
        version: PlutusVersion::V3,
    }
}

/// Parameterizer that appends the encoded parameters to the code and rehashes
///
/// Distinct parameters yield distinct script hashes, like real parameter
/// application, without a script toolchain.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestParameterizer;

impl ScriptParameterizer for DigestParameterizer {
    fn apply_parameters(
        &self,
        validator: &BlueprintValidator,
        params: &[Datum],
    ) -> Result<Validator, BlueprintError> {
        let mut code = validator.code_bytes()?;
        let encoded = Datum::List(params.to_vec())
            .encode()
            .map_err(|e| BlueprintError::Parameters(e.to_string()))?;
        code.extend_from_slice(encoded.as_bytes());
        Ok(digest_validator(code))
    }
}

struct LedgerInner {
    slot: Slot,
    slot_config: SlotConfig,
    utxos: Vec<Utxo>,
    evaluators: HashMap<ScriptHash, Arc<dyn ScriptEvaluator>>,
    accepted: HashMap<TxId, Slot>,
    settle_after: u64,
    fee: u64,
    funding_count: u64,
}

/// Shared in-memory ledger; clones observe the same state
#[derive(Clone)]
pub struct InMemoryLedger {
    inner: Arc<Mutex<LedgerInner>>,
}

impl InMemoryLedger {
    /// Ledger on the preview slot clock, starting at its zero slot
    #[must_use]
    pub fn new() -> Self {
        Self::with_slot_config(SlotConfig::PREVIEW)
    }

    #[must_use]
    pub fn with_slot_config(slot_config: SlotConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LedgerInner {
                slot: Slot(slot_config.zero_slot),
                slot_config,
                utxos: Vec::new(),
                evaluators: HashMap::new(),
                accepted: HashMap::new(),
                settle_after: 0,
                fee: DEFAULT_FEE,
                funding_count: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        // A panic while holding the lock leaves no partial state behind
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Create a UTXO out of thin air
    pub fn fund(&self, address: Address, value: Value) -> TxRef {
        self.mint_utxo(address, value, None)
    }

    /// Create a UTXO carrying an inline datum
    pub fn fund_with_datum(&self, address: Address, value: Value, datum: Datum) -> TxRef {
        self.mint_utxo(address, value, Some(datum))
    }

    fn mint_utxo(&self, address: Address, value: Value, inline_datum: Option<Datum>) -> TxRef {
        let mut inner = self.lock();
        inner.funding_count += 1;
        let mut hasher = Sha256::new();
        hasher.update(b"funding");
        hasher.update(inner.funding_count.to_be_bytes());
        let tx_ref = TxRef::new(TxId::from_bytes(hasher.finalize().into()), 0);
        inner.utxos.push(Utxo {
            tx_ref,
            address,
            value,
            inline_datum,
        });
        tx_ref
    }

    /// Register the on-chain logic for a script hash
    pub fn register_validator<E: ScriptEvaluator + 'static>(&self, hash: ScriptHash, evaluator: E) {
        self.lock().evaluators.insert(hash, Arc::new(evaluator));
    }

    pub fn advance(&self, slots: u64) {
        let mut inner = self.lock();
        inner.slot = Slot(inner.slot.0.saturating_add(slots));
    }

    pub fn set_slot(&self, slot: Slot) {
        self.lock().slot = slot;
    }

    #[must_use]
    pub fn slot(&self) -> Slot {
        self.lock().slot
    }

    #[must_use]
    pub fn slot_config(&self) -> SlotConfig {
        self.lock().slot_config
    }

    /// POSIX time (ms) at the start of the current slot
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        let inner = self.lock();
        inner.slot_config.slot_to_posix(inner.slot).unwrap_or(inner.slot_config.zero_time_ms)
    }

    /// Slots between acceptance and reported inclusion
    pub fn settle_after(&self, slots: u64) {
        self.lock().settle_after = slots;
    }

    pub fn set_fee(&self, fee: u64) {
        self.lock().fee = fee;
    }

    /// Sum of all values held at `address`, saturating per asset
    #[must_use]
    pub fn balance(&self, address: &Address) -> Value {
        self.lock()
            .utxos
            .iter()
            .filter(|u| u.address == *address)
            .fold(Value::default(), |acc, u| acc.saturating_add(&u.value))
    }

    #[must_use]
    pub fn contains(&self, tx_ref: &TxRef) -> bool {
        self.lock().utxos.iter().any(|u| u.tx_ref == *tx_ref)
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for InMemoryLedger {
    fn sleep(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        let slots = self.slot_config().slots_for(millis);
        self.advance(slots);
    }
}

fn rejected(reason: impl Into<String>) -> ClientError {
    let reason = reason.into();
    debug!(%reason, "in-memory ledger rejected transaction");
    ClientError::Rejected(reason)
}

impl LedgerInner {
    fn find(&self, tx_ref: &TxRef) -> Option<&Utxo> {
        self.utxos.iter().find(|u| u.tx_ref == *tx_ref)
    }

    fn validate(&self, tx: &SignedTx) -> ClientResult<Vec<Utxo>> {
        let body = &tx.body;
        let hash = body.body_hash().map_err(|e| rejected(e.to_string()))?;
        if hash != tx.tx_id {
            return Err(rejected("transaction id does not match body"));
        }
        if self.accepted.contains_key(&tx.tx_id) {
            return Err(rejected(format!("transaction {} already submitted", tx.tx_id)));
        }
        if !body.validity.contains(self.slot) {
            return Err(rejected(format!(
                "slot {} outside validity interval {}",
                self.slot, body.validity
            )));
        }
        for tx_ref in body.input_refs() {
            if self.find(&tx_ref).is_none() {
                return Err(rejected(format!("input {tx_ref} is missing or spent")));
            }
        }

        let signatories: Vec<KeyHash> = tx
            .witnesses
            .iter()
            .filter(|w| w.verify(&tx.tx_id))
            .filter_map(|w| w.key_hash())
            .collect();
        for utxo in &body.key_inputs {
            if let Some(owner) = utxo.address.key_hash() {
                if !signatories.contains(&owner) {
                    return Err(rejected(format!("missing witness for input {}", utxo.tx_ref)));
                }
            }
        }
        for signer in &body.required_signers {
            if !signatories.contains(signer) {
                return Err(rejected(format!("missing required signer {signer}")));
            }
        }

        self.run_scripts(body, &signatories)?;
        self.balance(body, &signatories)
    }

    fn evaluator(&self, body: &DraftTx, hash: &ScriptHash) -> ClientResult<Arc<dyn ScriptEvaluator>> {
        if body.validator(hash).is_none() {
            return Err(rejected(format!("no script attached for {hash}")));
        }
        self.evaluators
            .get(hash)
            .cloned()
            .ok_or_else(|| rejected(format!("unknown script {hash}")))
    }

    fn run_scripts(&self, body: &DraftTx, signatories: &[KeyHash]) -> ClientResult<()> {
        for input in &body.script_inputs {
            let evaluator = self.evaluator(body, &input.validator)?;
            let utxo = self.find(&input.utxo.tx_ref).unwrap_or(&input.utxo);
            let ctx = ScriptContext {
                purpose: ScriptPurpose::Spend(utxo),
                datum: utxo.inline_datum.as_ref(),
                redeemer: &input.redeemer,
                tx: body,
                signatories,
                slot_config: &self.slot_config,
            };
            evaluator
                .evaluate(&ctx)
                .map_err(|reason| ClientError::ScriptFailure(format!("{}: {reason}", input.utxo.tx_ref)))?;
        }
        for mint in &body.mints {
            let evaluator = self.evaluator(body, &mint.policy)?;
            let ctx = ScriptContext {
                purpose: ScriptPurpose::Mint(mint.policy),
                datum: None,
                redeemer: &mint.redeemer,
                tx: body,
                signatories,
                slot_config: &self.slot_config,
            };
            evaluator
                .evaluate(&ctx)
                .map_err(|reason| ClientError::ScriptFailure(format!("policy {}: {reason}", mint.policy)))?;
        }
        Ok(())
    }

    /// Fee-payer UTXOs needed to cover outputs, burns and the fee
    fn balance(&self, body: &DraftTx, signatories: &[KeyHash]) -> ClientResult<Vec<Utxo>> {
        let overflow = || rejected("value overflow");

        let mut available = Value::default();
        for tx_ref in body.input_refs() {
            if let Some(utxo) = self.find(&tx_ref) {
                available = available.checked_add(&utxo.value).ok_or_else(overflow)?;
            }
        }
        let mut needed = Value::lovelace(self.fee);
        for output in &body.outputs {
            needed = needed.checked_add(&output.value).ok_or_else(overflow)?;
        }
        for mint in &body.mints {
            let amount = mint.quantity.unsigned_abs();
            let side = if mint.quantity > 0 { &mut available } else { &mut needed };
            side.checked_add_asset(mint.asset(), amount).ok_or_else(overflow)?;
        }

        let mut funding = Vec::new();
        let spent: Vec<TxRef> = body.input_refs().collect();
        let mut wallet = self
            .utxos
            .iter()
            .filter(|u| u.address == body.fee_payer && !u.has_inline_datum() && !spent.contains(&u.tx_ref));
        while !available.covers(&needed) {
            let utxo = wallet
                .next()
                .ok_or_else(|| rejected(format!("insufficient funds: short {:?}", available.shortfall(&needed))))?;
            available = available.checked_add(&utxo.value).ok_or_else(overflow)?;
            funding.push(utxo.clone());
        }
        if !funding.is_empty() {
            if let Some(owner) = body.fee_payer.key_hash() {
                if !signatories.contains(&owner) {
                    return Err(rejected("fee payer did not sign"));
                }
            }
        }
        Ok(funding)
    }

    fn apply(&mut self, tx: &SignedTx, funding: &[Utxo]) -> ClientResult<()> {
        let body = &tx.body;
        let mut available = Value::default();
        let consumed: Vec<TxRef> = body
            .input_refs()
            .chain(funding.iter().map(|u| u.tx_ref))
            .collect();
        for tx_ref in &consumed {
            if let Some(utxo) = self.find(tx_ref) {
                available = available.checked_add(&utxo.value).ok_or_else(|| rejected("value overflow"))?;
            }
        }
        for mint in body.mints.iter().filter(|m| m.quantity > 0) {
            available
                .checked_add_asset(mint.asset(), mint.quantity.unsigned_abs())
                .ok_or_else(|| rejected("value overflow"))?;
        }

        let mut spent_value = Value::lovelace(self.fee);
        for mint in body.mints.iter().filter(|m| m.quantity < 0) {
            spent_value
                .checked_add_asset(mint.asset(), mint.quantity.unsigned_abs())
                .ok_or_else(|| rejected("value overflow"))?;
        }

        let mut created = Vec::with_capacity(body.outputs.len() + 1);
        for output in &body.outputs {
            spent_value = spent_value.checked_add(&output.value).ok_or_else(|| rejected("value overflow"))?;
            created.push((output.address, output.value.clone(), output.datum.clone()));
        }
        let change = available
            .checked_sub(&spent_value)
            .ok_or_else(|| rejected("transaction does not balance"))?;
        if !change.is_empty() {
            created.push((body.fee_payer, change, None));
        }

        self.utxos.retain(|u| !consumed.contains(&u.tx_ref));
        for (index, (address, value, inline_datum)) in created.into_iter().enumerate() {
            let index = u32::try_from(index).map_err(|_| rejected("too many outputs"))?;
            self.utxos.push(Utxo {
                tx_ref: TxRef::new(tx.tx_id, index),
                address,
                value,
                inline_datum,
            });
        }
        let slot = self.slot;
        self.accepted.insert(tx.tx_id, slot);
        Ok(())
    }
}

impl LedgerClient for InMemoryLedger {
    fn utxos_at(&self, address: &Address) -> ClientResult<Vec<Utxo>> {
        Ok(self
            .lock()
            .utxos
            .iter()
            .filter(|u| u.address == *address)
            .cloned()
            .collect())
    }

    fn current_slot(&self) -> ClientResult<Slot> {
        Ok(self.slot())
    }

    fn submit(&self, tx: &SignedTx) -> ClientResult<TxId> {
        let mut inner = self.lock();
        let funding = inner.validate(tx)?;
        inner.apply(tx, &funding)?;
        info!(tx_id = %tx.tx_id, slot = %inner.slot, "in-memory ledger accepted transaction");
        Ok(tx.tx_id)
    }

    fn tx_status(&self, tx_id: &TxId) -> ClientResult<TxStatus> {
        let inner = self.lock();
        let Some(accepted) = inner.accepted.get(tx_id) else {
            return Ok(TxStatus::Rejected {
                script_failure: false,
                reason: format!("unknown transaction {tx_id}"),
            });
        };
        let included = Slot(accepted.0.saturating_add(inner.settle_after));
        Ok(if inner.slot >= included {
            TxStatus::Included { slot: included }
        } else {
            TxStatus::Pending
        })
    }
}
