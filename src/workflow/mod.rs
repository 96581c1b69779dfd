//! Workflow state machines
//!
//! Each workflow derives its state from the UTXOs at its script address and
//! offers one method per transition. Workflows share a [`Driver`], which owns the
//! collaborators: ledger client, signer, clock, UTXO selector and the
//! fee-paying wallet.

pub mod atomic_mint;
pub mod crowdfund;
pub mod htlc;
pub mod splitter;
pub mod vault;

use crate::blueprint::{Blueprint, ScriptParameterizer, Validator};
use crate::client::LedgerClient;
use crate::compose::{TxBuilder, TxLeg};
use crate::config::DriverConfig;
use crate::datum::Datum;
use crate::error::DriverError;
use crate::ledger::{Address, KeyHash, NetworkId, Slot, TxRef, Utxo, Value};
use crate::redeemer::RedeemerTable;
use crate::selector::{self, FirstEligible, UtxoPredicate, UtxoSelector};
use crate::signer::Signer;
use crate::submit::{Outcome, Submitter};
use crate::time::SlotConfig;
use crate::wait::{await_condition, CancelToken, Clock, PollPolicy, SystemClock, WaitOutcome};
use crate::window::{compute_window, ValidityWindow, WindowPolicy};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Shared collaborators for running workflows
pub struct Driver<C, S> {
    client: C,
    signer: S,
    wallet: Address,
    clock: Arc<dyn Clock>,
    selector: Box<dyn UtxoSelector>,
    slot_config: SlotConfig,
    network: NetworkId,
    tolerance: u64,
    poll: PollPolicy,
    cancel: CancelToken,
}

impl<C: LedgerClient, S: Signer> Driver<C, S> {
    /// Driver with wall-clock waits, first-eligible selection and preprod defaults
    ///
    /// `wallet` pays fees and balances every transaction.
    #[must_use]
    pub fn new(client: C, signer: S, wallet: Address) -> Self {
        Self {
            client,
            signer,
            wallet,
            clock: Arc::new(SystemClock),
            selector: Box::new(FirstEligible),
            slot_config: SlotConfig::default(),
            network: wallet.network,
            tolerance: 10,
            poll: PollPolicy::default(),
            cancel: CancelToken::new(),
        }
    }

    /// Driver configured from a [`DriverConfig`]
    #[must_use]
    pub fn from_config(client: C, signer: S, wallet: Address, config: &DriverConfig) -> Self {
        Self::new(client, signer, wallet)
            .with_network(config.network_id())
            .with_slot_config(config.slot_config())
            .with_tolerance(config.window.tolerance_slots)
            .with_poll_policy(config.submit)
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_selector(mut self, selector: Box<dyn UtxoSelector>) -> Self {
        self.selector = selector;
        self
    }

    #[must_use]
    pub const fn with_slot_config(mut self, slot_config: SlotConfig) -> Self {
        self.slot_config = slot_config;
        self
    }

    #[must_use]
    pub const fn with_network(mut self, network: NetworkId) -> Self {
        self.network = network;
        self
    }

    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: u64) -> Self {
        self.tolerance = tolerance;
        self
    }

    #[must_use]
    pub const fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub const fn client(&self) -> &C {
        &self.client
    }

    pub const fn signer(&self) -> &S {
        &self.signer
    }

    pub const fn wallet(&self) -> Address {
        self.wallet
    }

    pub const fn network(&self) -> NetworkId {
        self.network
    }

    pub const fn slot_config(&self) -> &SlotConfig {
        &self.slot_config
    }

    pub const fn tolerance(&self) -> u64 {
        self.tolerance
    }

    /// Token cancelling every wait started by this driver
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Address paying to a key on this driver's network
    pub const fn key_address(&self, key: KeyHash) -> Address {
        Address::key(self.network, key)
    }

    /// Eligible UTXOs at `address`
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be queried.
    pub fn select(&self, address: &Address, predicate: &UtxoPredicate) -> Result<Vec<Utxo>, DriverError> {
        selector::select_utxos(&self.client, address, predicate, self.selector.as_ref())
    }

    /// First eligible UTXO at `address`
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::SelectionEmpty`] when nothing matches.
    pub fn select_first(&self, address: &Address, predicate: &UtxoPredicate) -> Result<Utxo, DriverError> {
        selector::select_first(&self.client, address, predicate, self.selector.as_ref())
    }

    /// Hand a selected UTXO back to the selector
    pub fn release(&self, tx_ref: &TxRef) {
        self.selector.release(tx_ref);
    }

    /// Keep selected UTXOs reserved until the hold is committed or dropped
    ///
    /// A hold dropped without [`Hold::commit`] releases everything it names, so an
    /// early `?` between selection and [`Driver::execute`] hands the UTXOs back.
    pub fn hold<I>(&self, tx_refs: I) -> Hold<'_>
    where
        I: IntoIterator<Item = TxRef>,
    {
        Hold {
            selector: self.selector.as_ref(),
            tx_refs: tx_refs.into_iter().collect(),
        }
    }

    /// Every UTXO at `address`, bypassing the selector
    ///
    /// State queries use this so they never reserve anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be queried.
    pub fn utxos_at(&self, address: &Address) -> Result<Vec<Utxo>, DriverError> {
        Ok(self.client.utxos_at(address)?)
    }

    /// First eligible UTXO at `address`, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be queried.
    pub fn find(&self, address: &Address, predicate: &UtxoPredicate) -> Result<Option<Utxo>, DriverError> {
        let mut found = self.select(address, predicate)?.into_iter();
        let first = found.next();
        for rest in found {
            self.selector.release(&rest.tx_ref);
        }
        Ok(first)
    }

    /// Current ledger slot
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be queried.
    pub fn now(&self) -> Result<Slot, DriverError> {
        Ok(self.client.current_slot()?)
    }

    /// POSIX time (ms) at the start of the current slot
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be queried or the slot predates the clock.
    pub fn now_ms(&self) -> Result<u64, DriverError> {
        Ok(self.slot_config.slot_to_posix(self.now()?)?)
    }

    /// Slot containing the POSIX instant `time_ms`
    ///
    /// # Errors
    ///
    /// Returns an error if the instant predates the slot clock.
    pub fn slot_at(&self, time_ms: u64) -> Result<Slot, DriverError> {
        Ok(self.slot_config.posix_to_slot(time_ms)?)
    }

    /// Validity window for the current slot under `policy`
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be queried or the lock cannot be resolved.
    pub fn window(&self, policy: &WindowPolicy) -> Result<ValidityWindow, DriverError> {
        Ok(compute_window(self.now()?, policy, &self.slot_config)?)
    }

    /// `[now - tolerance, now + tolerance]`
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be queried.
    pub fn immediate_window(&self) -> Result<ValidityWindow, DriverError> {
        self.window(&WindowPolicy::Immediate {
            tolerance: self.tolerance,
        })
    }

    /// Builder with this driver's wallet as the funded fee payer
    pub fn builder(&self) -> TxBuilder {
        TxBuilder::new().funded_fee_payer(self.wallet)
    }

    /// Compose, sign, submit and await a transaction
    ///
    /// Inputs picked through the selector are released afterwards, whatever the
    /// outcome.
    ///
    /// # Errors
    ///
    /// Returns an error for composition, signing or transport failures.
    pub fn execute(&self, builder: TxBuilder, extra_signers: &[KeyHash]) -> Result<Outcome, DriverError> {
        let inputs = builder.input_refs();
        let outcome = builder
            .compose()
            .map_err(DriverError::from)
            .and_then(|draft| {
                debug!(
                    inputs = inputs.len(),
                    outputs = draft.outputs.len(),
                    window = %draft.validity,
                    "composed transaction"
                );
                Submitter::new(&self.client, &self.signer, self.clock.as_ref())
                    .policy(self.poll)
                    .cancel_token(self.cancel.clone())
                    .submit(draft, extra_signers)
            });
        for tx_ref in &inputs {
            self.selector.release(tx_ref);
        }
        outcome
    }

    /// Legs moving `value` out of `funder`'s wallet
    ///
    /// The driver's own wallet is balanced by the backend and needs no legs. Any
    /// other wallet has enough datum-less UTXOs collected to cover `value`, with the
    /// excess paid back to it.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InsufficientFunds`] if the wallet holds too little.
    pub fn fund_from(&self, funder: &Address, value: &Value) -> Result<Vec<TxLeg>, DriverError> {
        if *funder == self.wallet {
            return Ok(Vec::new());
        }
        let mut legs = Vec::new();
        let mut collected = Value::default();
        for utxo in self.select(funder, &UtxoPredicate::NoInlineDatum)? {
            if collected.covers(value) {
                self.selector.release(&utxo.tx_ref);
                continue;
            }
            collected = collected.checked_add(&utxo.value).ok_or(DriverError::ValueOverflow)?;
            legs.push(TxLeg::Collect(utxo));
        }
        let Some(change) = collected.checked_sub(value) else {
            for leg in &legs {
                if let TxLeg::Collect(utxo) = leg {
                    self.selector.release(&utxo.tx_ref);
                }
            }
            return Err(DriverError::InsufficientFunds { address: *funder });
        };
        if !change.is_empty() {
            legs.push(TxLeg::pay(*funder, change));
        }
        Ok(legs)
    }

    /// Wait until the ledger reaches `slot`
    ///
    /// Polls once per slot length, for as many slots as remain plus the driver's
    /// polling budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be queried.
    pub fn wait_until(&self, slot: Slot) -> Result<WaitOutcome<Slot>, DriverError> {
        let remaining = slot.0.saturating_sub(self.now()?.0);
        let policy = PollPolicy::new(
            Duration::from_millis(self.slot_config.slot_length_ms),
            u32::try_from(remaining)
                .unwrap_or(u32::MAX)
                .saturating_add(self.poll.max_attempts),
        );
        info!(%slot, remaining, "waiting for slot");
        await_condition(self.clock.as_ref(), &policy, &self.cancel, || {
            let now = self.client.current_slot()?;
            Ok::<_, DriverError>((now >= slot).then_some(now))
        })
    }
}

/// Selected UTXOs awaiting execution
///
/// Created by [`Driver::hold`].
#[must_use = "dropping a hold releases its UTXOs immediately"]
pub struct Hold<'a> {
    selector: &'a dyn UtxoSelector,
    tx_refs: Vec<TxRef>,
}

impl Hold<'_> {
    /// UTXOs still held
    pub fn tx_refs(&self) -> &[TxRef] {
        &self.tx_refs
    }

    /// Stop holding; [`Driver::execute`] releases the inputs from here on
    pub fn commit(mut self) {
        self.tx_refs.clear();
    }
}

impl Drop for Hold<'_> {
    fn drop(&mut self) {
        if self.tx_refs.is_empty() {
            return;
        }
        debug!(count = self.tx_refs.len(), "releasing held utxos");
        for tx_ref in &self.tx_refs {
            self.selector.release(tx_ref);
        }
    }
}

/// Check a workflow's redeemer table against a blueprint and apply parameters
pub(crate) fn load_validator(
    blueprint: &Blueprint,
    title: &str,
    table: &RedeemerTable,
    params: &[Datum],
    parameterizer: &dyn ScriptParameterizer,
) -> Result<Validator, DriverError> {
    table.verify(blueprint, title)?;
    Ok(blueprint.apply(title, params, parameterizer)?)
}
