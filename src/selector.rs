//! UTXO selection at an address
//!
//! Selection reads the ledger's view at call time. Two drivers selecting from the
//! same address through [`FirstEligible`] can pick the same output; the loser's
//! submission is rejected by the node. [`Reserving`] serializes selections made
//! through one selector instance.

use crate::client::LedgerClient;
use crate::datum::Datum;
use crate::error::DriverError;
use crate::ledger::{Address, TxRef, Utxo};
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::debug;

/// Eligibility filter applied to the outputs at an address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UtxoPredicate {
    #[default]
    Any,
    /// Plain value outputs, e.g. wallet funds
    NoInlineDatum,
    HasInlineDatum,
    DatumEquals(Datum),
    AtRef(TxRef),
}

impl UtxoPredicate {
    #[must_use]
    pub fn matches(&self, utxo: &Utxo) -> bool {
        match self {
            Self::Any => true,
            Self::NoInlineDatum => !utxo.has_inline_datum(),
            Self::HasInlineDatum => utxo.has_inline_datum(),
            Self::DatumEquals(datum) => utxo.inline_datum.as_ref() == Some(datum),
            Self::AtRef(tx_ref) => utxo.tx_ref == *tx_ref,
        }
    }
}

/// Strategy choosing among eligible outputs
///
/// Candidates arrive in ledger order, already filtered by the predicate.
pub trait UtxoSelector: Send + Sync {
    /// Order or narrow the candidates
    fn select(&self, candidates: Vec<Utxo>) -> Vec<Utxo>;

    /// Return a previously selected output to the pool
    fn release(&self, _tx_ref: &TxRef) {}
}

/// Keeps ledger order and never reserves
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstEligible;

impl UtxoSelector for FirstEligible {
    fn select(&self, candidates: Vec<Utxo>) -> Vec<Utxo> {
        candidates
    }
}

/// Skips outputs already handed out by this selector until they are released
#[derive(Debug, Default)]
pub struct Reserving {
    reserved: Mutex<HashSet<TxRef>>,
}

impl Reserving {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outputs currently reserved
    #[must_use]
    pub fn reserved(&self) -> usize {
        self.reserved.lock().map_or(0, |set| set.len())
    }
}

impl UtxoSelector for Reserving {
    fn select(&self, candidates: Vec<Utxo>) -> Vec<Utxo> {
        let Ok(mut reserved) = self.reserved.lock() else {
            return Vec::new();
        };
        let available: Vec<Utxo> = candidates
            .into_iter()
            .filter(|utxo| !reserved.contains(&utxo.tx_ref))
            .collect();
        reserved.extend(available.iter().map(|utxo| utxo.tx_ref));
        available
    }

    fn release(&self, tx_ref: &TxRef) {
        if let Ok(mut reserved) = self.reserved.lock() {
            reserved.remove(tx_ref);
        }
    }
}

/// Eligible outputs at `address`, in the order chosen by `strategy`
///
/// An empty result is not an error here; see [`select_first`].
///
/// # Errors
///
/// Returns an error if the ledger cannot be queried.
pub fn select_utxos<C, S>(
    client: &C,
    address: &Address,
    predicate: &UtxoPredicate,
    strategy: &S,
) -> Result<Vec<Utxo>, DriverError>
where
    C: LedgerClient + ?Sized,
    S: UtxoSelector + ?Sized,
{
    let candidates: Vec<Utxo> = client
        .utxos_at(address)?
        .into_iter()
        .filter(|utxo| predicate.matches(utxo))
        .collect();
    let selected = strategy.select(candidates);
    debug!(%address, count = selected.len(), "selected utxos");
    Ok(selected)
}

/// First eligible output at `address`
///
/// # Errors
///
/// Returns [`DriverError::SelectionEmpty`] when nothing matches.
pub fn select_first<C, S>(
    client: &C,
    address: &Address,
    predicate: &UtxoPredicate,
    strategy: &S,
) -> Result<Utxo, DriverError>
where
    C: LedgerClient + ?Sized,
    S: UtxoSelector + ?Sized,
{
    let mut selected = select_utxos(client, address, predicate, strategy)?.into_iter();
    let first = selected.next().ok_or(DriverError::SelectionEmpty { address: *address })?;
    for rest in selected {
        strategy.release(&rest.tx_ref);
    }
    Ok(first)
}
