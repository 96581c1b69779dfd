//! Abstract interface for interacting with a ledger backend

use crate::error::ClientError;
use crate::ledger::{Address, Slot, TxId, Utxo};
use crate::signer::SignedTx;
use serde::{Deserialize, Serialize};

/// Result type for ledger client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Inclusion status of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxStatus {
    /// Known to the backend but not yet in a block
    Pending,
    /// Included on chain
    Included { slot: Slot },
    /// Dropped after acceptance
    Rejected { script_failure: bool, reason: String },
}

/// Abstract interface for querying and submitting to a ledger
///
/// This trait lets workflows run against a hosted indexer, a local node or the
/// [`crate::memory::InMemoryLedger`] through one interface.
pub trait LedgerClient {
    /// Unspent outputs currently held at an address
    fn utxos_at(&self, address: &Address) -> ClientResult<Vec<Utxo>>;

    /// Most recent slot observed by the backend
    fn current_slot(&self) -> ClientResult<Slot>;

    /// Submit a signed transaction
    ///
    /// Script evaluation failures must be reported as [`ClientError::ScriptFailure`]
    /// and other ledger-rule violations as [`ClientError::Rejected`].
    fn submit(&self, tx: &SignedTx) -> ClientResult<TxId>;

    /// Inclusion status of a previously submitted transaction
    fn tx_status(&self, tx_id: &TxId) -> ClientResult<TxStatus>;
}

impl<C: LedgerClient + ?Sized> LedgerClient for &C {
    fn utxos_at(&self, address: &Address) -> ClientResult<Vec<Utxo>> {
        (**self).utxos_at(address)
    }

    fn current_slot(&self) -> ClientResult<Slot> {
        (**self).current_slot()
    }

    fn submit(&self, tx: &SignedTx) -> ClientResult<TxId> {
        (**self).submit(tx)
    }

    fn tx_status(&self, tx_id: &TxId) -> ClientResult<TxStatus> {
        (**self).tx_status(tx_id)
    }
}
