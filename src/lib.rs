//! Scriptflow - SDK for driving script-locked UTXOs through redeemer-gated workflows
//!
//! This crate orchestrates the off-chain half of extended-UTXO contracts: it selects
//! eligible script outputs, builds the redeemer for a validator branch, computes a
//! validity window that agrees with the validator's time checks, composes and signs
//! the transaction, and reports how the ledger judged it.
//!
//! # Example
//!
//! ```ignore
//! use scriptflow::{Blueprint, Driver, DigestParameterizer, Htlc, HtlcConfig};
//!
//! // Load a validator and apply the HTLC parameters
//! let blueprint = Blueprint::from_file("plutus.json")?;
//! let config = HtlcConfig::from_secret(b"Secret Answer", expiration_ms, owner);
//! let htlc = Htlc::from_blueprint(&driver, config, &blueprint, "htlc.htlc", &parameterizer)?;
//!
//! // Lock funds, then reveal the secret
//! htlc.lock(&driver.wallet(), Value::lovelace(10_000_000))?;
//! let outcome = htlc.reveal(b"Secret Answer", &receiver)?;
//! assert!(outcome.is_settled());
//! ```
//!
//! # Connecting to a Backend
//!
//! Use the `RpcLedgerClient` to talk to a hosted ledger backend:
//!
//! ```ignore
//! use scriptflow::{Driver, DriverConfig, Keyring, RpcLedgerClient};
//!
//! // From config file
//! let config = DriverConfig::from_file("scriptflow.toml")?;
//! let client = RpcLedgerClient::new(config.clone())?;
//!
//! // The wallet pays fees and balances every transaction
//! let driver = Driver::from_config(client, keyring, wallet, &config);
//! ```
//!
//! For tests and demos, `InMemoryLedger` implements the same client trait in
//! process, running registered closures in place of on-chain validators.

pub mod blueprint;
pub mod client;
pub mod compose;
pub mod config;
pub mod datum;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod redeemer;
#[cfg(feature = "rpc")]
pub mod rpc_client;
pub mod selector;
pub mod signer;
pub mod submit;
pub mod time;
pub mod wait;
pub mod window;
pub mod workflow;

#[cfg(test)]
mod test_fixtures;

// Re-export core types
pub use blueprint::{Blueprint, PlutusVersion, ScriptParameterizer, Validator};
pub use client::{ClientResult, LedgerClient, TxStatus};
pub use compose::{DraftTx, MintLeg, ScriptSpend, TxBuilder, TxLeg};
pub use config::{ConfigError, DriverConfig, Network};
pub use datum::{Datum, FieldValue};
pub use error::{
    BlueprintError, ClientError, ClockSkewError, CompositionError, DriverError, EncodingError, SignError,
};
pub use ledger::{Address, AssetId, KeyHash, NetworkId, ScriptHash, Slot, TxId, TxRef, Utxo, Value};
pub use memory::{DigestParameterizer, InMemoryLedger, ScriptContext, ScriptEvaluator, ScriptPurpose};
pub use redeemer::{Redeemer, RedeemerTable};
pub use selector::{FirstEligible, Reserving, UtxoPredicate, UtxoSelector};
pub use signer::{Keyring, SignedTx, Signer, VKeyWitness};
pub use submit::{Outcome, Submitter};
pub use time::SlotConfig;
pub use wait::{CancelToken, Clock, PollPolicy, SystemClock, WaitOutcome};
pub use window::{compute_window, Anchor, LockPoint, TimeGate, ValidityWindow, WindowPolicy};
pub use workflow::atomic_mint::{AtomicMint, AtomicMintConfig, AtomicMintState};
pub use workflow::crowdfund::{Crowdfund, CrowdfundConfig, CrowdfundState, DonorMap, ReclaimPayout};
pub use workflow::htlc::{Htlc, HtlcConfig, HtlcState};
pub use workflow::splitter::{RemainderPolicy, Splitter, SplitterConfig, SplitterState};
pub use workflow::vault::{Vault, VaultConfig, VaultState};
pub use workflow::{Driver, Hold};

// Re-export RPC client when feature is enabled
#[cfg(feature = "rpc")]
pub use rpc_client::RpcLedgerClient;
