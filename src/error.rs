//! Error types for scriptflow operations

use crate::ledger::{Address, KeyHash, ScriptHash, Slot, TxRef};
use thiserror::Error;

/// Errors raised while turning values into datums or redeemers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("Integer {0} does not fit the datum integer range")]
    IntegerOverflow(u128),

    #[error("Integer {0} is outside the 64-bit range of the JSON datum encoding")]
    IntegerOutOfRange(i128),

    #[error("Invalid hex payload: {0}")]
    InvalidHex(String),

    #[error("Text field is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    #[error("Malformed datum: {0}")]
    Malformed(String),

    #[error("Expected a constructor datum, found {0}")]
    NotAConstructor(String),

    #[error("Unknown action `{action}` for {workflow}")]
    UnknownAction {
        workflow: &'static str,
        action: String,
    },

    #[error("Action `{action}` takes {expected} field(s), got {actual}")]
    ArityMismatch {
        action: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Errors raised while resolving a lock point against the slot clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClockSkewError {
    #[error("POSIX time {time_ms}ms predates the slot clock start at {zero_time_ms}ms")]
    BeforeSystemStart { time_ms: u64, zero_time_ms: u64 },

    #[error("Slot arithmetic overflowed")]
    Overflow,

    #[error("Slot length must be non-zero")]
    ZeroSlotLength,
}

/// Static inconsistencies found while composing a transaction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositionError {
    #[error("Transaction has no legs")]
    NoLegs,

    #[error("Transaction has no inputs and no funded fee payer")]
    NoInputs,

    #[error("No fee payer set")]
    MissingFeePayer,

    #[error("Fee payer {0} is a script address")]
    FeePayerIsScript(Address),

    #[error("Fee payer {0} owns no input and is not explicitly funded")]
    UnfundedFeePayer(Address),

    #[error("No validity window set")]
    MissingValidity,

    #[error("UTXO {0} is not locked by a script")]
    NotScriptLocked(TxRef),

    #[error("Funding UTXO {0} is locked by a script")]
    NotKeyLocked(TxRef),

    #[error("UTXO {tx_ref} is locked by {expected}, but validator {attached} was attached")]
    ValidatorMismatch {
        tx_ref: TxRef,
        expected: ScriptHash,
        attached: ScriptHash,
    },

    #[error("Validator {0} has no compiled code attached")]
    ValidatorNotAttached(ScriptHash),

    #[error("UTXO {0} is spent more than once")]
    DuplicateInput(TxRef),

    #[error("Window [{from}, {to}] ends before the branch becomes valid at slot {gate}")]
    WindowBeforeGate { from: Slot, to: Slot, gate: Slot },

    #[error("Window [{from}, {to}] starts after the branch deadline at slot {gate}")]
    WindowAfterGate { from: Slot, to: Slot, gate: Slot },

    #[error("Branch requires signer {0}, which is not listed")]
    MissingSigner(KeyHash),

    #[error("Signer {0} is listed more than once")]
    DuplicateSigner(KeyHash),

    #[error("Signer {0} is not required by any input, branch or fee payer")]
    UnexpectedSigner(KeyHash),

    #[error("Output to {0} carries no value")]
    ZeroValueOutput(Address),

    #[error("Mint of policy {0} has zero quantity")]
    ZeroMint(ScriptHash),
}

/// Errors reported by a ledger backend
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Script validation failed: {0}")]
    ScriptFailure(String),

    #[error("Transaction rejected by node: {0}")]
    Rejected(String),

    #[error("Malformed backend response: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors raised while producing witnesses
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignError {
    #[error("No key available for credential {0}")]
    UnknownCredential(KeyHash),

    #[error("Invalid secret key: {0}")]
    InvalidKey(String),
}

/// Errors raised while loading blueprints or applying parameters
#[derive(Debug, Error)]
pub enum BlueprintError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse blueprint: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Validator `{0}` not found in blueprint")]
    ValidatorNotFound(String),

    #[error("Unresolvable schema reference `{0}`")]
    BadReference(String),

    #[error("Invalid compiled code: {0}")]
    InvalidCode(String),

    #[error("Redeemer table for {workflow} disagrees with the blueprint: {detail}")]
    RedeemerMismatch {
        workflow: &'static str,
        detail: String,
    },

    #[error("Parameter application failed: {0}")]
    Parameters(String),
}

/// Errors that abort a workflow step
///
/// Ledger outcomes (validator or node rejection, timeouts) are not errors; they are
/// returned as [`crate::submit::Outcome`] values.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Clock error: {0}")]
    ClockSkew(#[from] ClockSkewError),

    #[error("Composition error: {0}")]
    Composition(#[from] CompositionError),

    #[error("Ledger client error: {0}")]
    Client(#[from] ClientError),

    #[error("Signing error: {0}")]
    Sign(#[from] SignError),

    #[error("Blueprint error: {0}")]
    Blueprint(#[from] BlueprintError),

    #[error("No eligible UTXO at {address}")]
    SelectionEmpty { address: Address },

    #[error("Wallet {address} cannot cover the requested value")]
    InsufficientFunds { address: Address },

    #[error("{workflow}: `{action}` is not legal in state {state}")]
    IllegalTransition {
        workflow: &'static str,
        action: &'static str,
        state: String,
    },

    #[error("{workflow}: unexpected datum shape: {detail}")]
    UnexpectedDatum {
        workflow: &'static str,
        detail: String,
    },

    #[error("Cannot split {total} between {payees} payees without a remainder")]
    IndivisibleSplit { total: u64, payees: usize },

    #[error("Value arithmetic overflowed")]
    ValueOverflow,
}
