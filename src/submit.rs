//! Signing, submission and outcome classification

use crate::client::{LedgerClient, TxStatus};
use crate::compose::DraftTx;
use crate::error::{ClientError, DriverError};
use crate::ledger::{KeyHash, TxId};
use crate::signer::{SignedTx, Signer};
use crate::wait::{await_condition, CancelToken, Clock, PollPolicy, WaitOutcome};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};

/// How a submitted transaction ended
///
/// Rejections are ordinary outcomes, not errors: workflows exercise rejected
/// branches on purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Settled(TxId),
    /// A validator or minting policy returned false
    ValidatorRejected(String),
    /// A ledger rule outside script evaluation failed
    NodeRejected(String),
    /// Accepted but not observed on chain before polling ran out
    Timeout(TxId),
    /// Accepted, then the caller cancelled the wait
    Cancelled(TxId),
}

impl Outcome {
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Settled(_))
    }

    /// Id of the transaction, when it was accepted by the node
    #[must_use]
    pub const fn tx_id(&self) -> Option<&TxId> {
        match self {
            Self::Settled(id) | Self::Timeout(id) | Self::Cancelled(id) => Some(id),
            Self::ValidatorRejected(_) | Self::NodeRejected(_) => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Settled(id) => write!(f, "settled {id}"),
            Self::ValidatorRejected(reason) => write!(f, "validator rejected: {reason}"),
            Self::NodeRejected(reason) => write!(f, "node rejected: {reason}"),
            Self::Timeout(id) => write!(f, "timed out waiting for {id}"),
            Self::Cancelled(id) => write!(f, "cancelled while waiting for {id}"),
        }
    }
}

/// Witness a draft with every key it needs
///
/// One witness is produced per distinct key among the draft's required signers,
/// `extra` signers, the owners of key-locked inputs and a key fee payer.
///
/// # Errors
///
/// Returns an error if the body cannot be hashed or a key is unavailable.
pub fn sign_draft<S: Signer + ?Sized>(
    draft: DraftTx,
    signer: &S,
    extra: &[KeyHash],
) -> Result<SignedTx, DriverError> {
    let tx_id = draft.body_hash()?;

    let mut keys: BTreeSet<KeyHash> = draft.required_signers.iter().copied().collect();
    keys.extend(extra.iter().copied());
    keys.extend(draft.key_inputs.iter().filter_map(|utxo| utxo.address.key_hash()));
    keys.extend(draft.fee_payer.key_hash());

    let witnesses = keys
        .iter()
        .map(|key| signer.sign(&tx_id, key))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(%tx_id, witnesses = witnesses.len(), "signed transaction");
    Ok(SignedTx {
        body: draft,
        tx_id,
        witnesses,
    })
}

/// Poll until `tx_id` is included, dropped, or polling ends
///
/// # Errors
///
/// Returns an error if the backend cannot be queried.
pub fn await_settlement<C: LedgerClient + ?Sized>(
    client: &C,
    tx_id: &TxId,
    clock: &dyn Clock,
    policy: &PollPolicy,
    cancel: &CancelToken,
) -> Result<Outcome, ClientError> {
    let waited = await_condition(clock, policy, cancel, || {
        Ok::<_, ClientError>(match client.tx_status(tx_id)? {
            TxStatus::Pending => None,
            TxStatus::Included { slot } => {
                info!(%tx_id, %slot, "transaction settled");
                Some(Outcome::Settled(*tx_id))
            }
            TxStatus::Rejected {
                script_failure: true,
                reason,
            } => Some(Outcome::ValidatorRejected(reason)),
            TxStatus::Rejected { reason, .. } => Some(Outcome::NodeRejected(reason)),
        })
    })?;

    Ok(match waited {
        WaitOutcome::Satisfied(outcome) => outcome,
        WaitOutcome::Exhausted => {
            warn!(%tx_id, attempts = policy.max_attempts, "settlement not observed");
            Outcome::Timeout(*tx_id)
        }
        WaitOutcome::Cancelled => Outcome::Cancelled(*tx_id),
    })
}

/// Signs, submits and awaits settlement of drafts
pub struct Submitter<'a, C: ?Sized, S: ?Sized> {
    client: &'a C,
    signer: &'a S,
    clock: &'a dyn Clock,
    policy: PollPolicy,
    cancel: CancelToken,
}

impl<'a, C, S> Submitter<'a, C, S>
where
    C: LedgerClient + ?Sized,
    S: Signer + ?Sized,
{
    #[must_use]
    pub fn new(client: &'a C, signer: &'a S, clock: &'a dyn Clock) -> Self {
        Self {
            client,
            signer,
            clock,
            policy: PollPolicy::default(),
            cancel: CancelToken::new(),
        }
    }

    #[must_use]
    pub const fn policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sign, submit and wait for the draft to settle
    ///
    /// # Errors
    ///
    /// Returns an error for signing failures and backend transport errors. Ledger
    /// rejections are reported as an [`Outcome`].
    pub fn submit(&self, draft: DraftTx, extra_signers: &[KeyHash]) -> Result<Outcome, DriverError> {
        let signed = sign_draft(draft, self.signer, extra_signers)?;
        let tx_id = signed.tx_id;

        match self.client.submit(&signed) {
            Ok(accepted) => {
                debug!(%accepted, "transaction accepted");
            }
            Err(ClientError::ScriptFailure(reason)) => {
                info!(%tx_id, %reason, "validator rejected transaction");
                return Ok(Outcome::ValidatorRejected(reason));
            }
            Err(ClientError::Rejected(reason)) => {
                info!(%tx_id, %reason, "node rejected transaction");
                return Ok(Outcome::NodeRejected(reason));
            }
            Err(other) => return Err(other.into()),
        }

        Ok(await_settlement(
            self.client,
            &tx_id,
            self.clock,
            &self.policy,
            &self.cancel,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientResult;
    use crate::compose::{TxBuilder, TxLeg};
    use crate::error::SignError;
    use crate::ledger::{Address, NetworkId, Slot, Utxo, Value};
    use crate::signer::Keyring;
    use crate::window::ValidityWindow;
    use std::sync::Mutex;
    use std::time::Duration;

    struct NoSleep;

    impl Clock for NoSleep {
        fn sleep(&self, _: Duration) {}
    }

    /// Backend that accepts (or fails) every submission and reports a fixed status
    struct Stub {
        submit_error: Mutex<Option<ClientError>>,
        status: TxStatus,
    }

    impl Stub {
        fn with_status(status: TxStatus) -> Self {
            Self {
                submit_error: Mutex::new(None),
                status,
            }
        }

        fn failing(error: ClientError) -> Self {
            Self {
                submit_error: Mutex::new(Some(error)),
                status: TxStatus::Pending,
            }
        }
    }

    impl LedgerClient for Stub {
        fn utxos_at(&self, _: &Address) -> ClientResult<Vec<Utxo>> {
            Ok(Vec::new())
        }

        fn current_slot(&self) -> ClientResult<Slot> {
            Ok(Slot(0))
        }

        fn submit(&self, tx: &SignedTx) -> ClientResult<TxId> {
            match self.submit_error.lock().ok().and_then(|mut e| e.take()) {
                Some(error) => Err(error),
                None => Ok(tx.tx_id),
            }
        }

        fn tx_status(&self, _: &TxId) -> ClientResult<TxStatus> {
            Ok(self.status.clone())
        }
    }

    fn draft(keyring: &mut Keyring) -> DraftTx {
        let key = keyring.insert_seed(1).unwrap();
        let wallet = Address::key(NetworkId::Testnet, key);
        TxBuilder::new()
            .leg(TxLeg::pay(wallet, Value::lovelace(1_000_000)))
            .funded_fee_payer(wallet)
            .validity(ValidityWindow::new(Slot(0), Slot(100)).unwrap())
            .compose()
            .unwrap()
    }

    #[test]
    fn test_one_witness_per_key() {
        let mut keyring = Keyring::new();
        let draft = draft(&mut keyring);
        let wallet_key = draft.fee_payer.key_hash().unwrap();
        let other = keyring.insert_seed(2).unwrap();

        let signed = sign_draft(draft, &keyring, &[wallet_key, other, other]).unwrap();
        assert_eq!(signed.witnesses.len(), 2);
        assert!(signed.witnesses.iter().all(|w| w.verify(&signed.tx_id)));
        assert_eq!(signed.tx_id, signed.body.body_hash().unwrap());
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let mut keyring = Keyring::new();
        let draft = draft(&mut keyring);
        let stranger = KeyHash::from_bytes([3u8; 28]);
        assert!(matches!(
            sign_draft(draft, &keyring, &[stranger]),
            Err(DriverError::Sign(SignError::UnknownCredential(key))) if key == stranger
        ));
    }

    #[test]
    fn test_settled() {
        let mut keyring = Keyring::new();
        let draft = draft(&mut keyring);
        let stub = Stub::with_status(TxStatus::Included { slot: Slot(7) });
        let outcome = Submitter::new(&stub, &keyring, &NoSleep).submit(draft, &[]).unwrap();
        assert!(outcome.is_settled());
        assert!(outcome.tx_id().is_some());
    }

    #[test]
    fn test_rejected_after_acceptance() {
        let mut keyring = Keyring::new();
        let stub = Stub::with_status(TxStatus::Rejected {
            script_failure: true,
            reason: "budget exceeded".into(),
        });
        let draft = draft(&mut keyring);
        let outcome = Submitter::new(&stub, &keyring, &NoSleep).submit(draft, &[]).unwrap();
        assert_eq!(outcome, Outcome::ValidatorRejected("budget exceeded".into()));
        assert_eq!(outcome.tx_id(), None);
    }

    #[test]
    fn test_timeout_and_cancel() {
        let mut keyring = Keyring::new();
        let stub = Stub::with_status(TxStatus::Pending);
        let policy = PollPolicy::new(Duration::ZERO, 3);
        let first = draft(&mut keyring);
        let second = first.clone();

        let outcome = Submitter::new(&stub, &keyring, &NoSleep)
            .policy(policy)
            .submit(first, &[])
            .unwrap();
        assert!(matches!(outcome, Outcome::Timeout(_)));

        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = Submitter::new(&stub, &keyring, &NoSleep)
            .policy(policy)
            .cancel_token(cancel)
            .submit(second, &[])
            .unwrap();
        assert!(matches!(outcome, Outcome::Cancelled(_)));
    }

    #[test]
    fn test_submission_errors() {
        let mut keyring = Keyring::new();
        let first = draft(&mut keyring);
        let second = first.clone();
        let stub = Stub::failing(ClientError::Rejected("bad fee".into()));
        let outcome = Submitter::new(&stub, &keyring, &NoSleep).submit(first, &[]).unwrap();
        assert_eq!(outcome, Outcome::NodeRejected("bad fee".into()));

        let stub = Stub::failing(ClientError::Transport("connection refused".into()));
        assert!(matches!(
            Submitter::new(&stub, &keyring, &NoSleep).submit(second, &[]),
            Err(DriverError::Client(ClientError::Transport(_)))
        ));
    }
}
