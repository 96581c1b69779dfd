//! Key management and transaction witnesses
//!
//! Verification keys are BIP-340 x-only keys; a key hash is the first 28 bytes of
//! the SHA-256 of the serialized x-only key.

use crate::compose::DraftTx;
use crate::error::SignError;
use crate::ledger::{Address, KeyHash, NetworkId, TxId};
use secp256k1::{schnorr, All, Keypair, Message, Secp256k1, XOnlyPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Key hash of an x-only public key
#[must_use]
pub fn key_hash_of(public_key: &XOnlyPublicKey) -> KeyHash {
    let digest = Sha256::digest(public_key.serialize());
    let mut hash = [0u8; KeyHash::LEN];
    hash.copy_from_slice(&digest[..KeyHash::LEN]);
    KeyHash::from_bytes(hash)
}

/// Create a keypair from a u32 secret (for tests and demos)
///
/// # Examples
///
/// ```
/// use scriptflow::signer::keypair_from_seed;
///
/// let keypair = keypair_from_seed(42).unwrap();
/// assert_eq!(keypair.x_only_public_key().0.serialize().len(), 32);
/// ```
///
/// # Errors
///
/// Returns an error for seed `0`, which is not a valid secret key.
pub fn keypair_from_seed(seed: u32) -> Result<Keypair, SignError> {
    let mut secret = [0u8; 32];
    secret[28..].copy_from_slice(&seed.to_be_bytes());
    Keypair::from_seckey_slice(&Secp256k1::new(), &secret)
        .map_err(|e| SignError::InvalidKey(e.to_string()))
}

/// A verification-key witness over a transaction id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VKeyWitness {
    #[serde(with = "hex::serde")]
    pub public_key: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
}

impl VKeyWitness {
    /// Key hash of the witnessing key, `None` if the key is malformed
    #[must_use]
    pub fn key_hash(&self) -> Option<KeyHash> {
        XOnlyPublicKey::from_slice(&self.public_key)
            .ok()
            .map(|pk| key_hash_of(&pk))
    }

    /// Check the signature against `tx_id`
    #[must_use]
    pub fn verify(&self, tx_id: &TxId) -> bool {
        let (Ok(public_key), Ok(signature)) = (
            XOnlyPublicKey::from_slice(&self.public_key),
            schnorr::Signature::from_slice(&self.signature),
        ) else {
            return false;
        };
        let message = Message::from_digest(*tx_id.as_bytes());
        Secp256k1::verification_only()
            .verify_schnorr(&signature, &message, &public_key)
            .is_ok()
    }
}

/// A draft body together with its id and witnesses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    pub body: DraftTx,
    pub tx_id: TxId,
    pub witnesses: Vec<VKeyWitness>,
}

impl SignedTx {
    /// Whether a valid witness from `signer` is present
    #[must_use]
    pub fn is_signed_by(&self, signer: &KeyHash) -> bool {
        self.witnesses
            .iter()
            .any(|w| w.key_hash().as_ref() == Some(signer) && w.verify(&self.tx_id))
    }
}

/// Produces witnesses for the credentials it controls
pub trait Signer {
    /// Witness `tx_id` with the key behind `credential`
    fn sign(&self, tx_id: &TxId, credential: &KeyHash) -> Result<VKeyWitness, SignError>;
}

/// In-process set of signing keys
pub struct Keyring {
    secp: Secp256k1<All>,
    keys: HashMap<KeyHash, Keypair>,
}

impl Keyring {
    #[must_use]
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
            keys: HashMap::new(),
        }
    }

    /// Add a keypair and return its key hash
    pub fn insert(&mut self, keypair: Keypair) -> KeyHash {
        let hash = key_hash_of(&keypair.x_only_public_key().0);
        self.keys.insert(hash, keypair);
        hash
    }

    /// Add the deterministic key for `seed`
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid seed.
    pub fn insert_seed(&mut self, seed: u32) -> Result<KeyHash, SignError> {
        Ok(self.insert(keypair_from_seed(seed)?))
    }

    /// Generate a fresh random key
    pub fn generate(&mut self) -> KeyHash {
        let keypair = Keypair::new(&self.secp, &mut secp256k1::rand::thread_rng());
        self.insert(keypair)
    }

    #[must_use]
    pub fn contains(&self, credential: &KeyHash) -> bool {
        self.keys.contains_key(credential)
    }

    /// Enterprise address paying to a held key
    #[must_use]
    pub const fn address(network: NetworkId, credential: KeyHash) -> Address {
        Address::key(network, credential)
    }
}

impl Default for Keyring {
    fn default() -> Self {
        Self::new()
    }
}

impl Signer for Keyring {
    fn sign(&self, tx_id: &TxId, credential: &KeyHash) -> Result<VKeyWitness, SignError> {
        let keypair = self
            .keys
            .get(credential)
            .ok_or(SignError::UnknownCredential(*credential))?;
        let message = Message::from_digest(*tx_id.as_bytes());
        let signature = self.secp.sign_schnorr_no_aux_rand(&message, keypair);
        Ok(VKeyWitness {
            public_key: keypair.x_only_public_key().0.serialize().to_vec(),
            signature: signature.serialize().to_vec(),
        })
    }
}

impl<S: Signer + ?Sized> Signer for &S {
    fn sign(&self, tx_id: &TxId, credential: &KeyHash) -> Result<VKeyWitness, SignError> {
        (**self).sign(tx_id, credential)
    }
}
