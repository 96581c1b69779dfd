//! Ledger primitives: hashes, credentials, addresses, values and UTXOs

use crate::datum::Datum;
use crate::error::EncodingError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

macro_rules! hash_newtype {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Length of the hash in bytes
            pub const LEN: usize = $len;

            #[must_use]
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Build from a slice, failing when the length is wrong
            ///
            /// # Errors
            ///
            /// Returns an error if `bytes` is not exactly the hash length.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, EncodingError> {
                let array: [u8; $len] = bytes.try_into().map_err(|_| {
                    EncodingError::Malformed(format!(
                        "{} must be {} bytes, got {}",
                        stringify!($name),
                        $len,
                        bytes.len()
                    ))
                })?;
                Ok(Self(array))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = EncodingError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = hex::decode(s).map_err(|e| EncodingError::InvalidHex(e.to_string()))?;
                Self::from_slice(&bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hash_newtype!(
    /// Hash of a verification key, used as a payment credential and required signer
    KeyHash,
    28
);
hash_newtype!(
    /// Hash of a validator script; doubles as the minting policy id
    ScriptHash,
    28
);
hash_newtype!(
    /// Transaction identifier (hash of the transaction body)
    TxId,
    32
);

/// Absolute slot number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot(pub u64);

impl Slot {
    #[must_use]
    pub const fn saturating_sub(self, slots: u64) -> Self {
        Self(self.0.saturating_sub(slots))
    }

    #[must_use]
    pub fn checked_add(self, slots: u64) -> Option<Self> {
        self.0.checked_add(slots).map(Self)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a transaction output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxRef {
    pub tx_id: TxId,
    pub index: u32,
}

impl TxRef {
    #[must_use]
    pub const fn new(tx_id: TxId, index: u32) -> Self {
        Self { tx_id, index }
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_id, self.index)
    }
}

/// Network discriminant carried in addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    #[default]
    Testnet,
    Mainnet,
}

impl NetworkId {
    #[must_use]
    pub const fn header_bits(self) -> u8 {
        match self {
            Self::Testnet => 0,
            Self::Mainnet => 1,
        }
    }
}

/// Payment credential: who can spend an output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Credential {
    Key(KeyHash),
    Script(ScriptHash),
}

/// Enterprise address (payment credential only)
///
/// Rendered as hex of the header byte (`0x6n` key, `0x7n` script, `n` = network)
/// followed by the 28-byte credential hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    pub network: NetworkId,
    pub payment: Credential,
}

impl Address {
    #[must_use]
    pub const fn key(network: NetworkId, key: KeyHash) -> Self {
        Self {
            network,
            payment: Credential::Key(key),
        }
    }

    #[must_use]
    pub const fn script(network: NetworkId, script: ScriptHash) -> Self {
        Self {
            network,
            payment: Credential::Script(script),
        }
    }

    #[must_use]
    pub const fn key_hash(&self) -> Option<KeyHash> {
        match self.payment {
            Credential::Key(hash) => Some(hash),
            Credential::Script(_) => None,
        }
    }

    #[must_use]
    pub const fn script_hash(&self) -> Option<ScriptHash> {
        match self.payment {
            Credential::Script(hash) => Some(hash),
            Credential::Key(_) => None,
        }
    }

    #[must_use]
    pub const fn is_script(&self) -> bool {
        matches!(self.payment, Credential::Script(_))
    }

    /// Raw address bytes: header followed by the credential hash
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 29] {
        let mut bytes = [0u8; 29];
        let (kind, hash) = match &self.payment {
            Credential::Key(h) => (0x60, h.as_bytes()),
            Credential::Script(h) => (0x70, h.as_bytes()),
        };
        bytes[0] = kind | self.network.header_bits();
        bytes[1..].copy_from_slice(hash);
        bytes
    }

    /// Parse raw address bytes
    ///
    /// # Errors
    ///
    /// Returns an error for a wrong length or an unsupported header.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EncodingError> {
        let (&header, hash) = bytes
            .split_first()
            .ok_or_else(|| EncodingError::Malformed("empty address".into()))?;
        let network = match header & 0x0f {
            0 => NetworkId::Testnet,
            1 => NetworkId::Mainnet,
            n => return Err(EncodingError::Malformed(format!("unknown network {n}"))),
        };
        let payment = match header & 0xf0 {
            0x60 => Credential::Key(KeyHash::from_slice(hash)?),
            0x70 => Credential::Script(ScriptHash::from_slice(hash)?),
            kind => {
                return Err(EncodingError::Malformed(format!(
                    "unsupported address header {kind:#04x}"
                )))
            }
        };
        Ok(Self { network, payment })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}

impl FromStr for Address {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| EncodingError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Asset class held in a [`Value`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetId {
    Lovelace,
    Native { policy: ScriptHash, name: Vec<u8> },
}

impl AssetId {
    #[must_use]
    pub fn native(policy: ScriptHash, name: impl Into<Vec<u8>>) -> Self {
        Self::Native {
            policy,
            name: name.into(),
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lovelace => f.write_str("lovelace"),
            Self::Native { policy, name } => write!(f, "{policy}.{}", hex::encode(name)),
        }
    }
}

impl FromStr for AssetId {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "lovelace" {
            return Ok(Self::Lovelace);
        }
        let (policy, name) = s
            .split_once('.')
            .ok_or_else(|| EncodingError::Malformed(format!("asset id `{s}`")))?;
        Ok(Self::Native {
            policy: policy.parse()?,
            name: hex::decode(name).map_err(|e| EncodingError::InvalidHex(e.to_string()))?,
        })
    }
}

impl Serialize for AssetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Multi-asset quantity; zero entries are never stored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Value(BTreeMap<AssetId, u64>);

impl Value {
    #[must_use]
    pub fn lovelace(amount: u64) -> Self {
        Self::from_asset(AssetId::Lovelace, amount)
    }

    #[must_use]
    pub fn from_asset(asset: AssetId, amount: u64) -> Self {
        let mut assets = BTreeMap::new();
        if amount > 0 {
            assets.insert(asset, amount);
        }
        Self(assets)
    }

    #[must_use]
    pub fn amount_of(&self, asset: &AssetId) -> u64 {
        self.0.get(asset).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn lovelace_amount(&self) -> u64 {
        self.amount_of(&AssetId::Lovelace)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when nothing but lovelace is held
    #[must_use]
    pub fn is_lovelace_only(&self) -> bool {
        self.0.keys().all(|asset| *asset == AssetId::Lovelace)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AssetId, u64)> {
        self.0.iter().map(|(asset, amount)| (asset, *amount))
    }

    /// Add `amount` of `asset` in place; `None` on overflow
    pub fn checked_add_asset(&mut self, asset: AssetId, amount: u64) -> Option<()> {
        if amount == 0 {
            return Some(());
        }
        let entry = self.0.entry(asset).or_insert(0);
        *entry = entry.checked_add(amount)?;
        Some(())
    }

    #[must_use]
    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        let mut sum = self.clone();
        for (asset, amount) in other.iter() {
            sum.checked_add_asset(asset.clone(), amount)?;
        }
        Some(sum)
    }

    /// Add `other`, capping each asset at `u64::MAX`
    #[must_use]
    pub fn saturating_add(&self, other: &Self) -> Self {
        let mut sum = self.clone();
        for (asset, amount) in other.iter() {
            if amount == 0 {
                continue;
            }
            let entry = sum.0.entry(asset.clone()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
        sum
    }

    /// Subtract `other`; `None` if any asset would go negative
    #[must_use]
    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        let mut rest = self.0.clone();
        for (asset, amount) in other.iter() {
            let held = rest.get(asset).copied().unwrap_or(0);
            let left = held.checked_sub(amount)?;
            if left == 0 {
                rest.remove(asset);
            } else {
                rest.insert(asset.clone(), left);
            }
        }
        Some(Self(rest))
    }

    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        other.iter().all(|(asset, amount)| self.amount_of(asset) >= amount)
    }

    /// Per-asset amount by which `self` falls short of `required`
    #[must_use]
    pub fn shortfall(&self, required: &Self) -> Self {
        let mut missing = BTreeMap::new();
        for (asset, amount) in required.iter() {
            let held = self.amount_of(asset);
            if held < amount {
                missing.insert(asset.clone(), amount - held);
            }
        }
        Self(missing)
    }
}

/// An unspent transaction output as observed on the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub tx_ref: TxRef,
    pub address: Address,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_datum: Option<Datum>,
}

impl Utxo {
    #[must_use]
    pub const fn has_inline_datum(&self) -> bool {
        self.inline_datum.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{test_key_hash, test_script_hash};

    #[test]
    fn test_address_round_trip() {
        let key = Address::key(NetworkId::Testnet, test_key_hash(1));
        let script = Address::script(NetworkId::Mainnet, test_script_hash(2));

        assert!(key.to_string().starts_with("60"));
        assert!(script.to_string().starts_with("71"));
        assert_eq!(key.to_string().parse::<Address>().unwrap(), key);
        assert_eq!(script.to_string().parse::<Address>().unwrap(), script);
    }

    #[test]
    fn test_address_rejects_bad_header() {
        let mut bytes = Address::key(NetworkId::Testnet, test_key_hash(1)).to_bytes();
        bytes[0] = 0x10;
        assert!(Address::from_bytes(&bytes).is_err());
        assert!(Address::from_bytes(&bytes[..10]).is_err());
    }

    #[test]
    fn test_hash_length_checked() {
        assert!("abcd".parse::<KeyHash>().is_err());
        assert!("zz".parse::<TxId>().is_err());
    }

    #[test]
    fn test_value_arithmetic() {
        let token = AssetId::native(test_script_hash(3), b"TestAsset".to_vec());
        let mut value = Value::lovelace(10);
        value.checked_add_asset(token.clone(), 1).unwrap();

        let sum = value.checked_add(&Value::lovelace(5)).unwrap();
        assert_eq!(sum.lovelace_amount(), 15);
        assert_eq!(sum.amount_of(&token), 1);
        assert!(!sum.is_lovelace_only());

        let rest = sum.checked_sub(&Value::lovelace(15)).unwrap();
        assert_eq!(rest, Value::from_asset(token, 1));
        assert!(Value::lovelace(1).checked_sub(&Value::lovelace(2)).is_none());
    }

    #[test]
    fn test_value_saturating_add() {
        let token = AssetId::native(test_script_hash(3), b"TestAsset".to_vec());
        let big = Value::lovelace(u64::MAX - 1);
        assert!(big.checked_add(&Value::lovelace(5)).is_none());

        let capped = big
            .saturating_add(&Value::lovelace(5))
            .saturating_add(&Value::from_asset(token.clone(), 2));
        assert_eq!(capped.lovelace_amount(), u64::MAX);
        assert_eq!(capped.amount_of(&token), 2);
        assert_eq!(Value::lovelace(1).saturating_add(&Value::default()), Value::lovelace(1));
    }

    #[test]
    fn test_value_shortfall() {
        let held = Value::lovelace(3);
        let needed = Value::lovelace(10);
        assert_eq!(held.shortfall(&needed), Value::lovelace(7));
        assert!(needed.shortfall(&held).is_empty());
        assert!(needed.covers(&held));
    }

    #[test]
    fn test_value_json_keys() {
        let token = AssetId::native(test_script_hash(3), b"A".to_vec());
        let value = Value::lovelace(2).checked_add(&Value::from_asset(token, 1)).unwrap();
        let json = serde_json::to_string(&value).unwrap();
        assert!(json.contains("\"lovelace\":2"));
        assert_eq!(serde_json::from_str::<Value>(&json).unwrap(), value);
    }
}
