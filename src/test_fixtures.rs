//! Test fixtures shared by unit tests

#![allow(dead_code)] // Not every fixture is used in every test module

use crate::blueprint::Validator;
use crate::datum::Datum;
use crate::ledger::{Address, KeyHash, NetworkId, ScriptHash, TxId, TxRef, Utxo, Value};
use crate::memory::digest_validator;

/// CIP-57 blueprint with one parameterized HTLC validator
pub const SAMPLE_BLUEPRINT: &str = r##"{
  "preamble": {
    "title": "scriptflow/htlc",
    "description": "Hash time-locked contract",
    "version": "0.0.0",
    "plutusVersion": "v3"
  },
  "validators": [
    {
      "title": "htlc.htlc.spend",
      "datum": {
        "title": "datum",
        "schema": { "$ref": "#/definitions/Data" }
      },
      "redeemer": {
        "title": "redeemer",
        "schema": { "$ref": "#/definitions/htlc~1Action" }
      },
      "parameters": [
        { "title": "secret_hash", "schema": { "$ref": "#/definitions/ByteArray" } },
        { "title": "expiration", "schema": { "$ref": "#/definitions/Int" } },
        { "title": "owner", "schema": { "$ref": "#/definitions/VerificationKeyHash" } }
      ],
      "compiledCode": "5901010100323232323225333002323232",
      "hash": "0a0b0c0d0e0f101112131415161718191a1b1c1d1e1f202122232425"
    }
  ],
  "definitions": {
    "ByteArray": { "dataType": "bytes" },
    "Data": { "title": "Data", "description": "Any Plutus data." },
    "Int": { "dataType": "integer" },
    "VerificationKeyHash": { "title": "VerificationKeyHash", "dataType": "bytes" },
    "htlc/Action": {
      "title": "Action",
      "anyOf": [
        {
          "title": "RevealSecret",
          "dataType": "constructor",
          "index": 0,
          "fields": [{ "title": "secret", "$ref": "#/definitions/ByteArray" }]
        },
        { "$ref": "#/definitions/htlc~1TimeoutReclaim" }
      ]
    },
    "htlc/TimeoutReclaim": {
      "title": "TimeoutReclaim",
      "dataType": "constructor",
      "index": 1,
      "fields": []
    }
  }
}"##;

#[must_use]
pub fn test_key_hash(seed: u8) -> KeyHash {
    KeyHash::from_bytes([seed; KeyHash::LEN])
}

#[must_use]
pub fn test_script_hash(seed: u8) -> ScriptHash {
    ScriptHash::from_bytes([seed.wrapping_add(0x80); ScriptHash::LEN])
}

#[must_use]
pub fn test_key_address(seed: u8) -> Address {
    Address::key(NetworkId::Testnet, test_key_hash(seed))
}

#[must_use]
pub fn test_script_address(seed: u8) -> Address {
    Address::script(NetworkId::Testnet, test_script_hash(seed))
}

/// Validator with non-empty code; distinct seeds give distinct hashes
#[must_use]
pub fn test_validator(seed: u8) -> Validator {
    digest_validator(vec![0x59, 0x01, seed])
}

fn test_tx_ref(seed: u8) -> TxRef {
    TxRef::new(TxId::from_bytes([seed; TxId::LEN]), u32::from(seed))
}

/// UTXO locked by `validator` on testnet
#[must_use]
pub fn test_script_utxo(seed: u8, validator: &Validator, lovelace: u64, datum: Option<Datum>) -> Utxo {
    Utxo {
        tx_ref: test_tx_ref(seed),
        address: validator.address(NetworkId::Testnet),
        value: Value::lovelace(lovelace),
        inline_datum: datum,
    }
}

/// Datum-less UTXO at `address`
#[must_use]
pub fn test_wallet_utxo(seed: u8, address: Address, lovelace: u64) -> Utxo {
    Utxo {
        tx_ref: test_tx_ref(seed.wrapping_add(0x40)),
        address,
        value: Value::lovelace(lovelace),
        inline_datum: None,
    }
}
