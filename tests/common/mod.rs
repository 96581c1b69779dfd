//! Shared harness for workflow integration tests
//!
//! The script types below stand in for the on-chain validators and run inside
//! the in-memory ledger.

#![allow(dead_code)]

use scriptflow::{
    Address, Blueprint, CrowdfundConfig, Datum, DigestParameterizer, Driver, DonorMap, HtlcConfig,
    InMemoryLedger, KeyHash, Keyring, PollPolicy, ScriptContext, ScriptEvaluator, ScriptPurpose, Slot,
    SplitterConfig, Value, VaultConfig,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

pub const BLUEPRINT: &str = include_str!("../data/plutus.json");
pub const ADA: u64 = 1_000_000;
pub const START_SLOT: Slot = Slot(1_000);

pub type TestDriver = Driver<InMemoryLedger, Keyring>;

pub struct Harness {
    pub ledger: InMemoryLedger,
    pub driver: TestDriver,
    /// Extra parties, in seed order starting at 2
    pub parties: Vec<KeyHash>,
    pub blueprint: Blueprint,
    pub parameterizer: DigestParameterizer,
}

/// Ledger at [`START_SLOT`] with a funded wallet (seed 1) and `parties` more keys
pub fn harness(parties: u32) -> Harness {
    let ledger = InMemoryLedger::new();
    ledger.set_slot(START_SLOT);

    let mut keyring = Keyring::new();
    let wallet_key = keyring.insert_seed(1).unwrap();
    let parties: Vec<KeyHash> = (2..2 + parties).map(|seed| keyring.insert_seed(seed).unwrap()).collect();
    let wallet = Keyring::address(scriptflow::NetworkId::Testnet, wallet_key);
    for _ in 0..4 {
        ledger.fund(wallet, Value::lovelace(250 * ADA));
    }

    let driver = Driver::new(ledger.clone(), keyring, wallet)
        .with_clock(Arc::new(ledger.clone()))
        .with_slot_config(ledger.slot_config())
        .with_poll_policy(PollPolicy::new(Duration::from_secs(1), 10));

    Harness {
        ledger,
        driver,
        parties,
        blueprint: Blueprint::from_json(BLUEPRINT).unwrap(),
        parameterizer: DigestParameterizer,
    }
}

impl Harness {
    pub fn address_of(&self, key: KeyHash) -> Address {
        self.driver.key_address(key)
    }

    pub fn lovelace_at(&self, address: &Address) -> u64 {
        self.ledger.balance(address).lovelace_amount()
    }

    /// POSIX time `seconds` after the current slot
    pub fn in_seconds(&self, seconds: u64) -> u64 {
        self.ledger.now_ms() + seconds * 1_000
    }
}

fn own_address(ctx: &ScriptContext<'_>) -> Result<Address, String> {
    match ctx.purpose {
        ScriptPurpose::Spend(utxo) => Ok(utxo.address),
        ScriptPurpose::Mint(_) => Err("not a spend".into()),
    }
}

fn require(condition: bool, reason: &str) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(reason.to_string())
    }
}

pub struct HtlcScript(pub HtlcConfig);

impl ScriptEvaluator for HtlcScript {
    fn evaluate(&self, ctx: &ScriptContext<'_>) -> Result<(), String> {
        match ctx.redeemer.tag {
            0 => {
                let secret = ctx
                    .redeemer
                    .fields
                    .first()
                    .and_then(Datum::as_bytes)
                    .ok_or("missing secret")?;
                require(Sha256::digest(secret).as_slice() == self.0.secret_hash, "wrong secret")?;
                let to = ctx.valid_to_ms().ok_or("unbounded validity")?;
                require(to <= self.0.expiration_ms, "reveal after expiration")
            }
            1 => {
                let from = ctx.valid_from_ms().ok_or("unbounded validity")?;
                require(from >= self.0.expiration_ms, "reclaim before expiration")?;
                require(ctx.signed_by(&self.0.owner), "owner did not sign")
            }
            tag => Err(format!("unknown redeemer {tag}")),
        }
    }
}

pub struct CrowdfundScript(pub CrowdfundConfig);

impl ScriptEvaluator for CrowdfundScript {
    fn evaluate(&self, ctx: &ScriptContext<'_>) -> Result<(), String> {
        let donors = ctx
            .datum
            .ok_or("missing datum")
            .and_then(|datum| DonorMap::from_datum(datum).map_err(|_| "bad datum"))?;
        let total = donors.total().map_err(|e| e.to_string())?;
        match ctx.redeemer.tag {
            0 => {
                let own = own_address(ctx)?;
                let ScriptPurpose::Spend(input) = ctx.purpose else {
                    return Err("not a spend".into());
                };
                let relocked = ctx.paid_to(&own).lovelace_amount();
                require(relocked > input.value.lovelace_amount(), "donation must grow the pot")?;
                let to = ctx.valid_to_ms().ok_or("unbounded validity")?;
                require(to <= self.0.deadline_ms, "donation after deadline")
            }
            1 => {
                require(total >= self.0.goal, "goal not reached")?;
                require(ctx.signed_by(&self.0.beneficiary), "beneficiary did not sign")
            }
            2 => {
                require(total < self.0.goal, "goal was reached")?;
                let from = ctx.valid_from_ms().ok_or("unbounded validity")?;
                require(from >= self.0.deadline_ms, "reclaim before deadline")
            }
            tag => Err(format!("unknown redeemer {tag}")),
        }
    }
}

pub struct VaultScript(pub VaultConfig);

impl ScriptEvaluator for VaultScript {
    fn evaluate(&self, ctx: &ScriptContext<'_>) -> Result<(), String> {
        require(ctx.signed_by(&self.0.owner), "owner did not sign")?;
        match ctx.redeemer.tag {
            0 | 2 => Ok(()),
            1 => {
                let lock_time = ctx
                    .datum
                    .and_then(Datum::as_constr)
                    .and_then(|(_, fields)| fields.first())
                    .and_then(Datum::as_int)
                    .ok_or("no withdrawal request")?;
                let from = ctx.valid_from_ms().ok_or("unbounded validity")?;
                require(
                    i128::from(from) >= lock_time + i128::from(self.0.wait_time_ms),
                    "wait time has not elapsed",
                )
            }
            tag => Err(format!("unknown redeemer {tag}")),
        }
    }
}

pub struct SplitterScript(pub SplitterConfig);

impl ScriptEvaluator for SplitterScript {
    fn evaluate(&self, ctx: &ScriptContext<'_>) -> Result<(), String> {
        require(ctx.redeemer.tag == 0, "unknown redeemer")?;
        let owner = ctx
            .datum
            .and_then(Datum::as_constr)
            .and_then(|(_, fields)| fields.first())
            .and_then(Datum::as_bytes)
            .ok_or("missing owner")?;
        let signed = ctx.signatories.iter().any(|key| key.as_bytes().as_slice() == owner);
        require(signed, "owner did not sign")?;

        let locked: u64 = ctx
            .tx
            .script_inputs
            .iter()
            .map(|input| input.utxo.value.lovelace_amount())
            .sum();
        let share = locked / self.0.payees.len() as u64;
        for payee in &self.0.payees {
            let address = Address::key(own_address(ctx)?.network, *payee);
            require(ctx.paid_to(&address).lovelace_amount() >= share, "payee underpaid")?;
        }
        Ok(())
    }
}

/// Spending half of the atomic demo: only unlocks alongside a mint
pub fn atomic_spend(ctx: &ScriptContext<'_>) -> Result<(), String> {
    require(!ctx.tx.mints.is_empty(), "nothing minted")
}

pub struct PasswordPolicy(pub &'static str);

impl ScriptEvaluator for PasswordPolicy {
    fn evaluate(&self, ctx: &ScriptContext<'_>) -> Result<(), String> {
        let given = ctx.redeemer.fields.first().and_then(Datum::as_bytes);
        require(given == Some(self.0.as_bytes()), "wrong password")
    }
}
