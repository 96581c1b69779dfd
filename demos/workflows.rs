//! Example: every workflow end to end on the in-memory ledger
//!
//! Run with `RUST_LOG=scriptflow=debug cargo run --example workflows` to see
//! each composition and submission step.

use scriptflow::{
    AtomicMint, AtomicMintConfig, Blueprint, Crowdfund, CrowdfundConfig, Datum, DigestParameterizer, Driver,
    Htlc, HtlcConfig, InMemoryLedger, KeyHash, Keyring, NetworkId, PollPolicy, ScriptContext,
    ScriptEvaluator, Slot, Splitter, SplitterConfig, Value, Vault, VaultConfig,
};
use sha2::{Digest, Sha256};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const ADA: u64 = 1_000_000;
const BLUEPRINT: &str = include_str!("../tests/data/plutus.json");

/// Accepts any redeemer the given key signed for
struct SignedBy(KeyHash);

impl ScriptEvaluator for SignedBy {
    fn evaluate(&self, ctx: &ScriptContext<'_>) -> Result<(), String> {
        if ctx.signed_by(&self.0) {
            Ok(())
        } else {
            Err(format!("{} did not sign", self.0))
        }
    }
}

/// Reveal branch checks the preimage; the reclaim branch is left to the owner's signature
struct HashLock {
    hash: [u8; 32],
    owner: KeyHash,
}

impl ScriptEvaluator for HashLock {
    fn evaluate(&self, ctx: &ScriptContext<'_>) -> Result<(), String> {
        match ctx.redeemer.fields.first().and_then(Datum::as_bytes) {
            Some(secret) if Sha256::digest(secret).as_slice() == self.hash => Ok(()),
            Some(_) => Err("wrong secret".into()),
            None => SignedBy(self.owner).evaluate(ctx),
        }
    }
}

struct Password(&'static str);

impl ScriptEvaluator for Password {
    fn evaluate(&self, ctx: &ScriptContext<'_>) -> Result<(), String> {
        let given = ctx.redeemer.fields.first().and_then(Datum::as_bytes);
        if given == Some(self.0.as_bytes()) {
            Ok(())
        } else {
            Err("wrong password".into())
        }
    }
}

fn accept_all(_: &ScriptContext<'_>) -> Result<(), String> {
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Scriptflow Workflow Demo\n");

    // 1. Ledger, keys and driver
    let ledger = InMemoryLedger::new();
    ledger.set_slot(Slot(1_000));
    let mut keyring = Keyring::new();
    let wallet_key = keyring.insert_seed(1)?;
    let alice = keyring.insert_seed(2)?;
    let bob = keyring.insert_seed(3)?;
    let carol = keyring.insert_seed(4)?;
    let wallet = Keyring::address(NetworkId::Testnet, wallet_key);
    for _ in 0..4 {
        ledger.fund(wallet, Value::lovelace(250 * ADA));
    }
    ledger.fund(Keyring::address(NetworkId::Testnet, alice), Value::lovelace(100 * ADA));
    ledger.fund(Keyring::address(NetworkId::Testnet, bob), Value::lovelace(100 * ADA));

    let driver = Driver::new(ledger.clone(), keyring, wallet)
        .with_clock(Arc::new(ledger.clone()))
        .with_slot_config(ledger.slot_config())
        .with_poll_policy(PollPolicy::new(Duration::from_secs(1), 10));
    let blueprint = Blueprint::from_json(BLUEPRINT)?;
    let parameterizer = DigestParameterizer;
    println!("1. Wallet {wallet} funded at slot {}", ledger.slot());

    // 2. HTLC: lock, then reveal the secret
    println!("\n2. HTLC");
    let secret = b"Secret Answer";
    let config = HtlcConfig::from_secret(secret, ledger.now_ms() + 600_000, alice);
    let htlc = Htlc::from_blueprint(&driver, config.clone(), &blueprint, "htlc.htlc", &parameterizer)?;
    ledger.register_validator(
        htlc.validator().hash,
        HashLock {
            hash: config.secret_hash,
            owner: alice,
        },
    );
    println!("   lock:   {}", htlc.lock(&wallet, Value::lovelace(10 * ADA))?);
    println!("   reveal: {}", htlc.reveal(secret, &driver.key_address(bob))?);
    println!("   state:  {}", htlc.state()?);

    // 3. Crowdfund: two donors reach the goal, the beneficiary claims
    println!("\n3. Crowdfund");
    let config = CrowdfundConfig {
        beneficiary: carol,
        goal: 30 * ADA,
        deadline_ms: ledger.now_ms() + 300_000,
    };
    let crowdfund = Crowdfund::from_blueprint(&driver, config, &blueprint, "crowdfund.crowdfund", &parameterizer)?;
    ledger.register_validator(crowdfund.validator().hash, accept_all);
    println!("   open:   {}", crowdfund.open(alice, 10 * ADA)?);
    println!("   donate: {}", crowdfund.donate(bob, 25 * ADA)?);
    println!("   state:  {}", crowdfund.state()?);
    println!("   claim:  {}", crowdfund.claim()?);
    println!("   state:  {}", crowdfund.state()?);

    // 4. Vault: deposit, request, wait out the delay, finalize
    println!("\n4. Vault");
    let config = VaultConfig {
        owner: alice,
        wait_time_ms: 60_000,
    };
    let vault = Vault::from_blueprint(&driver, config, &blueprint, "vault.vault", &parameterizer)?;
    ledger.register_validator(vault.validator().hash, SignedBy(alice));
    println!("   deposit:  {}", vault.deposit(Value::lovelace(20 * ADA))?);
    println!("   request:  {}", vault.request_withdraw()?);
    println!("   state:    {}", vault.state()?);
    println!("   waited:   {:?}", vault.await_unlock()?);
    println!("   finalize: {}", vault.finalize()?);

    // 5. Payment splitter: 30 ADA over three payees
    println!("\n5. Payment splitter");
    let config = SplitterConfig::new(vec![alice, bob, carol], wallet_key);
    let splitter = Splitter::from_blueprint(&driver, config, &blueprint, "splitter.splitter", &parameterizer)?;
    ledger.register_validator(splitter.validator().hash, SignedBy(wallet_key));
    println!("   lock:  {}", splitter.lock(Value::lovelace(30 * ADA))?);
    println!("   split: {}", splitter.split()?);

    // 6. Atomic spend and mint
    println!("\n6. Atomic mint");
    let atomic = AtomicMint::from_blueprint(
        &driver,
        AtomicMintConfig::default(),
        &blueprint,
        "atomic.spend",
        "atomic.mint",
        &parameterizer,
    )?;
    ledger.register_validator(atomic.spend_validator().hash, accept_all);
    ledger.register_validator(atomic.policy().hash, Password("hunter2"));
    println!("   fund:    {}", atomic.fund(Value::lovelace(5 * ADA))?);
    println!("   wrong:   {}", atomic.resolve("letmein", &wallet)?);
    println!("   resolve: {}", atomic.resolve("hunter2", &wallet)?);
    println!(
        "   minted:  {} x {}",
        ledger.balance(&wallet).amount_of(&atomic.asset()),
        atomic.asset()
    );

    println!("\nFinished at slot {}", ledger.slot());
    Ok(())
}
