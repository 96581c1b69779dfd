//! Vault workflow against the in-memory ledger

mod common;

use common::{harness, Harness, VaultScript, ADA};
use scriptflow::{DriverError, InMemoryLedger, Keyring, Outcome, Value, Vault, VaultConfig, VaultState};

const WAIT_SECONDS: u64 = 60;

fn setup(h: &Harness) -> Vault<'_, InMemoryLedger, Keyring> {
    let config = VaultConfig {
        owner: h.parties[0],
        wait_time_ms: WAIT_SECONDS * 1_000,
    };
    let vault = Vault::from_blueprint(&h.driver, config.clone(), &h.blueprint, "vault.vault", &h.parameterizer)
        .unwrap();
    h.ledger.register_validator(vault.validator().hash, VaultScript(config));
    vault
}

#[test]
fn test_withdraw_after_wait_time() {
    let h = harness(1);
    let vault = setup(&h);
    let owner = h.address_of(h.parties[0]);

    assert!(vault.deposit(Value::lovelace(20 * ADA)).unwrap().is_settled());
    assert!(matches!(vault.state().unwrap(), VaultState::Idle { .. }));

    let requested_at = h.ledger.now_ms();
    assert!(vault.request_withdraw().unwrap().is_settled());
    let VaultState::WithdrawRequested {
        lock_time_ms,
        unlock_slot,
        value,
        ..
    } = vault.state().unwrap()
    else {
        panic!("expected a pending withdrawal");
    };
    assert_eq!(lock_time_ms, requested_at);
    assert_eq!(unlock_slot.0, h.ledger.slot().0 + WAIT_SECONDS);
    assert_eq!(value, Value::lovelace(20 * ADA));

    // Too early: the window reaches the unlock time but starts now
    let outcome = vault.finalize().unwrap();
    assert!(
        matches!(outcome, Outcome::ValidatorRejected(ref reason) if reason.contains("wait time")),
        "{outcome}"
    );
    assert!(matches!(vault.state().unwrap(), VaultState::WithdrawRequested { .. }));

    assert!(vault.await_unlock().unwrap().is_satisfied());
    let outcome = vault.finalize().unwrap();
    assert!(outcome.is_settled(), "{outcome}");
    assert_eq!(h.lovelace_at(&owner), 20 * ADA);
    assert_eq!(vault.state().unwrap(), VaultState::Empty);
}

#[test]
fn test_cancel_returns_to_idle() {
    let h = harness(1);
    let vault = setup(&h);
    vault.deposit(Value::lovelace(20 * ADA)).unwrap();
    vault.request_withdraw().unwrap();

    assert!(vault.cancel().unwrap().is_settled());
    let VaultState::Idle { value, .. } = vault.state().unwrap() else {
        panic!("expected an idle deposit");
    };
    assert_eq!(value, Value::lovelace(20 * ADA));

    assert!(matches!(
        vault.finalize(),
        Err(DriverError::IllegalTransition { action: "finalize_withdraw", .. })
    ));
}

#[test]
fn test_request_needs_a_deposit() {
    let h = harness(1);
    let vault = setup(&h);
    assert!(matches!(
        vault.request_withdraw(),
        Err(DriverError::IllegalTransition { action: "request_withdraw", .. })
    ));
    assert!(matches!(
        vault.await_unlock(),
        Err(DriverError::IllegalTransition { action: "await_unlock", .. })
    ));
}

#[test]
fn test_second_request_is_illegal() {
    let h = harness(1);
    let vault = setup(&h);
    vault.deposit(Value::lovelace(20 * ADA)).unwrap();
    vault.request_withdraw().unwrap();
    assert!(matches!(
        vault.request_withdraw(),
        Err(DriverError::IllegalTransition { action: "request_withdraw", .. })
    ));
}
