//! Crowdfund workflow against the in-memory ledger

mod common;

use common::{harness, CrowdfundScript, Harness, ADA};
use scriptflow::{
    Crowdfund, CrowdfundConfig, CrowdfundState, DriverError, InMemoryLedger, Keyring, ReclaimPayout, Reserving,
    Value,
};

struct Parties {
    beneficiary: scriptflow::KeyHash,
    alice: scriptflow::KeyHash,
    bob: scriptflow::KeyHash,
}

fn setup(h: &Harness) -> (Crowdfund<'_, InMemoryLedger, Keyring>, Parties) {
    let parties = Parties {
        beneficiary: h.parties[0],
        alice: h.parties[1],
        bob: h.parties[2],
    };
    for donor in [parties.alice, parties.bob] {
        h.ledger.fund(h.address_of(donor), Value::lovelace(100 * ADA));
    }
    let config = CrowdfundConfig {
        beneficiary: parties.beneficiary,
        goal: 30 * ADA,
        deadline_ms: h.in_seconds(300),
    };
    let crowdfund = Crowdfund::from_blueprint(
        &h.driver,
        config.clone(),
        &h.blueprint,
        "crowdfund.crowdfund",
        &h.parameterizer,
    )
    .unwrap();
    h.ledger.register_validator(crowdfund.validator().hash, CrowdfundScript(config));
    (crowdfund, parties)
}

#[test]
fn test_reach_goal_and_claim() {
    let h = harness(3);
    let (crowdfund, p) = setup(&h);
    assert_eq!(crowdfund.state().unwrap(), CrowdfundState::Closed);

    assert!(crowdfund.open(p.alice, 10 * ADA).unwrap().is_settled());
    assert!(matches!(crowdfund.state().unwrap(), CrowdfundState::Funding(_)));

    assert!(crowdfund.donate(p.bob, 5 * ADA).unwrap().is_settled());
    let outcome = crowdfund.donate(p.alice, 20 * ADA).unwrap();
    assert!(outcome.is_settled(), "{outcome}");

    let CrowdfundState::Reached(pot) = crowdfund.state().unwrap() else {
        panic!("goal should be reached");
    };
    assert_eq!(pot.donors.credited(&p.alice), 30 * ADA);
    assert_eq!(pot.donors.credited(&p.bob), 5 * ADA);
    assert_eq!(pot.value, Value::lovelace(35 * ADA));
    assert_eq!(h.lovelace_at(&h.address_of(p.alice)), 70 * ADA);

    let outcome = crowdfund.claim().unwrap();
    assert!(outcome.is_settled(), "{outcome}");
    assert_eq!(h.lovelace_at(&h.address_of(p.beneficiary)), 35 * ADA);
    assert_eq!(crowdfund.state().unwrap(), CrowdfundState::Closed);
}

#[test]
fn test_claim_refused_after_unsuccessful_deadline() {
    let h = harness(3);
    let (crowdfund, p) = setup(&h);
    crowdfund.open(p.alice, 10 * ADA).unwrap();
    crowdfund.donate(p.bob, 5 * ADA).unwrap();

    assert!(crowdfund.await_deadline().unwrap().is_satisfied());
    assert!(matches!(crowdfund.state().unwrap(), CrowdfundState::Expired(_)));
    assert!(matches!(
        crowdfund.claim(),
        Err(DriverError::IllegalTransition { action: "claim", .. })
    ));
    assert!(matches!(
        crowdfund.donate(p.bob, ADA),
        Err(DriverError::IllegalTransition { action: "donate", .. })
    ));
}

#[test]
fn test_reclaim_per_donor() {
    let h = harness(3);
    let (crowdfund, p) = setup(&h);
    crowdfund.open(p.alice, 10 * ADA).unwrap();
    crowdfund.donate(p.bob, 5 * ADA).unwrap();
    crowdfund.await_deadline().unwrap();

    let outcome = crowdfund.reclaim(p.bob, ReclaimPayout::PerDonor).unwrap();
    assert!(outcome.is_settled(), "{outcome}");
    assert_eq!(h.lovelace_at(&h.address_of(p.alice)), 100 * ADA);
    assert_eq!(h.lovelace_at(&h.address_of(p.bob)), 100 * ADA);
    assert_eq!(crowdfund.state().unwrap(), CrowdfundState::Closed);
}

#[test]
fn test_reclaim_aggregate() {
    let h = harness(3);
    let (crowdfund, p) = setup(&h);
    crowdfund.open(p.alice, 10 * ADA).unwrap();
    crowdfund.await_deadline().unwrap();

    let refund = h.address_of(p.beneficiary);
    let outcome = crowdfund.reclaim(p.alice, ReclaimPayout::Aggregate(refund)).unwrap();
    assert!(outcome.is_settled(), "{outcome}");
    assert_eq!(h.lovelace_at(&refund), 10 * ADA);
}

#[test]
fn test_reclaim_before_deadline_is_illegal() {
    let h = harness(3);
    let (crowdfund, p) = setup(&h);
    crowdfund.open(p.alice, 10 * ADA).unwrap();
    assert!(matches!(
        crowdfund.reclaim(p.alice, ReclaimPayout::PerDonor),
        Err(DriverError::IllegalTransition { action: "reclaim", .. })
    ));
}

#[test]
fn test_open_twice_and_donate_when_closed() {
    let h = harness(3);
    let (crowdfund, p) = setup(&h);
    assert!(matches!(
        crowdfund.donate(p.alice, ADA),
        Err(DriverError::IllegalTransition { action: "donate", .. })
    ));
    crowdfund.open(p.alice, 10 * ADA).unwrap();
    assert!(matches!(
        crowdfund.open(p.bob, 10 * ADA),
        Err(DriverError::IllegalTransition { action: "open", .. })
    ));
}

#[test]
fn test_failed_donation_hands_the_pot_back() {
    let mut h = harness(4);
    h.driver = h.driver.with_selector(Box::new(Reserving::new()));
    let (crowdfund, p) = setup(&h);
    let poor = h.parties[3];
    h.ledger.fund(h.address_of(poor), Value::lovelace(ADA));

    assert!(crowdfund.open(p.alice, 10 * ADA).unwrap().is_settled());
    assert!(matches!(
        crowdfund.donate(poor, 5 * ADA),
        Err(DriverError::InsufficientFunds { .. })
    ));

    let outcome = crowdfund.donate(p.alice, 5 * ADA).unwrap();
    assert!(outcome.is_settled(), "{outcome}");
    let CrowdfundState::Funding(pot) = crowdfund.state().unwrap() else {
        panic!("pot should still be funding");
    };
    assert_eq!(pot.donors.credited(&p.alice), 15 * ADA);
    assert_eq!(pot.donors.credited(&poor), 0);
}
