//! Property tests for the pure building blocks

use proptest::prelude::*;
use scriptflow::workflow::splitter::split_even;
use scriptflow::{
    compute_window, Anchor, Datum, DonorMap, KeyHash, LockPoint, Redeemer, RemainderPolicy, Slot, SlotConfig,
    WindowPolicy,
};

const SLOTS: SlotConfig = SlotConfig::PREVIEW;

fn anchor() -> impl Strategy<Value = Anchor> {
    prop_oneof![Just(Anchor::Deadline), Just(Anchor::Now)]
}

proptest! {
    #[test]
    fn window_never_ends_before_lock(
        now in 0u64..1_000_000,
        lock in 0u64..1_000_000,
        tolerance in 0u64..1_000,
        anchor in anchor(),
    ) {
        let policy = WindowPolicy::NoEarlierThan { lock: LockPoint::Slot(Slot(lock)), tolerance, anchor };
        let window = compute_window(Slot(now), &policy, &SLOTS).unwrap();
        prop_assert!(window.valid_to() >= Slot(lock));
        prop_assert!(window.valid_from() <= window.valid_to());
        match anchor {
            Anchor::Deadline => prop_assert_eq!(window.valid_from(), Slot(lock)),
            Anchor::Now => prop_assert!(window.contains(Slot(now))),
        }
    }

    #[test]
    fn late_window_starts_after_unlock(
        lock in 0u64..1_000_000,
        delay in 0u64..100_000,
        late_by in 0u64..100_000,
        tolerance in 0u64..1_000,
    ) {
        let unlock = lock + delay;
        let now = Slot(unlock + late_by);
        let unlock_at = LockPoint::Slot(Slot(unlock));
        let policy = WindowPolicy::NoEarlierThan { lock: unlock_at, tolerance, anchor: Anchor::Now };
        let window = compute_window(now, &policy, &SLOTS).unwrap();
        prop_assert!(window.valid_from() >= Slot(unlock));
        prop_assert!(window.contains(now));
    }

    #[test]
    fn immediate_window_contains_now(now in 0u64..1_000_000, tolerance in 0u64..1_000) {
        let window = compute_window(Slot(now), &WindowPolicy::Immediate { tolerance }, &SLOTS).unwrap();
        prop_assert!(window.contains(Slot(now)));
        prop_assert_eq!(window.valid_to().0 - now, tolerance);
    }

    #[test]
    fn posix_floors_to_enclosing_slot(offset in 0u64..10_000_000_000) {
        let ms = SLOTS.zero_time_ms + offset;
        let slot = SLOTS.posix_to_slot(ms).unwrap();
        let start = SLOTS.slot_to_posix(slot).unwrap();
        prop_assert!(start <= ms);
        prop_assert!(ms < start + SLOTS.slot_length_ms);
    }

    #[test]
    fn donations_add_up(credits in prop::collection::vec((0u8..5, 0u64..1_000_000_000), 1..20)) {
        let mut donors = DonorMap::new();
        for (seed, amount) in &credits {
            donors.credit(KeyHash::from_bytes([*seed; 28]), *amount).unwrap();
        }
        let expected: u64 = credits.iter().map(|(_, amount)| amount).sum();
        prop_assert_eq!(donors.total().unwrap(), expected);
        prop_assert!(donors.len() <= 5);
        prop_assert_eq!(DonorMap::from_datum(&donors.to_datum()).unwrap(), donors);
    }

    #[test]
    fn split_shares_sum_to_total(total in 0u64..u64::MAX / 2, payees in 1usize..50) {
        let shares = split_even(total, payees, RemainderPolicy::FirstPayee).unwrap();
        prop_assert_eq!(shares.len(), payees);
        prop_assert_eq!(shares.iter().sum::<u64>(), total);
        prop_assert!(shares.iter().skip(1).all(|share| *share == shares[shares.len() - 1]));

        let strict = split_even(total, payees, RemainderPolicy::Reject);
        prop_assert_eq!(strict.is_ok(), total % payees as u64 == 0);
    }

    #[test]
    fn redeemer_survives_encoding(
        tag in 0u64..128,
        ints in prop::collection::vec(any::<i64>(), 0..4),
        bytes in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..4),
    ) {
        let fields = ints
            .into_iter()
            .map(Datum::int)
            .chain(bytes.into_iter().map(Datum::bytes))
            .collect();
        let redeemer = Redeemer { tag, fields };
        let encoded = redeemer.encode().unwrap();
        prop_assert_eq!(Redeemer::decode(&encoded).unwrap(), redeemer);
    }
}
