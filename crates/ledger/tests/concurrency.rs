//! Concurrency tests for the key ledger.
//!
//! Every test races real OS threads against one shared [`KeyLedger`] and
//! then checks that the serialized outcome is one a sequential execution
//! could have produced:
//!
//! - No key is handed to two identities
//! - Racing assigns of one key produce exactly one `Assigned`
//! - Pool + claims together still hold every key exactly once

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::disallowed_methods)]

use std::{
    collections::HashSet,
    sync::{Arc, Barrier},
    thread,
};

use keyledger::{AssignOutcome, ClaimOutcome, KeyLedger, NullNotifier};
use keyledger_test_utils::TestDir;
use keyledger_types::{Identity, Key, RepositoryOptions};

const THREADS: usize = 8;

fn open(dir: &TestDir) -> KeyLedger {
    let options = RepositoryOptions::builder().data_dir(dir.path()).build().unwrap();
    KeyLedger::open(options, Arc::new(NullNotifier)).unwrap().0
}

#[test]
fn test_racing_claims_issue_distinct_keys() {
    let dir = TestDir::new();
    let ledger = open(&dir);
    let keys: Vec<String> = (0..THREADS * 2).map(|i| format!("KEY-{i:02}")).collect();
    ledger.add_keys(&keys).unwrap();

    let barrier = Barrier::new(THREADS);
    let issued: Vec<Key> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let ledger = &ledger;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    let identity = Identity::from(t as u64);
                    // Claim twice; the second must be a no-op.
                    let first = ledger.claim(&identity).unwrap();
                    let second = ledger.claim(&identity).unwrap();
                    assert!(matches!(second, ClaimOutcome::AlreadyClaimed { .. }));
                    first.issued().cloned().expect("pool has a key for every thread")
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let distinct: HashSet<_> = issued.iter().collect();
    assert_eq!(distinct.len(), THREADS, "a key was issued twice: {issued:?}");
    assert_eq!(ledger.available_count(), THREADS);
    assert_eq!(ledger.claim_count(), THREADS);
    ledger.check_invariants().unwrap();
}

#[test]
fn test_racing_claims_drain_pool_exactly() {
    let dir = TestDir::new();
    let ledger = open(&dir);
    ledger.add_keys(["A", "B", "C"]).unwrap();

    let barrier = Barrier::new(THREADS);
    let outcomes: Vec<ClaimOutcome> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let ledger = &ledger;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    ledger.claim(&Identity::from(t as u64)).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let claimed = outcomes.iter().filter(|o| o.issued().is_some()).count();
    let exhausted = outcomes.iter().filter(|o| **o == ClaimOutcome::PoolExhausted).count();
    assert_eq!(claimed, 3);
    assert_eq!(exhausted, THREADS - 3);
    assert_eq!(ledger.available_count(), 0);
}

#[test]
fn test_racing_assign_of_one_key_has_one_winner() {
    let dir = TestDir::new();
    let ledger = open(&dir);
    ledger.add_keys(["SHARED", "OTHER"]).unwrap();

    let barrier = Barrier::new(THREADS);
    let outcomes: Vec<AssignOutcome> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let ledger = &ledger;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    ledger
                        .assign_key_to_user(&Identity::from(t as u64), Key::new("SHARED"), true)
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners = outcomes.iter().filter(|o| o.is_assigned()).count();
    assert_eq!(winners, 1, "outcomes: {outcomes:?}");
    assert!(
        outcomes
            .iter()
            .filter(|o| !o.is_assigned())
            .all(|o| matches!(o, AssignOutcome::KeyHeldByOther { .. }))
    );
    assert_eq!(ledger.list_pool(), vec![Key::new("OTHER")]);
    ledger.check_invariants().unwrap();
}

#[test]
fn test_readers_never_see_half_applied_mutation() {
    let dir = TestDir::new();
    let ledger = open(&dir);
    let keys: Vec<String> = (0..64).map(|i| format!("K{i}")).collect();
    ledger.add_keys(&keys).unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..64u64 {
                ledger.claim(&Identity::from(i)).unwrap();
            }
        });
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..200 {
                    let stats = ledger.stats();
                    assert_eq!(stats.available + stats.claimed, 64, "stats: {stats:?}");
                }
            });
        }
    });

    assert_eq!(ledger.claim_count(), 64);
}

#[test]
fn test_mixed_admin_traffic_conserves_keys() {
    let dir = TestDir::new();
    let ledger = open(&dir);
    let keys: Vec<String> = (0..32).map(|i| format!("K{i}")).collect();
    ledger.add_keys(&keys).unwrap();

    thread::scope(|s| {
        for t in 0..THREADS as u64 {
            let ledger = &ledger;
            s.spawn(move || {
                let identity = Identity::from(t);
                for round in 0..20 {
                    ledger.claim(&identity).unwrap();
                    ledger.revoke_claim(&identity, round % 2 == 0).unwrap();
                }
            });
        }
    });

    ledger.check_invariants().unwrap();
    assert_eq!(ledger.claim_count(), 0);
    assert!(ledger.available_count() <= 32);

    // Reopen: disk agrees with memory.
    let pool = ledger.list_pool();
    drop(ledger);
    assert_eq!(open(&dir).list_pool(), pool);
}
