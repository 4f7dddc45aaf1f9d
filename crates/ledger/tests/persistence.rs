//! Crash-consistency and corruption tests.
//!
//! A crash can land between the two document saves of a cross-document
//! mutation. Since the document that adds a key's presence is written first,
//! the possible on-disk leftovers are:
//!
//! ```text
//! claim / assign crashed after claims save  → key in pool AND claims
//! revoke(return) crashed after pool save    → key in pool AND claims
//! ```
//!
//! These tests write such leftovers by hand and check that opening the
//! ledger repairs them, plus the corrupt-document paths of both policies.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::disallowed_methods)]

use std::sync::Arc;

use keyledger::{KeyLedger, LedgerError, NullNotifier, OpenReport, Repairs};
use keyledger_store::{DefaultReason, StoreError};
use keyledger_test_utils::TestDir;
use keyledger_types::{CorruptionPolicy, EligibilityMode, Identity, Key, RepositoryOptions};

fn options(dir: &TestDir, policy: CorruptionPolicy) -> RepositoryOptions {
    RepositoryOptions::builder().data_dir(dir.path()).corruption_policy(policy).build().unwrap()
}

fn open(dir: &TestDir) -> (KeyLedger, OpenReport) {
    KeyLedger::open(options(dir, CorruptionPolicy::Recover), Arc::new(NullNotifier)).unwrap()
}

fn pool_strs(ledger: &KeyLedger) -> Vec<String> {
    ledger.list_pool().into_iter().map(Key::into_inner).collect()
}

// ============================================
// Partial cross-document writes
// ============================================

#[test]
fn test_crash_after_claims_save_keeps_claim() {
    let dir = TestDir::new();
    // claim(1) wrote claims.json but died before keys.json.
    dir.write("keys.json", r#"{"pool": ["A", "B"], "config": {"min_days": 7, "mode": "account"}}"#);
    dir.write("claims.json", r#"{"1": "A"}"#);

    let (ledger, report) = open(&dir);
    assert_eq!(report.repairs, Repairs { pool_overlaps: 1, duplicate_claims: 0 });
    assert!(!report.is_clean());
    assert_eq!(pool_strs(&ledger), vec!["B"]);
    assert_eq!(ledger.get_claim(&Identity::new("1")), Some(Key::new("A")));

    // The repair was written back: a second open is clean.
    drop(ledger);
    let (_, report) = open(&dir);
    assert!(report.is_clean(), "report: {report:?}");
}

#[test]
fn test_crash_after_pool_save_of_revoke_keeps_claim() {
    let dir = TestDir::new();
    {
        let (ledger, _) = open(&dir);
        ledger.add_keys(["A", "B"]).unwrap();
        ledger.claim(&Identity::new("1")).unwrap();
    }
    // revoke(1, return) wrote keys.json with A back at the head, then died.
    dir.write("keys.json", r#"{"pool": ["A", "B"], "config": {"min_days": 7, "mode": "account"}}"#);

    let (ledger, report) = open(&dir);
    assert_eq!(report.repairs.pool_overlaps, 1);
    assert_eq!(pool_strs(&ledger), vec!["B"]);
    assert!(ledger.has_claimed(&Identity::new("1")));
    ledger.check_invariants().unwrap();
}

#[test]
fn test_key_claimed_twice_goes_to_smallest_identity() {
    let dir = TestDir::new();
    dir.write("claims.json", r#"{"300": "K", "200": "K", "100": "J"}"#);

    let (ledger, report) = open(&dir);
    assert_eq!(report.repairs.duplicate_claims, 1);
    assert_eq!(ledger.get_claim(&Identity::new("200")), Some(Key::new("K")));
    assert_eq!(ledger.get_claim(&Identity::new("300")), None);
    assert_eq!(ledger.get_claim(&Identity::new("100")), Some(Key::new("J")));
}

// ============================================
// Corrupt documents
// ============================================

#[test]
fn test_corrupt_claims_recover_keeps_pool() {
    let dir = TestDir::new();
    dir.write("keys.json", r#"{"pool": ["A"], "config": {"min_days": 3, "mode": "guild"}}"#);
    dir.write("claims.json", "{\"1\": ");

    let (ledger, report) = open(&dir);
    assert_eq!(report.pool, None);
    assert!(matches!(report.claims, Some(DefaultReason::Corrupt(_))), "report: {report:?}");
    assert_eq!(pool_strs(&ledger), vec!["A"]);
    assert_eq!(ledger.get_config().mode, EligibilityMode::Guild);
    assert_eq!(ledger.claim_count(), 0);

    let quarantined: Vec<_> = dir
        .file_names()
        .into_iter()
        .filter(|name| name.starts_with("claims.json.corrupt-"))
        .collect();
    assert_eq!(quarantined.len(), 1, "files: {:?}", dir.file_names());
    assert_eq!(dir.read(&quarantined[0]), "{\"1\": ");
}

#[test]
fn test_corrupt_pool_abort_refuses_to_open() {
    let dir = TestDir::new();
    dir.write("keys.json", "\u{0}\u{1}garbage");

    let err = KeyLedger::open(options(&dir, CorruptionPolicy::Abort), Arc::new(NullNotifier))
        .unwrap_err();
    match err {
        LedgerError::Load { source: StoreError::Fatal { path, .. } } => {
            assert!(path.ends_with("keys.json"));
        },
        other => panic!("expected Load(Fatal), got {other:?}"),
    }
    assert_eq!(dir.read("keys.json"), "\u{0}\u{1}garbage", "abort must not touch the file");
}

#[test]
fn test_lenient_config_does_not_discard_pool() {
    let dir = TestDir::new();
    dir.write("keys.json", r#"{"pool": [" A ", "A", "", "B"], "config": {"min_days": -3, "mode": "planet"}}"#);

    let (ledger, report) = open(&dir);
    assert_eq!(report.pool, None);
    assert_eq!(pool_strs(&ledger), vec!["A", "B"]);
    let config = ledger.get_config();
    assert_eq!(config.min_days, 0);
    assert_eq!(config.mode, EligibilityMode::Account);
}

// ============================================
// Flush
// ============================================

#[test]
fn test_flush_rewrites_both_documents() {
    let dir = TestDir::new();
    let (ledger, _) = open(&dir);
    ledger.add_keys(["A", "B"]).unwrap();
    ledger.claim(&Identity::new("1")).unwrap();

    std::fs::remove_file(dir.join("keys.json")).unwrap();
    std::fs::remove_file(dir.join("claims.json")).unwrap();
    ledger.flush().unwrap();

    drop(ledger);
    let (reopened, report) = open(&dir);
    assert!(report.is_clean());
    assert_eq!(report.pool, None);
    assert_eq!(pool_strs(&reopened), vec!["B"]);
    assert_eq!(reopened.get_claim(&Identity::new("1")), Some(Key::new("A")));
}
