//! Proptest strategies for KeyLedger domain types.
//!
//! Keys and identities are drawn from deliberately small alphabets so random
//! operation sequences collide often: the same key gets added twice, claimed,
//! revoked and re-assigned within one run.
//!
//! # Usage
//!
//! ```no_run
//! use keyledger_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn my_property(ops in strategies::arb_ledger_ops()) {
//!         // replay ops against a ledger and check invariants
//!     }
//! }
//! ```

use keyledger_types::{EligibilityMode, Identity, Key};
use proptest::prelude::*;

/// One ledger call, as generated for property tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOp {
    /// `add_keys` with raw candidates (may be blank or padded).
    AddKeys(Vec<String>),
    /// `claim`; the identity may carry surrounding whitespace.
    Claim(Identity),
    /// `revoke_claim`.
    Revoke {
        /// Target identity.
        identity: Identity,
        /// Whether the key goes back to the pool head.
        return_to_pool: bool,
    },
    /// `assign_key_to_user`.
    Assign {
        /// Receiving identity.
        identity: Identity,
        /// Key to bind.
        key: Key,
        /// Whether to strip the key from the pool first.
        remove_from_pool: bool,
    },
    /// `remove_key_from_pool`.
    Remove(Key),
    /// `set_config` with optional fields.
    SetConfig {
        /// New minimum age in days.
        min_days: Option<u32>,
        /// New check mode.
        mode: Option<EligibilityMode>,
    },
}

/// Generates a key from `K0`..`K7`.
pub fn arb_key() -> impl Strategy<Value = Key> {
    (0u8..8).prop_map(|n| Key::new(format!("K{n}")))
}

/// Generates an identity from `100`..`105`.
pub fn arb_identity() -> impl Strategy<Value = Identity> {
    (100u64..106).prop_map(Identity::from)
}

/// Generates an identity as a caller might pass it: usually clean,
/// sometimes padded with whitespace. Never blank.
pub fn arb_identity_candidate() -> impl Strategy<Value = Identity> {
    prop_oneof![
        4 => arb_identity(),
        1 => arb_identity().prop_map(|id| Identity::new(format!(" {id}\n"))),
        1 => arb_identity().prop_map(|id| Identity::new(format!("\t{id}  "))),
    ]
}

/// Generates a raw `add_keys` candidate: usually a valid key, sometimes
/// padded with whitespace, sometimes blank.
pub fn arb_key_candidate() -> impl Strategy<Value = String> {
    prop_oneof![
        6 => arb_key().prop_map(Key::into_inner),
        2 => arb_key().prop_map(|k| format!("  {k}\t")),
        1 => Just(String::new()),
        1 => Just("   ".to_string()),
    ]
}

/// Generates an arbitrary [`LedgerOp`], weighted towards pool traffic.
pub fn arb_ledger_op() -> impl Strategy<Value = LedgerOp> {
    prop_oneof![
        3 => proptest::collection::vec(arb_key_candidate(), 0..5).prop_map(LedgerOp::AddKeys),
        4 => arb_identity_candidate().prop_map(LedgerOp::Claim),
        2 => (arb_identity_candidate(), any::<bool>())
            .prop_map(|(identity, return_to_pool)| LedgerOp::Revoke { identity, return_to_pool }),
        2 => (arb_identity_candidate(), arb_key(), any::<bool>()).prop_map(
            |(identity, key, remove_from_pool)| LedgerOp::Assign { identity, key, remove_from_pool }
        ),
        2 => arb_key().prop_map(LedgerOp::Remove),
        1 => (
            proptest::option::of(0u32..=3650),
            proptest::option::of(prop_oneof![
                Just(EligibilityMode::Account),
                Just(EligibilityMode::Guild)
            ]),
        )
            .prop_map(|(min_days, mode)| LedgerOp::SetConfig { min_days, mode }),
    ]
}

/// Generates a sequence of 1-40 arbitrary operations.
pub fn arb_ledger_ops() -> impl Strategy<Value = Vec<LedgerOp>> {
    proptest::collection::vec(arb_ledger_op(), 1..40)
}
