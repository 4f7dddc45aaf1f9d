//! Fuzz target for document loading.
//!
//! Arbitrary bytes fed to the lenient document decoders must never panic,
//! and a successfully decoded document must survive a save/decode cycle
//! unchanged (decoding already normalizes, so it is a fixed point).

#![no_main]

use keyledger_store::{ClaimsDocument, PoolDocument};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(pool) = PoolDocument::decode(data) {
        let bytes = serde_json::to_vec(&pool).expect("decoded pool must serialize");
        let again = PoolDocument::decode(&bytes).expect("serialized pool must decode");
        assert_eq!(pool, again, "pool decode is not idempotent");
    }

    if let Ok(claims) = ClaimsDocument::decode(data) {
        let bytes = serde_json::to_vec(&claims).expect("decoded claims must serialize");
        let again = ClaimsDocument::decode(&bytes).expect("serialized claims must decode");
        assert_eq!(claims, again, "claims decode is not idempotent");
    }
});
