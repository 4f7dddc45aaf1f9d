//! Persisted document shapes and their lenient decoders.
//!
//! Two independent documents are stored:
//!
//! ```text
//! keys.json   → { "pool": ["K1", "K2"], "config": { "min_days": 7, "mode": "account" } }
//! claims.json → { "1234": "K0", "5678": "K3" }
//! ```
//!
//! Decoding is lenient about *content* (blank or duplicate pool entries,
//! out-of-range `min_days`, unknown `mode`) and strict about *shape*: a
//! document that is not valid JSON, or whose top level is not the expected
//! object, is reported as corrupt. A bad config field therefore never costs
//! the pool.

use std::collections::{BTreeMap, HashSet};

use keyledger_types::{
    EligibilityMode, EligibilityPolicy, Identity, Key,
    config::{DEFAULT_MIN_DAYS, MAX_MIN_DAYS},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The pool + configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PoolDocument {
    /// Pooled keys in hand-out order (head first).
    pub pool: Vec<Key>,
    /// Eligibility policy.
    pub config: EligibilityPolicy,
}

/// The claims document: a flat identity → key mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ClaimsDocument {
    /// One entry per active claim.
    pub claims: BTreeMap<Identity, Key>,
}

/// Wire shape accepted when reading the pool document.
#[derive(Deserialize)]
struct RawPoolDocument {
    #[serde(default)]
    pool: Vec<String>,
    #[serde(default)]
    config: Option<serde_json::Value>,
}

impl PoolDocument {
    /// Decodes and normalizes a pool document.
    ///
    /// Pool entries are trimmed; blank entries and repeats are dropped,
    /// keeping the first occurrence. Config fields fall back to defaults (or
    /// are clamped) with a warning.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the bytes are not a pool document.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: RawPoolDocument = serde_json::from_slice(bytes)?;

        let mut seen = HashSet::with_capacity(raw.pool.len());
        let mut pool = Vec::with_capacity(raw.pool.len());
        let mut dropped = 0usize;
        for entry in &raw.pool {
            match Key::normalized(entry) {
                Some(key) if seen.insert(key.clone()) => pool.push(key),
                _ => dropped += 1,
            }
        }
        if dropped > 0 {
            tracing::warn!(dropped, "Dropped blank or duplicate pool entries on load");
        }

        let config = decode_policy(raw.config.as_ref());
        Ok(Self { pool, config })
    }
}

impl ClaimsDocument {
    /// Decodes and normalizes a claims document.
    ///
    /// Identities and keys are trimmed; entries with a blank side are dropped.
    /// Two identities holding the same key are left for the ledger to
    /// reconcile, since resolving that needs the pool as well.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the bytes are not a flat string mapping.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: BTreeMap<String, String> = serde_json::from_slice(bytes)?;

        let mut claims = BTreeMap::new();
        let mut dropped = 0usize;
        for (identity, key) in &raw {
            match (Identity::normalized(identity), Key::normalized(key)) {
                (Some(identity), Some(key)) => {
                    claims.insert(identity, key);
                },
                _ => dropped += 1,
            }
        }
        if dropped > 0 {
            tracing::warn!(dropped, "Dropped blank claim entries on load");
        }

        Ok(Self { claims })
    }
}

/// Reads the `config` object field by field so one bad value does not
/// invalidate the others.
fn decode_policy(value: Option<&serde_json::Value>) -> EligibilityPolicy {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return EligibilityPolicy::default();
    };
    let Some(object) = value.as_object() else {
        tracing::warn!("Config is not an object, using default eligibility policy");
        return EligibilityPolicy::default();
    };

    let min_days = match object.get("min_days") {
        None => DEFAULT_MIN_DAYS,
        Some(raw) => match raw.as_i64() {
            Some(days) if days < 0 => {
                tracing::warn!(min_days = days, "Negative min_days clamped to 0");
                0
            },
            Some(days) if days > i64::from(MAX_MIN_DAYS) => {
                tracing::warn!(min_days = days, max = MAX_MIN_DAYS, "min_days clamped to maximum");
                MAX_MIN_DAYS
            },
            // Range checked by the guards above.
            Some(days) => u32::try_from(days).unwrap_or(DEFAULT_MIN_DAYS),
            None => {
                tracing::warn!(value = %raw, "Non-integer min_days, using default");
                DEFAULT_MIN_DAYS
            },
        },
    };

    let mode = match object.get("mode") {
        None => EligibilityMode::default(),
        Some(raw) => match raw.as_str().map(str::parse::<EligibilityMode>) {
            Some(Ok(mode)) => mode,
            _ => {
                tracing::warn!(value = %raw, "Unknown mode, using default");
                EligibilityMode::default()
            },
        },
    };

    EligibilityPolicy { min_days, mode }
}

/// Returns the JSON Schema of the pool + configuration document, pretty printed.
#[must_use]
pub fn pool_document_schema() -> String {
    let schema = schemars::schema_for!(PoolDocument);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
